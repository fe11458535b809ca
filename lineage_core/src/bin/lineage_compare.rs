use std::time::Duration;

use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{info, warn, Level};

use lineage_core::reconcile::{load_paths, save_paths, PathReconciler};
use lineage_core::report::{DirectoryArtifacts, DivergenceReporter, FileLog};
use lineage_core::repository::{GitSourceOptions, Repository};
use lineage_core::run::{
    CancellationToken, PathPlan, RevisionSelection, RunController, RunSummary, SideSpec,
};
use lineage_core::{BlameSource, CompareOptions, RevisionNumber, SvnSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Git,
    Svn,
}

/// Compare per-line blame between two repositories at matching revisions.
#[derive(Debug, Parser)]
#[command(name = "lineage-compare", version, args_override_self = true)]
struct Cli {
    /// Root of the reference repository
    #[arg(long)]
    left_repo: String,
    /// Root of the repository under test
    #[arg(long)]
    right_repo: String,
    /// Version-control backend used for both sides
    #[arg(long, value_enum, default_value_t = Backend::Git)]
    backend: Backend,
    /// Revision used on both sides
    #[arg(long)]
    rev: Option<RevisionNumber>,
    /// Revision on the left side, overriding --rev
    #[arg(long)]
    left_rev: Option<RevisionNumber>,
    /// Revision on the right side, overriding --rev
    #[arg(long)]
    right_rev: Option<RevisionNumber>,
    /// Branch sub-path compared on both sides
    #[arg(long, default_value = "")]
    branch: String,
    /// Read the path list from this file instead of listing both sides
    #[arg(long)]
    paths: Option<Utf8PathBuf>,
    /// Write the path list to this file
    #[arg(long)]
    save_paths: Option<Utf8PathBuf>,
    /// Keep going after --save-paths instead of exiting
    #[arg(long)]
    compare_after_save: bool,
    /// Do not compare revision numbers
    #[arg(long)]
    without_compare_revnums: bool,
    /// Attribute merged commits to the merge that brought them in (git)
    #[arg(long)]
    merged_revisions: bool,
    /// Per-call timeout in seconds (svn)
    #[arg(long, default_value_t = lineage_core::DEFAULT_SVN_TIMEOUT_SECS)]
    timeout: u64,
    /// Directory receiving rendered blames of divergent files
    #[arg(long, default_value = "_compare")]
    artifact_dir: Utf8PathBuf,
    /// Log of divergent file paths
    #[arg(long, default_value = "bad-blames")]
    result_log: Utf8PathBuf,
    /// Log of divergent file paths with mismatch kinds
    #[arg(long, default_value = "bad-blames-enhanced")]
    enhanced_log: Utf8PathBuf,
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    const fn revisions(&self) -> RevisionSelection {
        RevisionSelection {
            both: self.rev,
            left: self.left_rev,
            right: self.right_rev,
        }
    }

    const fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            compare_revisions: !self.without_compare_revnums,
        }
    }

    fn open_source(&self, root: &str) -> Result<Box<dyn BlameSource>> {
        let root = root.trim_end_matches(['/', '\\']);
        match self.backend {
            Backend::Git => {
                let options = GitSourceOptions {
                    merged_revisions: self.merged_revisions,
                    ..GitSourceOptions::default()
                };
                let repo = Repository::open_with(root, options)
                    .with_context(|| format!("failed to open git repository {root}"))?;
                Ok(Box::new(repo))
            }
            Backend::Svn => Ok(Box::new(
                SvnSource::new(root).with_timeout(Duration::from_secs(self.timeout)),
            )),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let cancellation = CancellationToken::new();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, cancellation.flag())
            .with_context(|| format!("failed to register handler for signal {signal}"))?;
    }
    run(&cli, cancellation)
}

fn run(cli: &Cli, cancellation: CancellationToken) -> Result<()> {
    let left = cli.open_source(&cli.left_repo)?;
    let right = cli.open_source(&cli.right_repo)?;
    let Some(summary) = execute(cli, left.as_ref(), right.as_ref(), cancellation)? else {
        return Ok(());
    };

    info!(
        total = summary.total,
        compared = summary.compared,
        matches = summary.matches,
        mismatches = summary.mismatches,
        failures = summary.failures,
        cancelled = summary.cancelled,
        "comparison complete"
    );
    if summary.cancelled {
        warn!("interrupted before every file was compared");
        bail!(
            "comparison cancelled after {} of {} files",
            summary.compared,
            summary.total
        );
    }
    Ok(())
}

/// Resolve revisions and paths, then compare unless only the path list was
/// requested. Returns `None` when the process stops after `--save-paths`.
fn execute(
    cli: &Cli,
    left: &dyn BlameSource,
    right: &dyn BlameSource,
    cancellation: CancellationToken,
) -> Result<Option<RunSummary>> {
    let (left_rev, right_rev) = cli
        .revisions()
        .resolve(left, right)
        .context("failed to resolve revisions")?;
    let left_side = SideSpec::new(left, &cli.branch, left_rev);
    let right_side = SideSpec::new(right, &cli.branch, right_rev);
    info!(left = ?left_side, right = ?right_side, "comparing repositories");

    let paths = match &cli.paths {
        Some(file) => {
            load_paths(file).with_context(|| format!("failed to read path list {file}"))?
        }
        None => PathReconciler::new()
            .reconcile(&left_side, &right_side)
            .context("repositories do not track the same files")?,
    };

    if let Some(file) = &cli.save_paths {
        save_paths(file, &paths).with_context(|| format!("failed to write path list {file}"))?;
        info!(paths = paths.len(), file = %file, "saved path list");
        if !cli.compare_after_save {
            return Ok(None);
        }
    }

    let mut simple = FileLog::create(cli.result_log.clone())
        .with_context(|| format!("failed to create {}", cli.result_log))?;
    let mut enhanced = FileLog::create(cli.enhanced_log.clone())
        .with_context(|| format!("failed to create {}", cli.enhanced_log))?;
    let mut artifacts = DirectoryArtifacts::new(cli.artifact_dir.clone());
    let reporter = DivergenceReporter::new(&mut simple, &mut enhanced, &mut artifacts);

    let summary = RunController::new(left_side, right_side, cli.compare_options(), reporter)
        .with_cancellation(cancellation)
        .run(PathPlan::Provided(paths))
        .context("comparison run failed")?;
    Ok(Some(summary))
}
