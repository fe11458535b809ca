use std::env;
use std::ffi::OsString;
use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use lineage_api::{BlameLine, FileBlame, RevisionNumber};
use lineage_source_api::{BlameSource, SourceError, SourceResult};
use tracing::debug;
use wait_timeout::ChildExt;

/// Per-call timeout applied when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
const BINARY_ENV: &str = "LINEAGE_SVN_BIN";
/// svn only emits non-ASCII paths verbatim under a UTF-8 locale.
const LOCALE: &str = "C.UTF-8";

/// Revision reported for blame lines svn marks with `-` (no known revision).
pub const UNKNOWN_REVISION: RevisionNumber = 0;

const BINARY_CODES: &[&str] = &["E195004"];
const MISSING_CODES: &[&str] = &["E150000", "E160013", "E170000", "W160013"];
const NOT_A_FILE_CODES: &[&str] = &["E160016", "E160017", "E195007"];

#[derive(Debug, Clone)]
struct SvnCli {
    binary: OsString,
    timeout: Duration,
}

impl SvnCli {
    fn new(binary: OsString, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    /// Run `svn` with `args`; `subject` names the path for error classification.
    fn run(&self, args: &[&str], subject: &str) -> SourceResult<ProcessOutput> {
        let operation = format!("svn {}", args.first().copied().unwrap_or_default());
        debug!(%operation, subject, "running svn");

        let mut command = Command::new(&self.binary);
        command.args(args);
        command.arg("--non-interactive");
        command.env("LC_ALL", LOCALE);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|err| SourceError::message(format!("failed to spawn svn: {err}")))?;

        let stdout_handle = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || -> io::Result<Vec<u8>> {
                let mut buffer = Vec::new();
                stdout.read_to_end(&mut buffer)?;
                Ok(buffer)
            })
        });

        let stderr_handle = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || -> io::Result<Vec<u8>> {
                let mut buffer = Vec::new();
                stderr.read_to_end(&mut buffer)?;
                Ok(buffer)
            })
        });

        match child.wait_timeout(self.timeout) {
            Ok(Some(_)) => (),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::Timeout {
                    operation,
                    seconds: self.timeout.as_secs(),
                });
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::message(format!(
                    "failed waiting on svn: {err}"
                )));
            }
        }

        let status = child
            .wait()
            .map_err(|err| SourceError::message(format!("failed to reap svn: {err}")))?;

        let stdout = join_reader(stdout_handle, "stdout")?;
        let stderr = join_reader(stderr_handle, "stderr")?;

        if !status.success() {
            return Err(classify_failure(subject, &stderr));
        }

        Ok(ProcessOutput { stdout })
    }
}

fn join_reader(
    handle: Option<thread::JoinHandle<io::Result<Vec<u8>>>>,
    stream: &str,
) -> SourceResult<String> {
    match handle {
        Some(handle) => {
            let bytes = handle
                .join()
                .map_err(|_| SourceError::message(format!("failed to join svn {stream} reader")))?
                .map_err(|err| SourceError::message(format!("failed to read svn {stream}: {err}")))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        None => Ok(String::new()),
    }
}

#[derive(Debug)]
struct ProcessOutput {
    stdout: String,
}

/// Subversion blame source backed by the local `svn` command-line client.
///
/// The binary defaults to `svn` on `PATH` and can be overridden with the
/// `LINEAGE_SVN_BIN` environment variable or [`SvnSource::with_binary`].
/// Merged revisions are not retrieved.
#[derive(Debug, Clone)]
pub struct SvnSource {
    root: String,
    cli: SvnCli,
}

impl SvnSource {
    /// Construct a source for the repository at `root` (a URL).
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        let binary = env::var_os(BINARY_ENV).unwrap_or_else(|| OsString::from("svn"));
        Self {
            root: normalize_root(&root.into()),
            cli: SvnCli::new(binary, Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Use a specific `svn` executable.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<OsString>) -> Self {
        self.cli.binary = binary.into();
        self
    }

    /// Bound every backend call by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.cli.timeout = timeout;
        self
    }

    fn url(&self, relative: &str) -> String {
        let relative = relative.trim_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            format!("{}/{relative}", self.root)
        }
    }
}

impl BlameSource for SvnSource {
    fn id(&self) -> &'static str {
        "svn"
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn latest_revision(&self) -> SourceResult<RevisionNumber> {
        let output = self.cli.run(
            &["info", "--show-item", "revision", &self.root],
            &self.root,
        )?;
        let value = output.stdout.trim();
        value.parse().map_err(|_| {
            SourceError::message(format!("svn info returned an invalid revision: {value:?}"))
        })
    }

    fn list_files(&self, branch: &str, revision: RevisionNumber) -> SourceResult<Vec<String>> {
        let target = format!("{}@{revision}", self.url(branch));
        let output = self.cli.run(&["list", "-R", &target], branch)?;
        parse_listing(&output.stdout)
    }

    fn blame(&self, path: &str, revision: RevisionNumber) -> SourceResult<FileBlame> {
        let target = format!("{}@{revision}", self.url(path));
        let output = self.cli.run(&["blame", &target], path)?;
        parse_blame(&output.stdout)
    }
}

fn normalize_root(root: &str) -> String {
    root.trim_end_matches(['/', '\\']).to_owned()
}

fn parse_listing(output: &str) -> SourceResult<Vec<String>> {
    output
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty() && !line.ends_with('/'))
        .map(|line| {
            if has_escaped_bytes(line) {
                return Err(SourceError::message(format!(
                    "svn escaped non-ASCII characters in {line:?}; \
                     is the {LOCALE} locale installed?"
                )));
            }
            Ok(line.to_owned())
        })
        .collect()
}

/// Whether svn replaced bytes it could not print with `?\NNN` escapes.
fn has_escaped_bytes(line: &str) -> bool {
    line.match_indices("?\\").any(|(at, _)| {
        let digits = &line.as_bytes()[at + 2..];
        digits.len() >= 3 && digits[..3].iter().all(u8::is_ascii_digit)
    })
}

fn parse_blame(output: &str) -> SourceResult<FileBlame> {
    output
        .split_terminator('\n')
        .zip(1_u32..)
        .map(|(raw, line_number)| {
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            parse_blame_line(raw, line_number).ok_or_else(|| {
                SourceError::message(format!(
                    "unrecognized svn blame output at line {line_number}: {raw:?}"
                ))
            })
        })
        .collect()
}

/// Parse `<rev> <author> <text>`; revision and author are right-aligned and
/// exactly one space separates the author from the text. A `-` revision maps
/// to [`UNKNOWN_REVISION`]; a `-` author is kept as is.
fn parse_blame_line(raw: &str, line_number: u32) -> Option<BlameLine> {
    let rest = raw.trim_start_matches(' ');
    let (revision, rest) = rest.split_once(' ')?;
    let revision = match revision {
        "-" => UNKNOWN_REVISION,
        digits => digits.parse().ok()?,
    };
    let rest = rest.trim_start_matches(' ');
    let (author, text) = rest.split_once(' ').unwrap_or((rest, ""));
    if author.is_empty() {
        return None;
    }
    Some(BlameLine::new(line_number, text, author, revision))
}

fn classify_failure(subject: &str, stderr: &str) -> SourceError {
    let path = subject.to_owned();
    for code in error_codes(stderr) {
        if BINARY_CODES.contains(&code) {
            return SourceError::BinaryFile { path };
        }
        if MISSING_CODES.contains(&code) {
            return SourceError::MissingEntry { path };
        }
        if NOT_A_FILE_CODES.contains(&code) {
            return SourceError::NotAFile { path };
        }
    }
    SourceError::message(format!("svn failed for {subject}: {}", stderr.trim()))
}

fn error_codes(stderr: &str) -> impl Iterator<Item = &str> + '_ {
    stderr
        .split_whitespace()
        .filter_map(|token| token.strip_suffix(':'))
        .filter(|token| {
            let mut chars = token.chars();
            token.len() == 7
                && matches!(chars.next(), Some('E' | 'W'))
                && chars.all(|c| c.is_ascii_digit())
        })
}
