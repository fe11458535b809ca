//! Blame sources that do not need libgit2: a Subversion client wrapper and an
//! in-memory fixture source.

mod memory;
mod svn;

pub use memory::MemorySource;
pub use svn::{SvnSource, DEFAULT_TIMEOUT_SECS, UNKNOWN_REVISION};
