//! Counters for one crawl.

use std::fmt;

use crate::sync::SyncOutcome;

/// Summary of a finished (or aborted) crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// Directories listed, the root included.
    pub directories: usize,
    /// Files transferred and verified (or outside any pair).
    pub downloaded: usize,
    /// Archives already present and valid.
    pub skipped: usize,
    /// Non-archive files already present.
    pub present: usize,
    /// Files whose pair could not be verified yet.
    pub unverified: usize,
    /// Corrupt pairs fetched again until valid.
    pub recovered: usize,
    /// Local paths whose metadata could not be read.
    pub inaccessible: usize,
    /// Total bytes transferred.
    pub bytes_downloaded: u64,
}

impl MirrorReport {
    /// Record the outcome of one file.
    pub fn record(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Skipped => self.skipped += 1,
            SyncOutcome::Present => self.present += 1,
            SyncOutcome::Downloaded { .. } => self.downloaded += 1,
            SyncOutcome::Unverified { .. } => self.unverified += 1,
            SyncOutcome::Recovered { .. } => self.recovered += 1,
            SyncOutcome::Inaccessible => self.inaccessible += 1,
        }
        self.bytes_downloaded += outcome.bytes();
    }

    /// Number of file entries visited.
    pub fn files(&self) -> usize {
        self.downloaded
            + self.skipped
            + self.present
            + self.unverified
            + self.recovered
            + self.inaccessible
    }

    /// Whether the crawl transferred nothing.
    pub fn is_noop(&self) -> bool {
        self.bytes_downloaded == 0 && self.downloaded == 0 && self.recovered == 0
    }
}

impl fmt::Display for MirrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} directories, {} files: {} downloaded, {} recovered, {} skipped, {} present, {} unverified, {} inaccessible ({} bytes)",
            self.directories,
            self.files(),
            self.downloaded,
            self.recovered,
            self.skipped,
            self.present,
            self.unverified,
            self.inaccessible,
            self.bytes_downloaded
        )
    }
}
