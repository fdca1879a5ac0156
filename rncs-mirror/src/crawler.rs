//! Remote tree traversal.
//!
//! [`TreeCrawler`] lists a remote directory, creates local directories for
//! directory entries and hands file entries to [`FileSync`]. Entries are
//! processed in the order the server lists them, and a subdirectory is fully
//! mirrored before its next sibling is looked at.
//!
//! Per directory: `Listing → Parsing → {Recursing | Delegating} → Done | Aborted`.
//!
//! The crawl is fail-fast: the first error anywhere aborts the rest of the
//! tree and is returned to the caller. Running the crawl again is the retry
//! mechanism; verified archives are skipped, so progress carries over.
//!
//! Traversal uses an explicit stack of directory frames rather than
//! recursion, bounded by a maximum depth and checked for cancellation before
//! every entry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::vec;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{MirrorError, MirrorResult};
use crate::listing::{EntryKind, ListingParser, RemoteEntry, UnixListingParser};
use crate::report::MirrorReport;
use crate::sync::{FileSync, MismatchPolicy};
use crate::transport::{child_url, dir_url, Credentials, RemoteTransport};

/// Default bound on directory nesting below the root.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Remote/local location pair for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTarget {
    pub remote_url: String,
    pub local_path: PathBuf,
}

impl MirrorTarget {
    /// Target of `entry` inside the directory `parent`.
    ///
    /// Directory targets get a trailing `/` on their URL.
    pub fn child(parent: &MirrorTarget, entry: &RemoteEntry) -> Self {
        let url = child_url(&parent.remote_url, &entry.name);
        Self {
            remote_url: match entry.kind {
                EntryKind::Directory => dir_url(&url),
                EntryKind::File => url,
            },
            local_path: parent.local_path.join(&entry.name),
        }
    }
}

/// A listed directory whose entries are being processed.
struct Frame {
    target: MirrorTarget,
    depth: usize,
    entries: vec::IntoIter<RemoteEntry>,
}

/// Recursive directory mirror.
#[derive(Debug)]
pub struct TreeCrawler<T, P = UnixListingParser> {
    sync: FileSync<T>,
    parser: P,
    max_depth: usize,
    cancel: CancellationToken,
}

impl<T: RemoteTransport> TreeCrawler<T> {
    /// Create a crawler with the Unix listing dialect and default policy.
    pub fn new(transport: T) -> Self {
        Self {
            sync: FileSync::new(transport),
            parser: UnixListingParser,
            max_depth: DEFAULT_MAX_DEPTH,
            cancel: CancellationToken::new(),
        }
    }
}

impl<T: RemoteTransport, P: ListingParser> TreeCrawler<T, P> {
    /// Swap the listing dialect.
    pub fn with_parser<Q: ListingParser>(self, parser: Q) -> TreeCrawler<T, Q> {
        TreeCrawler {
            sync: self.sync,
            parser,
            max_depth: self.max_depth,
            cancel: self.cancel,
        }
    }

    pub fn with_policy(mut self, policy: MismatchPolicy) -> Self {
        self.sync = self.sync.with_policy(policy);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Share a cancellation token with the crawl and its file transfers.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.sync = self.sync.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn transport(&self) -> &T {
        self.sync.transport()
    }

    /// Mirror the remote directory at `remote_dir_url` into `local_dir`.
    ///
    /// `local_dir` is created if missing. Returns the counters of the crawl,
    /// or the first error met.
    pub fn mirror(
        &self,
        remote_dir_url: &str,
        credentials: &Credentials,
        local_dir: &Path,
    ) -> MirrorResult<MirrorReport> {
        let root = MirrorTarget {
            remote_url: dir_url(remote_dir_url),
            local_path: local_dir.to_path_buf(),
        };
        info!(url = %root.remote_url, path = %local_dir.display(), "mirror started");

        let mut report = MirrorReport::default();
        match self.crawl(root, credentials, &mut report) {
            Ok(()) => {
                info!(%report, "mirror done");
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, %report, "mirror aborted");
                Err(e)
            }
        }
    }

    fn crawl(
        &self,
        root: MirrorTarget,
        credentials: &Credentials,
        report: &mut MirrorReport,
    ) -> MirrorResult<()> {
        fs::create_dir_all(&root.local_path)
            .map_err(|e| MirrorError::local_io(&root.local_path, e))?;

        let mut stack = vec![self.open(root, 0, credentials)?];
        report.directories += 1;

        while let Some(frame) = stack.last_mut() {
            let Some(entry) = frame.entries.next() else {
                debug!(url = %frame.target.remote_url, "directory done");
                stack.pop();
                continue;
            };

            if self.cancel.is_cancelled() {
                return Err(MirrorError::Cancelled);
            }

            if entry.name.contains('/') || entry.name.contains('\\') {
                warn!(url = %frame.target.remote_url, name = %entry.name, "unsafe entry name, skipping");
                continue;
            }

            let target = MirrorTarget::child(&frame.target, &entry);
            let depth = frame.depth + 1;

            match entry.kind {
                EntryKind::Directory => {
                    create_local_dir(&target.local_path)?;
                    debug!(url = %target.remote_url, "recursing");
                    let child = self.open(target, depth, credentials)?;
                    report.directories += 1;
                    stack.push(child);
                }
                EntryKind::File => {
                    debug!(url = %target.remote_url, "delegating");
                    let outcome = self.sync.sync(
                        &target.remote_url,
                        credentials,
                        &target.local_path,
                        entry.size_bytes,
                    )?;
                    report.record(&outcome);
                }
            }
        }

        Ok(())
    }

    /// List and parse one directory.
    fn open(
        &self,
        target: MirrorTarget,
        depth: usize,
        credentials: &Credentials,
    ) -> MirrorResult<Frame> {
        if self.cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }
        if depth > self.max_depth {
            return Err(MirrorError::DepthExceeded {
                url: target.remote_url,
                max_depth: self.max_depth,
            });
        }

        info!(url = %target.remote_url, "listing directory");
        let payload = self.sync.transport().list(&target.remote_url, credentials)?;
        let entries: Vec<RemoteEntry> = self.parser.parse(&payload).collect();
        debug!(url = %target.remote_url, entries = entries.len(), "listing parsed");

        Ok(Frame {
            target,
            depth,
            entries: entries.into_iter(),
        })
    }
}

/// Create a local directory, tolerating one that already exists.
fn create_local_dir(path: &Path) -> MirrorResult<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(MirrorError::local_io(path, e)),
    }
}
