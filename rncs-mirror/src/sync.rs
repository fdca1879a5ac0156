//! Per-file download decision.
//!
//! For each remote file the crawler finds, [`FileSync`] looks at the local
//! filesystem only and decides whether to skip it, download it, or discard a
//! corrupt pair and fetch it again:
//!
//! ```text
//! local path absent ──> download ──> verify pair ──┬─ valid ──────> Downloaded
//!                                                  ├─ unreadable ─> Unverified
//!                                                  └─ mismatch ──┐
//! local archive ──────> verify pair ──┬─ valid ──────> Skipped    │
//!                                     ├─ unreadable ─> Unverified │
//!                                     └─ mismatch ──> delete pair ┴─> MismatchPolicy
//! local non-archive ──> Present
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checksum::{
    is_archive, ChecksumPair, Verification, ARCHIVE_EXTENSION, CHECKSUM_EXTENSION,
};
use crate::error::{MirrorError, MirrorResult};
use crate::transport::{with_url_extension, Credentials, RemoteTransport};

/// Default number of downloads allowed for one pair under `Retry`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What to do once a pair is found corrupt and deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// Fetch the pair again, up to `max_attempts` downloads in total.
    Retry { max_attempts: u32 },
    /// Stop with an integrity error; the next run downloads the pair again.
    FailStop,
}

impl Default for MismatchPolicy {
    fn default() -> Self {
        Self::Retry {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Result of syncing one remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local archive already verified; nothing transferred.
    Skipped,
    /// Local file exists and is not an archive; left alone.
    Present,
    /// Transferred, and its pair verified (or it belongs to no pair).
    Downloaded { bytes: u64 },
    /// The pair could not be read for verification; nothing was deleted.
    Unverified { bytes: u64 },
    /// A corrupt pair was deleted and fetched again until valid.
    Recovered { bytes: u64, attempts: u32 },
    /// Local metadata unreadable; passed over.
    Inaccessible,
}

impl SyncOutcome {
    /// Bytes transferred for this file.
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Downloaded { bytes }
            | Self::Unverified { bytes }
            | Self::Recovered { bytes, .. } => *bytes,
            _ => 0,
        }
    }
}

/// Why the local writer stopped a transfer.
enum WriteFailure {
    Io(io::Error),
    Cancelled,
}

/// Sink handed to the transport.
///
/// Records the real cause of a failed write so it can be reported as a local
/// error instead of the transport's generic abort.
struct ChunkWriter<'a, W: Write> {
    inner: BufWriter<W>,
    cancel: &'a CancellationToken,
    failure: Option<WriteFailure>,
}

impl<'a, W: Write> ChunkWriter<'a, W> {
    fn new(sink: W, cancel: &'a CancellationToken) -> Self {
        Self {
            inner: BufWriter::new(sink),
            cancel,
            failure: None,
        }
    }
}

impl<W: Write> Write for ChunkWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            self.failure = Some(WriteFailure::Cancelled);
            return Err(io::Error::other("cancelled"));
        }
        self.inner.write(buf).map_err(|e| {
            let err = io::Error::other(e.to_string());
            self.failure = Some(WriteFailure::Io(e));
            err
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Remove every local trace of a failed transfer of `path`.
fn discard(path: &Path) {
    match ChecksumPair::from_path(path) {
        Some(pair) => pair.remove_best_effort(),
        None => {
            let _ = fs::remove_file(path);
        }
    }
}

/// Per-file sync policy over a remote transport.
#[derive(Debug)]
pub struct FileSync<T> {
    transport: T,
    policy: MismatchPolicy,
    cancel: CancellationToken,
}

impl<T: RemoteTransport> FileSync<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: MismatchPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: MismatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> MismatchPolicy {
        self.policy
    }

    /// Bring `local_path` in line with the remote file at `url`.
    ///
    /// `size` is the size reported by the listing; it is informational only.
    pub fn sync(
        &self,
        url: &str,
        credentials: &Credentials,
        local_path: &Path,
        size: Option<u64>,
    ) -> MirrorResult<SyncOutcome> {
        if self.cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }

        match fs::metadata(local_path) {
            Ok(_) => self.sync_existing(url, credentials, local_path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.sync_missing(url, credentials, local_path, size)
            }
            Err(e) => {
                warn!(url, path = %local_path.display(), error = %e, "local file inaccessible, passing over");
                Ok(SyncOutcome::Inaccessible)
            }
        }
    }

    fn sync_existing(
        &self,
        url: &str,
        credentials: &Credentials,
        local_path: &Path,
    ) -> MirrorResult<SyncOutcome> {
        if !is_archive(local_path) {
            debug!(url, "already present");
            return Ok(SyncOutcome::Present);
        }

        let pair = ChecksumPair::for_archive(local_path);
        match pair.verify() {
            Ok(Verification::Valid) => {
                debug!(url, "already present, checksum valid");
                Ok(SyncOutcome::Skipped)
            }
            Ok(Verification::Mismatch { expected, actual }) => {
                warn!(url, %expected, %actual, "local archive corrupt, deleting pair");
                pair.remove()?;
                self.after_mismatch(url, credentials, &pair, 0, expected, actual)
            }
            Err(MirrorError::IndeterminateVerification { path, source }) => {
                warn!(url, path = %path.display(), error = %source, "cannot verify local archive");
                Ok(SyncOutcome::Unverified { bytes: 0 })
            }
            Err(e) => Err(e),
        }
    }

    fn sync_missing(
        &self,
        url: &str,
        credentials: &Credentials,
        local_path: &Path,
        size: Option<u64>,
    ) -> MirrorResult<SyncOutcome> {
        let bytes = self.download(url, credentials, local_path)?;
        info!(url, bytes, listed = ?size, "downloaded");

        let Some(pair) = ChecksumPair::from_path(local_path) else {
            return Ok(SyncOutcome::Downloaded { bytes });
        };

        match pair.verify() {
            Ok(Verification::Valid) => {
                info!(url, "checksum valid");
                Ok(SyncOutcome::Downloaded { bytes })
            }
            Ok(Verification::Mismatch { expected, actual }) => {
                warn!(url, %expected, %actual, "downloaded pair corrupt, deleting");
                pair.remove()?;
                self.after_mismatch(url, credentials, &pair, 1, expected, actual)
                    .map(|outcome| match outcome {
                        SyncOutcome::Recovered { bytes: more, attempts } => {
                            SyncOutcome::Recovered {
                                bytes: bytes + more,
                                attempts,
                            }
                        }
                        other => other,
                    })
            }
            Err(MirrorError::IndeterminateVerification { path, .. }) => {
                // The other half of the pair has not been mirrored yet.
                debug!(url, missing = %path.display(), "pair incomplete, verification deferred");
                Ok(SyncOutcome::Unverified { bytes })
            }
            Err(e) => Err(e),
        }
    }

    /// Apply the mismatch policy to a pair that has just been deleted.
    ///
    /// `attempts_used` counts downloads of the pair already spent.
    fn after_mismatch(
        &self,
        url: &str,
        credentials: &Credentials,
        pair: &ChecksumPair,
        attempts_used: u32,
        expected: String,
        actual: String,
    ) -> MirrorResult<SyncOutcome> {
        match self.policy {
            MismatchPolicy::FailStop => Err(MirrorError::Integrity {
                path: pair.archive.clone(),
                expected,
                actual,
            }),
            MismatchPolicy::Retry { max_attempts } => self.retry_pair(
                url,
                credentials,
                pair,
                attempts_used,
                max_attempts,
                expected,
                actual,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn retry_pair(
        &self,
        url: &str,
        credentials: &Credentials,
        pair: &ChecksumPair,
        attempts_used: u32,
        max_attempts: u32,
        mut expected: String,
        mut actual: String,
    ) -> MirrorResult<SyncOutcome> {
        let archive_url =
            with_url_extension(url, ARCHIVE_EXTENSION).unwrap_or_else(|| url.to_string());
        let checksum_url =
            with_url_extension(url, CHECKSUM_EXTENSION).unwrap_or_else(|| url.to_string());

        let mut attempt = attempts_used;
        let mut bytes = 0;
        while attempt < max_attempts {
            attempt += 1;
            info!(url = %archive_url, attempt, max_attempts, "fetching pair again");

            bytes += self.download(&checksum_url, credentials, &pair.checksum)?;
            bytes += self.download(&archive_url, credentials, &pair.archive)?;

            match pair.verify()? {
                Verification::Valid => {
                    info!(url = %archive_url, attempt, "checksum valid after retry");
                    return Ok(SyncOutcome::Recovered {
                        bytes,
                        attempts: attempt,
                    });
                }
                Verification::Mismatch {
                    expected: e,
                    actual: a,
                } => {
                    warn!(url = %archive_url, attempt, expected = %e, actual = %a, "still corrupt, deleting pair");
                    pair.remove()?;
                    expected = e;
                    actual = a;
                }
            }
        }

        Err(MirrorError::RetriesExhausted {
            url: archive_url,
            attempts: attempt,
            expected,
            actual,
        })
    }

    /// Stream `url` into a new file at `path`.
    ///
    /// On a local write failure the file and its checksum sibling are
    /// removed. On a transport failure or cancellation only the partial file
    /// is removed.
    fn download(&self, url: &str, credentials: &Credentials, path: &Path) -> MirrorResult<u64> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| MirrorError::local_io(path, e))?;
        self.receive(url, credentials, path, file)
    }

    /// Run the transfer of `url` into `sink`, the opened file at `path`.
    fn receive<W: Write>(
        &self,
        url: &str,
        credentials: &Credentials,
        path: &Path,
        sink: W,
    ) -> MirrorResult<u64> {
        let mut writer = ChunkWriter::new(sink, &self.cancel);
        let result = self.transport.fetch(url, credentials, &mut writer);

        match writer.failure.take() {
            Some(WriteFailure::Cancelled) => {
                drop(writer);
                let _ = fs::remove_file(path);
                return Err(MirrorError::Cancelled);
            }
            Some(WriteFailure::Io(e)) => {
                warn!(url, path = %path.display(), error = %e, "download failed, discarding");
                drop(writer);
                discard(path);
                return Err(MirrorError::local_io(path, e));
            }
            None => {}
        }

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(writer);
                let _ = fs::remove_file(path);
                return Err(e);
            }
        };

        if let Err(e) = writer.flush() {
            drop(writer);
            discard(path);
            return Err(MirrorError::local_io(path, e));
        }

        Ok(bytes)
    }
}
