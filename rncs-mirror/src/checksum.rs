//! MD5 integrity verification for archive/checksum pairs.
//!
//! Every archive `X.zip` on the server ships with a sibling `X.md5` holding
//! the 32-character lowercase hex digest of the archive. The two files are
//! related only by their stem.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::error::{MirrorError, MirrorResult};

/// Extension of mirrored archives.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Extension of checksum siblings.
pub const CHECKSUM_EXTENSION: &str = "md5";

/// Length of a hex-encoded MD5 digest.
pub const DIGEST_HEX_LEN: usize = 32;

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of a readable verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The archive digest equals the checksum token.
    Valid,
    /// Both files were read and disagree.
    Mismatch { expected: String, actual: String },
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }
}

/// An archive and its checksum sibling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumPair {
    pub archive: PathBuf,
    pub checksum: PathBuf,
}

impl ChecksumPair {
    /// Pair for an archive path; the sibling swaps the extension.
    pub fn for_archive(archive: &Path) -> Self {
        Self {
            archive: archive.to_path_buf(),
            checksum: archive.with_extension(CHECKSUM_EXTENSION),
        }
    }

    /// Pair derived from either half, or `None` when `path` is neither an
    /// archive nor a checksum file.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext == ARCHIVE_EXTENSION || ext == CHECKSUM_EXTENSION {
            Some(Self {
                archive: path.with_extension(ARCHIVE_EXTENSION),
                checksum: path.with_extension(CHECKSUM_EXTENSION),
            })
        } else {
            None
        }
    }

    /// Verify the pair. See [`verify_pair`].
    pub fn verify(&self) -> MirrorResult<Verification> {
        verify_pair(self)
    }

    /// Delete both files, ignoring files that are already gone.
    pub fn remove(&self) -> MirrorResult<()> {
        remove_if_present(&self.archive)?;
        remove_if_present(&self.checksum)
    }

    /// Delete both files, ignoring every error.
    pub fn remove_best_effort(&self) {
        let _ = fs::remove_file(&self.archive);
        let _ = fs::remove_file(&self.checksum);
    }
}

/// Returns true when `path` carries the archive extension.
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == ARCHIVE_EXTENSION)
}

fn remove_if_present(path: &Path) -> MirrorResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MirrorError::local_io(path, e)),
    }
}

fn indeterminate(path: &Path) -> impl FnOnce(io::Error) -> MirrorError + '_ {
    move |source| MirrorError::IndeterminateVerification {
        path: path.to_path_buf(),
        source,
    }
}

/// Calculate the MD5 checksum of a file.
///
/// # Returns
///
/// The lowercase hexadecimal MD5 digest of the file contents.
///
/// # Errors
///
/// Returns `IndeterminateVerification` if the file cannot be read.
pub fn calculate_file_checksum(path: &Path) -> MirrorResult<String> {
    let mut file = File::open(path).map_err(indeterminate(path))?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(indeterminate(path))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Read the checksum token from a sibling file.
///
/// At most one byte past the digest length is read, which is enough to tell
/// an over-long file from a well-formed one.
fn read_token(path: &Path) -> MirrorResult<Vec<u8>> {
    let file = File::open(path).map_err(indeterminate(path))?;
    let mut token = Vec::with_capacity(DIGEST_HEX_LEN + 1);
    file.take(DIGEST_HEX_LEN as u64 + 1)
        .read_to_end(&mut token)
        .map_err(indeterminate(path))?;
    Ok(token)
}

/// Verify an archive against its checksum sibling.
///
/// The comparison is byte-for-byte against the lowercase hex digest: an
/// uppercase token, or one that is not exactly 32 bytes, is a mismatch.
///
/// # Errors
///
/// `IndeterminateVerification` when either file cannot be opened or read.
/// Callers must not delete anything on that error.
pub fn verify_pair(pair: &ChecksumPair) -> MirrorResult<Verification> {
    let actual = calculate_file_checksum(&pair.archive)?;
    let token = read_token(&pair.checksum)?;

    if token == actual.as_bytes() {
        Ok(Verification::Valid)
    } else {
        Ok(Verification::Mismatch {
            expected: String::from_utf8_lossy(&token).into_owned(),
            actual,
        })
    }
}

/// Verify the archive at `archive_path` against `archive_path` with the
/// checksum extension.
pub fn verify(archive_path: &Path) -> MirrorResult<Verification> {
    verify_pair(&ChecksumPair::for_archive(archive_path))
}
