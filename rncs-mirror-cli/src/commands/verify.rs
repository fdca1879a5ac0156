//! `verify` command: check one local archive against its checksum file.

use std::path::Path;

use rncs_mirror::checksum::{ChecksumPair, Verification};
use rncs_mirror::MirrorError;

use crate::error::CliError;

/// Verify the pair containing `path` (either the `.zip` or the `.md5`).
///
/// Prints `valid`, `mismatch` or `indeterminate`. Nothing is deleted.
pub fn run(path: &Path) -> Result<(), CliError> {
    let pair = ChecksumPair::from_path(path).ok_or_else(|| {
        CliError::InvalidArgument(format!("{} is not a .zip or .md5 file", path.display()))
    })?;

    match pair.verify() {
        Ok(Verification::Valid) => {
            println!("{}: valid", pair.archive.display());
            Ok(())
        }
        Ok(Verification::Mismatch { expected, actual }) => {
            println!(
                "{}: mismatch (expected {}, got {})",
                pair.archive.display(),
                expected,
                actual
            );
            Err(CliError::VerificationFailed { path: pair.archive })
        }
        Err(e @ MirrorError::IndeterminateVerification { .. }) => {
            println!("{}: indeterminate", pair.archive.display());
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
