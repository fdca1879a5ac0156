//! rncs-mirror - Incremental FTPS mirror for the RNCS financial-statement archives
//!
//! This library walks a remote directory tree over FTPS and reproduces it on
//! the local filesystem. Each `.zip` archive is published next to a `.md5`
//! file holding its digest; pairs are verified as they arrive and on every
//! later run, so an interrupted or corrupted mirror heals itself.
//!
//! # Architecture
//!
//! ```text
//! TreeCrawler ──list──> RemoteTransport (FtpsTransport over libcurl)
//!      │                       ▲
//!      │ parse                 │ fetch
//!      ▼                       │
//! ListingParser           FileSync ──verify──> checksum (MD5 pair check)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rncs_mirror::{mirror, CancellationToken, Credentials, MirrorConfig};
//!
//! let config = MirrorConfig::new(
//!     "ftp://opendata-rncs.inpi.fr/public/Bilans_Donnees_Saisies/",
//!     Credentials::new("user", "password"),
//!     "/srv/rncs",
//! );
//! let report = mirror(&config, CancellationToken::new())?;
//! println!("{}", report);
//! # Ok::<(), rncs_mirror::MirrorError>(())
//! ```

pub mod checksum;
pub mod config;
pub mod crawler;
pub mod error;
pub mod listing;
pub mod logging;
pub mod report;
pub mod sync;
pub mod transport;

pub use config::{ConfigFile, MirrorConfig};
pub use crawler::TreeCrawler;
pub use error::{MirrorError, MirrorResult};
pub use listing::{EntryKind, ListingParser, RemoteEntry, UnixListingParser};
pub use report::MirrorReport;
pub use sync::{FileSync, MismatchPolicy, SyncOutcome};
pub use tokio_util::sync::CancellationToken;
pub use transport::{Credentials, FtpsTransport, RemoteTransport, TransportConfig};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Mirror `config.remote_url` into `config.local_root` over FTPS.
///
/// Cancelling `cancel` stops the run before the next listing or file and
/// aborts any transfer in progress.
pub fn mirror(config: &MirrorConfig, cancel: CancellationToken) -> MirrorResult<MirrorReport> {
    config.validate()?;
    let crawler = TreeCrawler::new(FtpsTransport::new(config.transport.clone()))
        .with_policy(config.policy)
        .with_max_depth(config.max_depth)
        .with_cancellation(cancel);
    crawler.mirror(&config.remote_url, &config.credentials, &config.local_root)
}
