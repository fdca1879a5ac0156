//! `mirror` command: run one crawl of the remote tree.

use std::env;
use std::path::PathBuf;

use clap::Args;
use rncs_mirror::config::PASSWORD_ENV;
use rncs_mirror::logging::{init_logging, LogConfig};
use rncs_mirror::{CancellationToken, ConfigFile, MirrorConfig};
use tracing::warn;

use crate::error::CliError;

/// Options of the `mirror` command. Flags override the configuration file.
#[derive(Debug, Default, Args)]
pub struct MirrorArgs {
    /// Remote root directory (ftp:// for explicit TLS, ftps:// for implicit TLS)
    #[arg(long)]
    pub url: Option<String>,

    /// FTP user name
    #[arg(long)]
    pub user: Option<String>,

    /// Local directory to mirror into
    #[arg(long)]
    pub local_root: Option<PathBuf>,

    /// Stop at the first corrupt archive instead of fetching it again
    #[arg(long, conflicts_with = "max_attempts")]
    pub fail_stop: bool,

    /// Downloads allowed per corrupt archive before giving up
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Maximum directory depth below the remote root
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Skip TLS certificate and host name verification
    #[arg(long)]
    pub insecure: bool,

    /// Configuration file to use instead of ~/.rncs-mirror/config.ini
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log to stderr only
    #[arg(long)]
    pub no_log_file: bool,
}

/// Run the mirror command.
pub fn run(args: MirrorArgs, verbose: bool) -> Result<(), CliError> {
    let mut log_config = LogConfig::default().with_verbose(verbose);
    if args.no_log_file {
        log_config = log_config.without_file();
    }
    let _guard = init_logging(&log_config)?;

    let file = match &args.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    let config = resolve(file, &args, env::var(PASSWORD_ENV).ok())?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received, stopping");
        on_interrupt.cancel();
    })?;

    println!(
        "Mirroring {} into {}",
        config.remote_url,
        config.local_root.display()
    );
    let report = rncs_mirror::mirror(&config, cancel)?;
    println!("{}", report);

    Ok(())
}

/// Merge command-line flags and the password variable into the file settings.
fn resolve(
    mut file: ConfigFile,
    args: &MirrorArgs,
    env_password: Option<String>,
) -> Result<MirrorConfig, CliError> {
    if let Some(url) = &args.url {
        file.remote.url = Some(url.clone());
    }
    if let Some(user) = &args.user {
        file.remote.user = Some(user.clone());
    }
    if let Some(password) = env_password.filter(|p| !p.is_empty()) {
        file.remote.password = Some(password);
    }
    if let Some(root) = &args.local_root {
        file.local.root = Some(root.clone());
    }
    if args.fail_stop {
        file.sync.fail_stop = true;
    }
    if let Some(attempts) = args.max_attempts {
        if attempts == 0 {
            return Err(CliError::InvalidArgument(
                "--max-attempts must be at least 1".to_string(),
            ));
        }
        file.sync.fail_stop = false;
        file.sync.max_attempts = attempts;
    }
    if let Some(depth) = args.max_depth {
        file.sync.max_depth = depth;
    }
    if args.insecure {
        file.transfer.verify_peer = false;
    }

    Ok(file.resolve()?)
}
