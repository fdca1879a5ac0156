//! Configuration for a mirror run.
//!
//! Settings live in an INI file at `~/.rncs-mirror/config.ini`:
//!
//! ```ini
//! [remote]
//! url = ftp://opendata-rncs.inpi.fr/public/Bilans_Donnees_Saisies/
//! user = alice
//! password = s3cret
//!
//! [local]
//! root = /srv/rncs
//!
//! [transfer]
//! connect_timeout = 30
//! timeout = 0
//! low_speed_limit = 1
//! low_speed_time = 120
//! verify_peer = true
//!
//! [sync]
//! mismatch_policy = retry
//! max_attempts = 3
//! max_depth = 32
//! ```
//!
//! [`ConfigFile`] mirrors the file with every value optional or defaulted;
//! [`ConfigFile::resolve`] turns it into a validated [`MirrorConfig`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use crate::crawler::DEFAULT_MAX_DEPTH;
use crate::error::{MirrorError, MirrorResult};
use crate::sync::{MismatchPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::transport::{Credentials, TransportConfig};

/// Directory under the home directory holding config and logs.
pub const CONFIG_DIR_NAME: &str = ".rncs-mirror";

pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Environment variable that overrides `remote.password`.
pub const PASSWORD_ENV: &str = "RNCS_MIRROR_PASSWORD";

/// `~/.rncs-mirror`, or `./.rncs-mirror` without a home directory.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

pub fn log_directory() -> PathBuf {
    config_directory().join("logs")
}

/// Everything one mirror run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Remote root directory, `ftp://` (explicit TLS) or `ftps://` (implicit TLS).
    pub remote_url: String,
    pub credentials: Credentials,
    /// Local directory mirroring the remote root.
    pub local_root: PathBuf,
    pub transport: TransportConfig,
    pub policy: MismatchPolicy,
    pub max_depth: usize,
}

impl MirrorConfig {
    pub fn new(
        remote_url: impl Into<String>,
        credentials: Credentials,
        local_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote_url: remote_url.into(),
            credentials,
            local_root: local_root.into(),
            transport: TransportConfig::default(),
            policy: MismatchPolicy::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_policy(mut self, policy: MismatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Check that the configuration can drive a run.
    pub fn validate(&self) -> MirrorResult<()> {
        if self.remote_url.is_empty() {
            return Err(invalid("remote URL is empty"));
        }
        if !(self.remote_url.starts_with("ftp://") || self.remote_url.starts_with("ftps://")) {
            return Err(invalid(format!(
                "remote URL '{}' must start with ftp:// or ftps://",
                self.remote_url
            )));
        }
        if self.credentials.user.is_empty() {
            return Err(invalid("user is empty"));
        }
        if self.local_root.as_os_str().is_empty() {
            return Err(invalid("local root is empty"));
        }
        if let MismatchPolicy::Retry { max_attempts: 0 } = self.policy {
            return Err(invalid("max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// `[remote]` section.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RemoteSettings {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// `[local]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSettings {
    pub root: Option<PathBuf>,
}

/// `[sync]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub fail_stop: bool,
    pub max_attempts: u32,
    pub max_depth: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fail_stop: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SyncSettings {
    pub fn policy(&self) -> MismatchPolicy {
        if self.fail_stop {
            MismatchPolicy::FailStop
        } else {
            MismatchPolicy::Retry {
                max_attempts: self.max_attempts,
            }
        }
    }
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub remote: RemoteSettings,
    pub local: LocalSettings,
    pub transfer: TransportConfig,
    pub sync: SyncSettings,
}

impl ConfigFile {
    /// Load from [`config_file_path`]; a missing file yields defaults.
    pub fn load() -> MirrorResult<Self> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> MirrorResult<Self> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| invalid(format!("{}: {}", path.display(), e)))?;
        Self::from_ini(&ini)
    }

    /// Parse INI text. Unknown sections and keys are ignored.
    pub fn parse(text: &str) -> MirrorResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| invalid(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> MirrorResult<Self> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Write to [`config_file_path`], creating its directory.
    pub fn save(&self) -> MirrorResult<()> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> MirrorResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MirrorError::local_io(parent, e))?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|e| MirrorError::local_io(path, e))
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.raw(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini
    }

    /// Build a validated [`MirrorConfig`]; required values must be set.
    pub fn resolve(&self) -> MirrorResult<MirrorConfig> {
        let url = required(&self.remote.url, ConfigKey::RemoteUrl)?;
        let user = required(&self.remote.user, ConfigKey::RemoteUser)?;
        let password = self.remote.password.clone().ok_or_else(|| {
            invalid(format!(
                "{} is not set (or set {})",
                ConfigKey::RemotePassword,
                PASSWORD_ENV
            ))
        })?;
        let root = self
            .local
            .root
            .clone()
            .ok_or_else(|| invalid(format!("{} is not set", ConfigKey::LocalRoot)))?;

        let config = MirrorConfig::new(url, Credentials::new(user, password), root)
            .with_transport(self.transfer.clone())
            .with_policy(self.sync.policy())
            .with_max_depth(self.sync.max_depth);
        config.validate()?;
        Ok(config)
    }
}

/// A `section.key` setting of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    RemoteUrl,
    RemoteUser,
    RemotePassword,
    LocalRoot,
    TransferConnectTimeout,
    TransferTimeout,
    TransferLowSpeedLimit,
    TransferLowSpeedTime,
    TransferVerifyPeer,
    SyncMismatchPolicy,
    SyncMaxAttempts,
    SyncMaxDepth,
}

const ALL_KEYS: [ConfigKey; 12] = [
    ConfigKey::RemoteUrl,
    ConfigKey::RemoteUser,
    ConfigKey::RemotePassword,
    ConfigKey::LocalRoot,
    ConfigKey::TransferConnectTimeout,
    ConfigKey::TransferTimeout,
    ConfigKey::TransferLowSpeedLimit,
    ConfigKey::TransferLowSpeedTime,
    ConfigKey::TransferVerifyPeer,
    ConfigKey::SyncMismatchPolicy,
    ConfigKey::SyncMaxAttempts,
    ConfigKey::SyncMaxDepth,
];

impl ConfigKey {
    /// All keys, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        &ALL_KEYS
    }

    pub fn section(&self) -> &'static str {
        match self {
            Self::RemoteUrl | Self::RemoteUser | Self::RemotePassword => "remote",
            Self::LocalRoot => "local",
            Self::TransferConnectTimeout
            | Self::TransferTimeout
            | Self::TransferLowSpeedLimit
            | Self::TransferLowSpeedTime
            | Self::TransferVerifyPeer => "transfer",
            Self::SyncMismatchPolicy | Self::SyncMaxAttempts | Self::SyncMaxDepth => "sync",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Self::RemoteUrl => "url",
            Self::RemoteUser => "user",
            Self::RemotePassword => "password",
            Self::LocalRoot => "root",
            Self::TransferConnectTimeout => "connect_timeout",
            Self::TransferTimeout => "timeout",
            Self::TransferLowSpeedLimit => "low_speed_limit",
            Self::TransferLowSpeedTime => "low_speed_time",
            Self::TransferVerifyPeer => "verify_peer",
            Self::SyncMismatchPolicy => "mismatch_policy",
            Self::SyncMaxAttempts => "max_attempts",
            Self::SyncMaxDepth => "max_depth",
        }
    }

    /// `section.key`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Value for display; the password is masked.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            Self::RemotePassword if config.remote.password.is_some() => "********".to_string(),
            _ => self.raw(config),
        }
    }

    /// Value as written to the file; empty when unset.
    fn raw(&self, config: &ConfigFile) -> String {
        let transfer = &config.transfer;
        match self {
            Self::RemoteUrl => config.remote.url.clone().unwrap_or_default(),
            Self::RemoteUser => config.remote.user.clone().unwrap_or_default(),
            Self::RemotePassword => config.remote.password.clone().unwrap_or_default(),
            Self::LocalRoot => config
                .local
                .root
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            Self::TransferConnectTimeout => transfer.connect_timeout.as_secs().to_string(),
            Self::TransferTimeout => transfer
                .timeout
                .map_or(0, |t| t.as_secs())
                .to_string(),
            Self::TransferLowSpeedLimit => transfer.low_speed_limit.to_string(),
            Self::TransferLowSpeedTime => transfer.low_speed_time.as_secs().to_string(),
            Self::TransferVerifyPeer => transfer.verify_peer.to_string(),
            Self::SyncMismatchPolicy => match config.sync.policy() {
                MismatchPolicy::FailStop => "fail-stop".to_string(),
                MismatchPolicy::Retry { .. } => "retry".to_string(),
            },
            Self::SyncMaxAttempts => config.sync.max_attempts.to_string(),
            Self::SyncMaxDepth => config.sync.max_depth.to_string(),
        }
    }

    /// Parse `value` and store it in `config`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> MirrorResult<()> {
        let value = value.trim();
        let text = || (!value.is_empty()).then(|| value.to_string());
        match self {
            Self::RemoteUrl => config.remote.url = text(),
            Self::RemoteUser => config.remote.user = text(),
            Self::RemotePassword => config.remote.password = text(),
            Self::LocalRoot => config.local.root = text().map(PathBuf::from),
            Self::TransferConnectTimeout => {
                config.transfer.connect_timeout = Duration::from_secs(self.parse(value)?)
            }
            Self::TransferTimeout => {
                let secs: u64 = self.parse(value)?;
                config.transfer.timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }
            Self::TransferLowSpeedLimit => config.transfer.low_speed_limit = self.parse(value)?,
            Self::TransferLowSpeedTime => {
                config.transfer.low_speed_time = Duration::from_secs(self.parse(value)?)
            }
            Self::TransferVerifyPeer => config.transfer.verify_peer = self.parse_bool(value)?,
            Self::SyncMismatchPolicy => {
                config.sync.fail_stop = match value.to_lowercase().as_str() {
                    "retry" => false,
                    "fail-stop" | "failstop" | "fail_stop" => true,
                    _ => return Err(self.bad_value(value, "retry or fail-stop")),
                }
            }
            Self::SyncMaxAttempts => {
                let attempts: u32 = self.parse(value)?;
                if attempts == 0 {
                    return Err(self.bad_value(value, "at least 1"));
                }
                config.sync.max_attempts = attempts;
            }
            Self::SyncMaxDepth => config.sync.max_depth = self.parse(value)?,
        }
        Ok(())
    }

    fn parse<T: FromStr>(&self, value: &str) -> MirrorResult<T> {
        value
            .parse()
            .map_err(|_| self.bad_value(value, "a non-negative integer"))
    }

    fn parse_bool(&self, value: &str) -> MirrorResult<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(self.bad_value(value, "true or false")),
        }
    }

    fn bad_value(&self, value: &str, expected: &str) -> MirrorError {
        invalid(format!(
            "invalid value '{}' for {}: expected {}",
            value, self, expected
        ))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| invalid(format!("unknown configuration key '{}'", s)))
    }
}

fn invalid(message: impl Into<String>) -> MirrorError {
    MirrorError::InvalidConfig(message.into())
}

fn required(value: &Option<String>, key: ConfigKey) -> MirrorResult<String> {
    value
        .clone()
        .ok_or_else(|| invalid(format!("{} is not set", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FULL: &str = "\
[remote]
url = ftp://rncs.example/bilans/
user = alice
password = s3cret

[local]
root = /srv/rncs

[transfer]
connect_timeout = 10
timeout = 3600
low_speed_limit = 512
low_speed_time = 60
verify_peer = false

[sync]
mismatch_policy = fail-stop
max_attempts = 5
max_depth = 4
";

    #[test]
    fn test_parse_full_file() {
        let config = ConfigFile::parse(FULL).unwrap();

        assert_eq!(config.remote.url.as_deref(), Some("ftp://rncs.example/bilans/"));
        assert_eq!(config.remote.user.as_deref(), Some("alice"));
        assert_eq!(config.local.root, Some(PathBuf::from("/srv/rncs")));
        assert_eq!(config.transfer.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.transfer.timeout, Some(Duration::from_secs(3600)));
        assert_eq!(config.transfer.low_speed_limit, 512);
        assert!(!config.transfer.verify_peer);
        assert!(config.sync.fail_stop);
        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.sync.max_depth, 4);
    }

    #[test]
    fn test_parse_empty_gives_defaults() {
        let config = ConfigFile::parse("").unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.sync.policy(), MismatchPolicy::default());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = ConfigFile::parse("[remote]\nproxy = none\n[other]\nx = 1\n").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let config = ConfigFile::parse("[transfer]\ntimeout = 0\n").unwrap();
        assert_eq!(config.transfer.timeout, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for text in [
            "[transfer]\nconnect_timeout = soon\n",
            "[transfer]\nverify_peer = maybe\n",
            "[sync]\nmismatch_policy = ignore\n",
            "[sync]\nmax_attempts = 0\n",
        ] {
            let result = ConfigFile::parse(text);
            assert!(
                matches!(result, Err(MirrorError::InvalidConfig(_))),
                "accepted: {}",
                text
            );
        }
    }

    #[test]
    fn test_resolve() {
        let config = ConfigFile::parse(FULL).unwrap().resolve().unwrap();

        assert_eq!(config.remote_url, "ftp://rncs.example/bilans/");
        assert_eq!(config.credentials, Credentials::new("alice", "s3cret"));
        assert_eq!(config.local_root, PathBuf::from("/srv/rncs"));
        assert_eq!(config.policy, MismatchPolicy::FailStop);
        assert_eq!(config.max_depth, 4);
    }

    #[test]
    fn test_resolve_missing_values() {
        let err = ConfigFile::default().resolve().unwrap_err();
        assert!(err.to_string().contains("remote.url"));

        let mut config = ConfigFile::parse(FULL).unwrap();
        config.remote.password = None;
        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains(PASSWORD_ENV));
    }

    #[test]
    fn test_validate_rejects_non_ftp_url() {
        let config = MirrorConfig::new(
            "https://rncs.example/",
            Credentials::new("alice", "pw"),
            "/srv/rncs",
        );
        assert!(matches!(
            config.validate(),
            Err(MirrorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_mirror_config_builders() {
        let config = MirrorConfig::new("ftps://h/", Credentials::new("u", "p"), "/tmp/m")
            .with_policy(MismatchPolicy::FailStop)
            .with_max_depth(2)
            .with_transport(TransportConfig::default().with_verify_peer(false));

        assert!(config.validate().is_ok());
        assert_eq!(config.policy, MismatchPolicy::FailStop);
        assert_eq!(config.max_depth, 2);
        assert!(!config.transport.verify_peer);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(CONFIG_FILE_NAME);
        let config = ConfigFile::parse(FULL).unwrap();

        config.save_to(&path).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_key_parse_and_display() {
        let key: ConfigKey = "sync.max_depth".parse().unwrap();
        assert_eq!(key, ConfigKey::SyncMaxDepth);
        assert_eq!(key.to_string(), "sync.max_depth");
        assert!("sync.nope".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_password_is_masked() {
        let config = ConfigFile::parse(FULL).unwrap();
        assert_eq!(ConfigKey::RemotePassword.get(&config), "********");
        assert!(!format!("{:?}", config).contains("s3cret"));
        assert_eq!(ConfigKey::RemotePassword.get(&ConfigFile::default()), "");
    }

    #[test]
    fn test_config_paths() {
        assert!(config_file_path().ends_with(".rncs-mirror/config.ini"));
        assert!(log_directory().starts_with(config_directory()));
    }
}
