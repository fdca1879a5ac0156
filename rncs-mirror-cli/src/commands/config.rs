//! Configuration management CLI commands.
//!
//! `config get`, `config set` and `config path` read and edit
//! `~/.rncs-mirror/config.ini`. `config list` shows what a `mirror` run would
//! use before flags: each key's value and whether it comes from the file, the
//! built-in default or the password variable.

use std::env;

use clap::Subcommand;
use rncs_mirror::config::{config_file_path, ConfigFile, ConfigKey, PASSWORD_ENV};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., remote.url)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., remote.url)
        key: String,

        /// Value to set
        value: String,
    },

    /// List every setting with its effective value and where it comes from
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'rncs-mirror config list' to see available keys.",
            key
        ))
    })
}

fn run_get(key: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = ConfigFile::load()?;
    let value = config_key.get(&config);

    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }

    Ok(())
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let mut config = ConfigFile::load()?;
    config_key
        .set(&mut config, value)
        .map_err(|e| CliError::Config(e.to_string()))?;
    config.save()?;

    println!("Set {} = {}", config_key.name(), config_key.get(&config));

    Ok(())
}

fn run_list() -> Result<(), CliError> {
    let path = config_file_path();
    let config = ConfigFile::load()?;
    let env_password = env::var(PASSWORD_ENV).ok();

    if path.exists() {
        println!("File: {}", path.display());
    } else {
        println!("File: {} (missing, defaults apply)", path.display());
    }
    println!();

    for row in effective_settings(&config, env_password.as_deref()) {
        println!("  {:<26} {:<12} {}", row.name, row.source.label(), row.value);
    }

    Ok(())
}

/// Where the value a `mirror` run would use comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    File,
    Default,
    Environment,
    Unset,
}

impl Source {
    fn label(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Default => "default",
            Self::Environment => "env",
            Self::Unset => "unset",
        }
    }
}

#[derive(Debug)]
struct Setting {
    name: String,
    value: String,
    source: Source,
}

/// Effective value and origin of every key, before command-line flags.
fn effective_settings(config: &ConfigFile, env_password: Option<&str>) -> Vec<Setting> {
    let defaults = ConfigFile::default();
    let env_password = env_password.filter(|p| !p.is_empty());

    ConfigKey::all()
        .iter()
        .map(|key| {
            let value = key.get(config);
            let source = if *key == ConfigKey::RemotePassword && env_password.is_some() {
                Source::Environment
            } else if value.is_empty() {
                Source::Unset
            } else if value == key.get(&defaults) {
                Source::Default
            } else {
                Source::File
            };
            let value = match source {
                Source::Environment => format!("******** (from {})", PASSWORD_ENV),
                Source::Unset => "-".to_string(),
                _ => value,
            };
            Setting {
                name: key.name(),
                value,
                source,
            }
        })
        .collect()
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("local.root").unwrap(), ConfigKey::LocalRoot);

        let err = parse_key("local.nope").unwrap_err();
        assert!(err.to_string().contains("rncs-mirror config list"));
        assert_eq!(err.exit_code(), 2);
    }

    fn setting<'a>(settings: &'a [Setting], name: &str) -> &'a Setting {
        settings
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no setting {}", name))
    }

    #[test]
    fn test_effective_settings_sources() {
        let config = ConfigFile::parse(
            "[remote]\nurl = ftp://rncs.example/\npassword = from-file\n\
             [sync]\nmax_attempts = 5\nmax_depth = 32\n",
        )
        .unwrap();

        let settings = effective_settings(&config, None);

        assert_eq!(settings.len(), ConfigKey::all().len());
        let url = setting(&settings, "remote.url");
        assert_eq!(url.source, Source::File);
        assert_eq!(url.value, "ftp://rncs.example/");
        assert_eq!(setting(&settings, "sync.max_attempts").source, Source::File);
        assert_eq!(setting(&settings, "sync.max_depth").source, Source::Default);
        assert_eq!(setting(&settings, "transfer.connect_timeout").source, Source::Default);

        let user = setting(&settings, "remote.user");
        assert_eq!(user.source, Source::Unset);
        assert_eq!(user.value, "-");

        let password = setting(&settings, "remote.password");
        assert_eq!(password.source, Source::File);
        assert_eq!(password.value, "********");
    }

    #[test]
    fn test_effective_settings_password_from_env() {
        let settings = effective_settings(&ConfigFile::default(), Some("s3cret"));
        let password = setting(&settings, "remote.password");
        assert_eq!(password.source, Source::Environment);
        assert!(password.value.contains(PASSWORD_ENV));
        assert!(!password.value.contains("s3cret"));

        let settings = effective_settings(&ConfigFile::default(), Some(""));
        assert_eq!(setting(&settings, "remote.password").source, Source::Unset);
    }
}
