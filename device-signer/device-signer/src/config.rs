use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/device-signer/config.toml";
const CONFIG_PATH_ENV: &str = "DEVICE_SIGNER_CONFIG";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub transport: TransportConfig,
    pub secret: SecretConfig,
    pub presence: PresenceConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    pub command_fifo: PathBuf,
    pub response_fifo: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretConfig {
    /// Base64 device secret file. Without it the TPM is tried.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresenceConfig {
    pub flash_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            command_fifo: PathBuf::from("/run/device-signer/cmd"),
            response_fifo: PathBuf::from("/run/device-signer/rsp"),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            flash_interval_ms: 350,
        }
    }
}

impl PresenceConfig {
    pub fn flash_interval(&self) -> Duration {
        Duration::from_millis(self.flash_interval_ms)
    }
}

/// Load the config from `$DEVICE_SIGNER_CONFIG` or the default path.
///
/// A missing file at the default path means built-in defaults; an
/// explicitly configured path must exist.
pub fn load() -> Result<Config> {
    let (path, explicit) = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => (PathBuf::from(path), true),
        Err(_) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    if !explicit && !path.exists() {
        log::info!("no config at {}, using defaults", path.display());
        return validate(Config::default());
    }

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config from {}", path.display()))?;
    parse(&raw, &path)
}

fn parse(raw: &str, path: &Path) -> Result<Config> {
    let config: Config = toml::from_str(raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    validate(config)
}

fn validate(config: Config) -> Result<Config> {
    if config.transport.command_fifo == config.transport.response_fifo {
        bail!("transport.command_fifo and transport.response_fifo must differ");
    }
    if config.presence.flash_interval_ms == 0 {
        bail!("presence.flash_interval_ms must be greater than zero");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(raw: &str) -> Result<Config> {
        parse(raw, Path::new("test.toml"))
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_str("").unwrap();
        assert_eq!(config.transport.command_fifo, PathBuf::from("/run/device-signer/cmd"));
        assert_eq!(config.secret.path, None);
        assert_eq!(config.presence.flash_interval(), Duration::from_millis(350));
    }

    #[test]
    fn full_file() {
        let config = parse_str(
            r#"
            [transport]
            command_fifo = "/tmp/a"
            response_fifo = "/tmp/b"

            [secret]
            path = "/tmp/secret"

            [presence]
            flash_interval_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.transport.response_fifo, PathBuf::from("/tmp/b"));
        assert_eq!(config.secret.path, Some(PathBuf::from("/tmp/secret")));
        assert_eq!(config.presence.flash_interval_ms, 100);
    }

    #[test]
    fn rejects_shared_fifo() {
        let err = parse_str(
            r#"
            [transport]
            command_fifo = "/tmp/x"
            response_fifo = "/tmp/x"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn rejects_zero_interval_and_unknown_keys() {
        assert!(parse_str("[presence]\nflash_interval_ms = 0\n").is_err());
        assert!(parse_str("[presence]\ntouch = false\n").is_err());
    }
}
