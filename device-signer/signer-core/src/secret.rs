use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::SecretSource;

pub const DEVICE_SECRET_LEN: usize = 32;

/// Device-unique secret used only as key material for derivation.
///
/// Wiped on drop. There is deliberately no way to serialize it.
pub struct DeviceSecret(Zeroizing<[u8; DEVICE_SECRET_LEN]>);

impl DeviceSecret {
    pub fn new(bytes: [u8; DEVICE_SECRET_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != DEVICE_SECRET_LEN {
            bail!(
                "device secret must be {DEVICE_SECRET_LEN} bytes, got {}",
                bytes.len()
            );
        }
        let mut secret = Zeroizing::new([0u8; DEVICE_SECRET_LEN]);
        secret.copy_from_slice(bytes);
        Ok(Self(secret))
    }

    pub(crate) fn expose(&self) -> &[u8; DEVICE_SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for DeviceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceSecret(..)")
    }
}

/// Secret source backed by a file holding the base64-encoded secret.
pub struct FileSecretSource {
    path: PathBuf,
}

impl FileSecretSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SecretSource for FileSecretSource {
    fn device_secret(&self) -> Result<DeviceSecret> {
        let encoded = Zeroizing::new(
            std::fs::read_to_string(&self.path)
                .with_context(|| format!("failed to read device secret from {}", self.path.display()))?,
        );
        let raw = Zeroizing::new(
            B64.decode(encoded.trim())
                .with_context(|| format!("device secret in {} is not valid base64", self.path.display()))?,
        );
        DeviceSecret::from_slice(&raw)
            .with_context(|| format!("invalid device secret in {}", self.path.display()))
    }
}
