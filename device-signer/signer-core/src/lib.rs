pub mod app;
pub mod command;
pub mod crypto;
pub mod presence;
pub mod proto;
pub mod response;
pub mod secret;
pub mod session;

#[cfg(feature = "tpm-source")]
pub mod tpm;

use anyhow::Result;
use std::path::Path;

pub use app::{Reply, SignerApp};
pub use secret::DeviceSecret;

/// Trait for platform-specific device secret sources.
///
/// Each source returns the fixed 32-byte device secret that keys the
/// BLAKE2s derivation of every signing identity. The secret is read once
/// at startup and never leaves the process.
pub trait SecretSource {
    /// Return the device secret.
    fn device_secret(&self) -> Result<DeviceSecret>;
}

/// Pick the device secret source and return it.
///
/// Detection order: explicit secret file → TPM → error.
pub fn detect_source(secret_path: Option<&Path>) -> Result<Box<dyn SecretSource>> {
    if let Some(path) = secret_path {
        log::info!("using device secret file {}", path.display());
        return Ok(Box::new(secret::FileSecretSource::new(path)));
    }

    #[cfg(feature = "tpm-source")]
    if tpm::detect_platform() {
        log::info!("detected TPM device secret source");
        return Ok(Box::new(tpm::TpmSecretSource::default()));
    }

    anyhow::bail!("no device secret source detected")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_file_wins() {
        let source = detect_source(Some(Path::new("/nonexistent/secret")));
        assert!(source.is_ok());
        // The file is only read when the secret is requested.
        assert!(source.unwrap().device_secret().is_err());
    }

    #[cfg(not(feature = "tpm-source"))]
    #[test]
    fn no_source_without_file() {
        assert!(detect_source(None).is_err());
    }
}
