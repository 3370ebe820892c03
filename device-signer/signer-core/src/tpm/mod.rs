use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use tss_esapi::Context as TpmContext;
use tss_esapi::abstraction::public::DecodedKey;
use tss_esapi::handles::TpmHandle;
use tss_esapi::tcti_ldr::TctiNameConf;
use zeroize::Zeroizing;

use crate::SecretSource;
use crate::secret::DeviceSecret;

const AK_HANDLE: u32 = 0x81010002;
const DEFAULT_TPM_DEVICE: &str = "/dev/tpm0";

/// Check if a TPM device is available.
pub fn detect_platform() -> bool {
    std::path::Path::new(DEFAULT_TPM_DEVICE).exists()
}

/// TPM-backed device secret.
///
/// The secret is SHA-256 over the DER SubjectPublicKeyInfo of the
/// attestation key persisted at `0x81010002`, so it is stable for the
/// lifetime of that key and unique per TPM.
pub struct TpmSecretSource {
    device: String,
}

impl Default for TpmSecretSource {
    fn default() -> Self {
        Self {
            device: DEFAULT_TPM_DEVICE.to_string(),
        }
    }
}

impl SecretSource for TpmSecretSource {
    fn device_secret(&self) -> Result<DeviceSecret> {
        let der = ak_public_key_der(&self.device)?;
        let secret = secret_from_spki_der(&der);
        log::info!("derived device secret from TPM key {AK_HANDLE:#X}");
        Ok(secret)
    }
}

/// Device secret for a DER-encoded SubjectPublicKeyInfo: its SHA-256.
fn secret_from_spki_der(der: &[u8]) -> DeviceSecret {
    DeviceSecret::new(Sha256::digest(der).into())
}

fn ak_public_key_der(tpm_device: &str) -> Result<Zeroizing<Vec<u8>>> {
    let tcti = TctiNameConf::from_str(&format!("device:{tpm_device}"))
        .context("failed to create TCTI config")?;
    let mut ctx = TpmContext::new(tcti).context("failed to create TPM context")?;

    let tpm_handle: TpmHandle = AK_HANDLE.try_into().context("invalid AK handle")?;
    let ak_obj = ctx
        .execute_with_nullauth_session(|ctx| ctx.tr_from_tpm_public(tpm_handle))
        .context("no attestation key at the persistent handle")?;

    let (ak_public, _, _) = ctx
        .read_public(ak_obj.into())
        .context("failed to read attestation key")?;
    let decoded: DecodedKey = ak_public
        .try_into()
        .context("failed to decode attestation key")?;
    let DecodedKey::RsaPublicKey(rsa_pk) = decoded else {
        bail!("attestation key is not an RSA key");
    };

    let spki = picky_asn1_x509::SubjectPublicKeyInfo::new_rsa_key(
        rsa_pk.modulus,
        rsa_pk.public_exponent,
    );
    let der = picky_asn1_der::to_vec(&spki).context("failed to DER-encode attestation key")?;
    Ok(Zeroizing::new(der))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPKI_A: &[u8] = &[0x30, 0x0d, 0x30, 0x0b, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
    const SPKI_B: &[u8] = &[0x30, 0x0d, 0x30, 0x0b, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b];

    #[test]
    fn secret_is_sha256_of_key_der() {
        let secret = secret_from_spki_der(SPKI_A);
        let expected: [u8; 32] = Sha256::digest(SPKI_A).into();
        assert_eq!(secret.expose(), &expected);
    }

    #[test]
    fn distinct_keys_give_distinct_secrets() {
        let a = secret_from_spki_der(SPKI_A);
        let b = secret_from_spki_der(SPKI_B);
        assert_ne!(a.expose(), b.expose());
        assert_eq!(a.expose(), secret_from_spki_der(SPKI_A).expose());
    }
}
