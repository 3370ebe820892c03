use blake2::Blake2sMac256;
use blake2::digest::Mac;
use digest::consts::U64;
use digest::{FixedOutput, HashMarker, Output, OutputSizeUser, Update};
use ed25519_dalek::{Signer, SigningKey};
use std::fmt;
use zeroize::Zeroizing;

use crate::secret::DeviceSecret;

pub const SEED_LEN: usize = 32;
pub const PURPOSE_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;
pub const DIGEST_LEN: usize = 64;

/// Derive a 32-byte Ed25519 seed from the device secret and a purpose tag.
///
/// - `secret`: BLAKE2s key
/// - `purpose`: BLAKE2s message; empty for the startup identity, 32 bytes
///   when the host re-derives
///
/// The output length is always 32 bytes, whatever the purpose length.
pub fn derive_ed25519_seed(secret: &DeviceSecret, purpose: &[u8]) -> Zeroizing<[u8; SEED_LEN]> {
    let mut mac = Blake2sMac256::new_from_slice(secret.expose())
        .expect("32 bytes is a valid BLAKE2s key");
    Mac::update(&mut mac, purpose);
    let mut seed = Zeroizing::new([0u8; SEED_LEN]);
    seed.copy_from_slice(&mac.finalize().into_bytes());
    seed
}

/// The live Ed25519 keypair.
///
/// The secret half never leaves this type; callers get signatures and the
/// public key only.
pub struct SigningIdentity {
    key: SigningKey,
}

impl SigningIdentity {
    pub fn derive(secret: &DeviceSecret, purpose: &[u8]) -> Self {
        let seed = derive_ed25519_seed(secret, purpose);
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.key.verifying_key().to_bytes()
    }

    #[cfg(test)]
    pub(crate) fn verifying_key(&self) -> ed25519_dalek::VerifyingKey {
        self.key.verifying_key()
    }

    /// Standard (pure) Ed25519 over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.key.sign(message).to_bytes()
    }

    /// Ed25519ph with an empty context over a digest the host already computed.
    pub fn sign_prehashed(&self, digest: &[u8; DIGEST_LEN]) -> [u8; SIGNATURE_LEN] {
        self.key
            .sign_prehashed(PrehashedDigest::new(digest), None)
            .expect("an empty Ed25519ph context is always valid")
            .to_bytes()
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// A "hash" whose output is a digest computed elsewhere.
///
/// `ed25519-dalek` only accepts prehashed input as a `Digest`; this hands it
/// the host's 64 bytes unchanged.
#[derive(Clone)]
struct PrehashedDigest {
    bytes: [u8; DIGEST_LEN],
    filled: usize,
}

impl PrehashedDigest {
    fn new(digest: &[u8; DIGEST_LEN]) -> Self {
        Self {
            bytes: *digest,
            filled: DIGEST_LEN,
        }
    }
}

impl Default for PrehashedDigest {
    fn default() -> Self {
        Self {
            bytes: [0u8; DIGEST_LEN],
            filled: 0,
        }
    }
}

impl HashMarker for PrehashedDigest {}

impl OutputSizeUser for PrehashedDigest {
    type OutputSize = U64;
}

impl Update for PrehashedDigest {
    fn update(&mut self, data: &[u8]) {
        let n = data.len().min(DIGEST_LEN - self.filled);
        self.bytes[self.filled..self.filled + n].copy_from_slice(&data[..n]);
        self.filled += n;
    }
}

impl FixedOutput for PrehashedDigest {
    fn finalize_into(self, out: &mut Output<Self>) {
        out.copy_from_slice(&self.bytes);
    }
}
