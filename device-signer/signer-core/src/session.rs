//! Session state: live identity, chunked message accumulation, and the
//! last signature.
//!
//! `Idle` (nothing declared) → `Accumulating` (size declared, bytes pending)
//! → signed, then back to `Idle` until the next size declaration.

use thiserror::Error;

use crate::crypto::{DIGEST_LEN, SIGNATURE_LEN, SigningIdentity};
use crate::proto::CMDLEN_MAXBYTES;

pub const MAX_SIGN_SIZE: usize = 4096;
/// Message bytes carried by one data chunk frame (frame minus opcode).
pub const CHUNK_LEN: usize = CMDLEN_MAXBYTES - 1;

/// Blocking human confirmation, required before any signature is made.
pub trait ConfirmPresence {
    fn confirm(&mut self);
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("declared message size {0} exceeds {MAX_SIGN_SIZE} bytes")]
    MessageTooLarge(u32),
    #[error("no message size declared")]
    NoPendingMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Pending { remaining: usize },
    Signed,
}

struct PendingMessage {
    buf: Box<[u8; MAX_SIGN_SIZE]>,
    // 0 means no message is pending.
    declared: usize,
    cursor: usize,
    remaining: usize,
}

#[derive(Clone, Copy)]
struct SignatureRecord {
    bytes: [u8; SIGNATURE_LEN],
    valid: bool,
}

pub struct Session {
    identity: SigningIdentity,
    message: PendingMessage,
    signature: SignatureRecord,
}

impl Session {
    pub fn new(identity: SigningIdentity) -> Self {
        Self {
            identity,
            message: PendingMessage {
                buf: Box::new([0u8; MAX_SIGN_SIZE]),
                declared: 0,
                cursor: 0,
                remaining: 0,
            },
            signature: SignatureRecord {
                bytes: [0u8; SIGNATURE_LEN],
                valid: false,
            },
        }
    }

    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    /// Swap in a re-derived identity. The signature record is kept as is.
    pub fn replace_identity(&mut self, identity: SigningIdentity) {
        self.identity = identity;
    }

    /// Declared size and bytes still expected, if a message is pending.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> Option<(usize, usize)> {
        (self.message.declared != 0).then_some((self.message.declared, self.message.remaining))
    }

    /// Start a new chunked message of `size` bytes.
    ///
    /// Any previous signature is invalidated first, even when `size` is
    /// rejected. A size of 0 is accepted but leaves nothing pending.
    pub fn declare_size(&mut self, size: u32) -> Result<(), SessionError> {
        self.signature.valid = false;

        let msg = &mut self.message;
        match usize::try_from(size) {
            Ok(n) if n <= MAX_SIGN_SIZE => {
                msg.declared = n;
                msg.remaining = n;
                msg.cursor = 0;
                Ok(())
            }
            _ => {
                msg.declared = 0;
                msg.remaining = 0;
                Err(SessionError::MessageTooLarge(size))
            }
        }
    }

    /// Copy the part of `chunk` the pending message still needs.
    ///
    /// The chunk that completes the message blocks on `presence`, then the
    /// whole message is signed with pure Ed25519.
    pub fn append_chunk<P: ConfirmPresence + ?Sized>(
        &mut self,
        chunk: &[u8; CHUNK_LEN],
        presence: &mut P,
    ) -> Result<ChunkOutcome, SessionError> {
        let msg = &mut self.message;
        if msg.declared == 0 {
            return Err(SessionError::NoPendingMessage);
        }

        let n = msg.remaining.min(CHUNK_LEN);
        msg.buf[msg.cursor..msg.cursor + n].copy_from_slice(&chunk[..n]);
        msg.cursor += n;
        msg.remaining -= n;

        if msg.remaining > 0 {
            return Ok(ChunkOutcome::Pending {
                remaining: msg.remaining,
            });
        }

        presence.confirm();
        let signature = self.identity.sign(&msg.buf[..msg.declared]);
        self.signature = SignatureRecord {
            bytes: signature,
            valid: true,
        };
        msg.declared = 0;
        Ok(ChunkOutcome::Signed)
    }

    /// Ed25519ph over a host-computed digest. Leaves any pending message alone.
    pub fn sign_prehashed<P: ConfirmPresence + ?Sized>(
        &mut self,
        digest: &[u8; DIGEST_LEN],
        presence: &mut P,
    ) {
        presence.confirm();
        self.signature = SignatureRecord {
            bytes: self.identity.sign_prehashed(digest),
            valid: true,
        };
    }

    pub fn signature(&self) -> Option<&[u8; SIGNATURE_LEN]> {
        self.signature.valid.then_some(&self.signature.bytes)
    }
}
