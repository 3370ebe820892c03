//! Command dispatcher: one frame in, at most one reply out.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use std::io::{Read, Write};

use crate::command::{Command, Opcode};
use crate::crypto::SigningIdentity;
use crate::presence::{Indicator, LedColor, PresenceGate, PresenceSensor};
use crate::proto::{self, Endpoint, Frame, FrameHeader, Status};
use crate::response::{self, Response, ResponseCode};
use crate::secret::DeviceSecret;
use crate::session::{ChunkOutcome, Session, SessionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Rejection for frames meant for the firmware.
    Nok,
    App(Response),
}

impl Reply {
    pub fn write_to<W: Write + ?Sized>(&self, request: &FrameHeader, writer: &mut W) -> std::io::Result<()> {
        match self {
            Self::Nok => response::write_nok(request, writer),
            Self::App(rsp) => rsp.write_to(request, writer),
        }
    }
}

/// The signer application: device secret, session state and presence gate.
pub struct SignerApp<S, I> {
    secret: DeviceSecret,
    session: Session,
    gate: PresenceGate<S, I>,
}

impl<S: PresenceSensor, I: Indicator> SignerApp<S, I> {
    /// Bootstrap the default identity from the device secret alone.
    pub fn new(secret: DeviceSecret, gate: PresenceGate<S, I>) -> Self {
        let identity = SigningIdentity::derive(&secret, &[]);
        log::info!("public key: {}", B64.encode(identity.public_key()));
        Self {
            secret,
            session: Session::new(identity),
            gate,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn gate(&self) -> &PresenceGate<S, I> {
        &self.gate
    }

    /// Serve frames until the reader reaches end of stream.
    pub fn serve<R: Read + ?Sized, W: Write + ?Sized>(&mut self, reader: &mut R, writer: &mut W) -> Result<()> {
        loop {
            self.gate.indicator_mut().set(LedColor::Blue);

            let Some(frame) = proto::read_frame(reader).context("failed to read command frame")? else {
                log::info!("command stream closed");
                return Ok(());
            };

            if let Some(reply) = self.handle(&frame) {
                reply
                    .write_to(&frame.header, writer)
                    .and_then(|()| writer.flush())
                    .context("failed to write response frame")?;
            }
        }
    }

    /// Handle one frame. `None` means the frame was not for us and gets no reply.
    pub fn handle(&mut self, frame: &Frame) -> Option<Reply> {
        match frame.header.endpoint {
            Endpoint::App => {}
            Endpoint::Firmware => {
                log::debug!("responded NOK to frame meant for firmware");
                return Some(Reply::Nok);
            }
            other => {
                log::debug!("frame not meant for app, endpoint {other:?}");
                return None;
            }
        }

        let command = Command::decode(frame);
        log::debug!("{command:?}");

        let rsp = match command {
            Command::GetPublicKey => Response::public_key(&self.session.identity().public_key()),
            Command::ReDeriveIdentity { purpose } => {
                let identity = SigningIdentity::derive(&self.secret, purpose);
                log::info!("re-derived public key: {}", B64.encode(identity.public_key()));
                self.session.replace_identity(identity);
                Response::status(ResponseCode::SetSeed, Status::Ok)
            }
            Command::DeclareSize { size } => {
                let result = self.session.declare_size(size);
                Response::status(ResponseCode::SetSize, status_of(result))
            }
            Command::AppendChunk { chunk } => {
                let result = self.session.append_chunk(chunk, &mut self.gate);
                if let Ok(ChunkOutcome::Signed) = result {
                    log::info!("message signed");
                }
                Response::status(ResponseCode::SignData, status_of(result))
            }
            Command::SignPrehashed { digest } => {
                self.session.sign_prehashed(digest, &mut self.gate);
                log::info!("digest signed");
                Response::status(ResponseCode::SignPhData, Status::Ok)
            }
            Command::RetrieveSignature => {
                let signature = self.session.signature();
                if signature.is_none() {
                    log::warn!("no signature available");
                }
                Response::signature(signature)
            }
            Command::GetNameVersion => Response::name_version(true),
            Command::Malformed(Opcode::GetNameVersion) => {
                log::warn!("unexpected length for name/version request, replying zeroes");
                Response::name_version(false)
            }
            Command::Malformed(opcode) => {
                log::warn!("bad frame length {:?} for {opcode:?}", frame.header.len);
                Response::status(opcode.response_code(), Status::Bad)
            }
            Command::Unknown(opcode) => {
                log::warn!("received unknown command {opcode:#04x}");
                Response::unknown_command()
            }
        };
        Some(Reply::App(rsp))
    }
}

fn status_of<T>(result: Result<T, SessionError>) -> Status {
    match result {
        Ok(_) => Status::Ok,
        Err(e) => {
            log::warn!("{e}");
            Status::Bad
        }
    }
}
