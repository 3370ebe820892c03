//! Fixed-layout reply payloads.
//!
//! A reply frame is the header byte, the response code, then the rest of
//! the frame length as body. Unused body bytes are zero.

use std::io::{self, Write};

use crate::crypto::{PUBLIC_KEY_LEN, SIGNATURE_LEN};
use crate::proto::{CMDLEN_MAXBYTES, CmdLen, FrameHeader, Status};

pub const APP_NAME0: [u8; 4] = *b"tk1 ";
pub const APP_NAME1: [u8; 4] = *b"sign";
pub const APP_VERSION: u32 = 0x0000_0001;

const BODY_LEN: usize = CMDLEN_MAXBYTES - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseCode {
    GetPubkey = 0x02,
    SetSize = 0x04,
    SignData = 0x06,
    GetSig = 0x08,
    GetNameVersion = 0x0a,
    SignPhData = 0x0c,
    SetSeed = 0x0e,
    UnknownCmd = 0xff,
}

impl ResponseCode {
    pub const fn frame_len(self) -> CmdLen {
        match self {
            Self::GetPubkey | Self::GetSig => CmdLen::Len128,
            Self::GetNameVersion => CmdLen::Len32,
            Self::SetSize | Self::SignData | Self::SignPhData | Self::SetSeed => CmdLen::Len4,
            Self::UnknownCmd => CmdLen::Len1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    code: ResponseCode,
    body: [u8; BODY_LEN],
}

impl Response {
    fn empty(code: ResponseCode) -> Self {
        Self {
            code,
            body: [0u8; BODY_LEN],
        }
    }

    pub fn public_key(key: &[u8; PUBLIC_KEY_LEN]) -> Self {
        let mut rsp = Self::empty(ResponseCode::GetPubkey);
        rsp.body[..PUBLIC_KEY_LEN].copy_from_slice(key);
        rsp
    }

    pub fn status(code: ResponseCode, status: Status) -> Self {
        let mut rsp = Self::empty(code);
        rsp.body[0] = status as u8;
        rsp
    }

    /// Status plus signature; the signature bytes stay zero on failure.
    pub fn signature(signature: Option<&[u8; SIGNATURE_LEN]>) -> Self {
        match signature {
            Some(sig) => {
                let mut rsp = Self::status(ResponseCode::GetSig, Status::Ok);
                rsp.body[1..1 + SIGNATURE_LEN].copy_from_slice(sig);
                rsp
            }
            None => Self::status(ResponseCode::GetSig, Status::Bad),
        }
    }

    /// Name and version, or an all-zero body when `well_formed` is false.
    pub fn name_version(well_formed: bool) -> Self {
        let mut rsp = Self::empty(ResponseCode::GetNameVersion);
        if well_formed {
            rsp.body[0..4].copy_from_slice(&APP_NAME0);
            rsp.body[4..8].copy_from_slice(&APP_NAME1);
            rsp.body[8..12].copy_from_slice(&APP_VERSION.to_le_bytes());
        }
        rsp
    }

    pub fn unknown_command() -> Self {
        Self::empty(ResponseCode::UnknownCmd)
    }

    pub fn code(&self) -> ResponseCode {
        self.code
    }

    /// Bytes after the response code, exactly as sent.
    pub fn body(&self) -> &[u8] {
        &self.body[..self.code.frame_len().bytes() - 1]
    }

    pub fn write_to<W: Write + ?Sized>(&self, request: &FrameHeader, writer: &mut W) -> io::Result<()> {
        let len = self.code.frame_len();
        writer.write_all(&[request.reply_byte(Status::Ok, len), self.code as u8])?;
        writer.write_all(self.body())
    }
}

/// Rejection for frames addressed to the firmware endpoint.
pub fn write_nok<W: Write + ?Sized>(request: &FrameHeader, writer: &mut W) -> io::Result<()> {
    // Smallest payload is one byte.
    writer.write_all(&[request.reply_byte(Status::Bad, CmdLen::Len1), 0])
}
