use crate::crypto::{DIGEST_LEN, PURPOSE_LEN};
use crate::proto::{CmdLen, Frame};
use crate::response::ResponseCode;
use crate::session::CHUNK_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    GetPubkey = 0x01,
    SetSize = 0x03,
    SignData = 0x05,
    GetSig = 0x07,
    GetNameVersion = 0x09,
    SignPhData = 0x0b,
    SetSeed = 0x0d,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::GetPubkey,
            0x03 => Self::SetSize,
            0x05 => Self::SignData,
            0x07 => Self::GetSig,
            0x09 => Self::GetNameVersion,
            0x0b => Self::SignPhData,
            0x0d => Self::SetSeed,
            _ => return None,
        })
    }

    pub const fn response_code(self) -> ResponseCode {
        match self {
            Self::GetPubkey => ResponseCode::GetPubkey,
            Self::SetSize => ResponseCode::SetSize,
            Self::SignData => ResponseCode::SignData,
            Self::GetSig => ResponseCode::GetSig,
            Self::GetNameVersion => ResponseCode::GetNameVersion,
            Self::SignPhData => ResponseCode::SignPhData,
            Self::SetSeed => ResponseCode::SetSeed,
        }
    }

    /// Frame length the request must have, if the command checks it.
    pub const fn required_len(self) -> Option<CmdLen> {
        match self {
            Self::SetSize => Some(CmdLen::Len32),
            Self::SignData | Self::SignPhData => Some(CmdLen::Len128),
            Self::GetNameVersion => Some(CmdLen::Len1),
            Self::GetPubkey | Self::GetSig | Self::SetSeed => None,
        }
    }
}

/// A request decoded from an application frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    GetPublicKey,
    ReDeriveIdentity { purpose: &'a [u8; PURPOSE_LEN] },
    DeclareSize { size: u32 },
    AppendChunk { chunk: &'a [u8; CHUNK_LEN] },
    SignPrehashed { digest: &'a [u8; DIGEST_LEN] },
    RetrieveSignature,
    GetNameVersion,
    /// Known opcode in a frame of the wrong length.
    Malformed(Opcode),
    Unknown(u8),
}

impl<'a> Command<'a> {
    pub fn decode(frame: &'a Frame) -> Self {
        let Some(opcode) = Opcode::from_byte(frame.opcode()) else {
            return Self::Unknown(frame.opcode());
        };
        if let Some(len) = opcode.required_len() {
            if frame.header.len != len {
                return Self::Malformed(opcode);
            }
        }

        // Argument bytes follow the opcode; the frame buffer is zero padded.
        let args = &frame.data[1..];
        match opcode {
            Opcode::GetPubkey => Self::GetPublicKey,
            Opcode::SetSize => Self::DeclareSize {
                size: u32::from_le_bytes([args[0], args[1], args[2], args[3]]),
            },
            Opcode::SignData => Self::AppendChunk {
                chunk: fixed(args),
            },
            Opcode::GetSig => Self::RetrieveSignature,
            Opcode::GetNameVersion => Self::GetNameVersion,
            Opcode::SignPhData => Self::SignPrehashed {
                digest: fixed(&args[..DIGEST_LEN]),
            },
            Opcode::SetSeed => Self::ReDeriveIdentity {
                purpose: fixed(&args[..PURPOSE_LEN]),
            },
        }
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> &[u8; N] {
    bytes.try_into().expect("argument slice has the command's fixed width")
}
