//! Frame protocol: one header byte followed by a fixed-length payload.
//!
//! Header layout (MSB first): version (1 bit, must be 0), frame id (2),
//! endpoint (2), status (1, must be 0 in requests), length code (2).

use std::io::{self, Read};
use thiserror::Error;

pub const CMDLEN_MAXBYTES: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Endpoint {
    HwIfpga = 0,
    HwAfpga = 1,
    Firmware = 2,
    App = 3,
}

impl Endpoint {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::HwIfpga,
            1 => Self::HwAfpga,
            2 => Self::Firmware,
            _ => Self::App,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdLen {
    Len1 = 0,
    Len4 = 1,
    Len32 = 2,
    Len128 = 3,
}

impl CmdLen {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Len1,
            1 => Self::Len4,
            2 => Self::Len32,
            _ => Self::Len128,
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            Self::Len1 => 1,
            Self::Len4 => 4,
            Self::Len32 => 32,
            Self::Len128 => 128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Bad = 1,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("unsupported protocol version in header {0:#04x}")]
    BadVersion(u8),
    #[error("reserved bit set in request header {0:#04x}")]
    ReservedBit(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: u8,
    pub endpoint: Endpoint,
    pub len: CmdLen,
}

impl FrameHeader {
    pub fn parse(byte: u8) -> Result<Self, FrameError> {
        if byte & 0x80 != 0 {
            return Err(FrameError::BadVersion(byte));
        }
        if byte & 0x04 != 0 {
            return Err(FrameError::ReservedBit(byte));
        }
        Ok(Self {
            id: (byte & 0x60) >> 5,
            endpoint: Endpoint::from_bits(byte >> 3),
            len: CmdLen::from_bits(byte),
        })
    }

    /// Header byte for a reply to this frame with the given status and length.
    pub fn reply_byte(&self, status: Status, len: CmdLen) -> u8 {
        ((self.id & 0x3) << 5) | ((self.endpoint as u8) << 3) | ((status as u8) << 2) | len as u8
    }
}

/// A decoded request frame. `data` is zero padded past the frame length.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub data: [u8; CMDLEN_MAXBYTES],
}

impl Frame {
    pub fn new(header: FrameHeader, payload: &[u8]) -> Self {
        let mut data = [0u8; CMDLEN_MAXBYTES];
        let n = payload.len().min(header.len.bytes());
        data[..n].copy_from_slice(&payload[..n]);
        Self { header, data }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.header.len.bytes()]
    }

    pub fn opcode(&self) -> u8 {
        self.data[0]
    }
}

/// Read the next frame, skipping bytes that are not valid headers.
///
/// Returns `Ok(None)` on end of stream between frames.
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> io::Result<Option<Frame>> {
    loop {
        let mut byte = [0u8; 1];
        match reader.read_exact(&mut byte) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }

        let header = match FrameHeader::parse(byte[0]) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("couldn't parse header: {e}");
                continue;
            }
        };

        let mut data = [0u8; CMDLEN_MAXBYTES];
        reader.read_exact(&mut data[..header.len.bytes()])?;
        return Ok(Some(Frame { header, data }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_app_header() {
        // id 1, endpoint app, len 128
        let header = FrameHeader::parse(0b0011_1011).unwrap();
        assert_eq!(header.id, 1);
        assert_eq!(header.endpoint, Endpoint::App);
        assert_eq!(header.len, CmdLen::Len128);
    }

    #[test]
    fn rejects_version_and_reserved_bits() {
        assert_eq!(FrameHeader::parse(0x80), Err(FrameError::BadVersion(0x80)));
        assert_eq!(FrameHeader::parse(0x1c), Err(FrameError::ReservedBit(0x1c)));
    }

    #[test]
    fn reply_byte_echoes_id_and_endpoint() {
        let header = FrameHeader::parse(0b0101_1010).unwrap();
        assert_eq!(header.reply_byte(Status::Ok, CmdLen::Len4), 0b0101_1001);
        assert_eq!(header.reply_byte(Status::Bad, CmdLen::Len1), 0b0101_1100);
    }

    #[test]
    fn read_frame_skips_garbage_and_pads() {
        let mut stream = Cursor::new(vec![0xff, 0x84, 0b0001_1001, 0x03, 0x10, 0x00, 0x00]);
        let frame = read_frame(&mut stream).unwrap().unwrap();
        assert_eq!(frame.header.len, CmdLen::Len4);
        assert_eq!(frame.payload(), &[0x03, 0x10, 0x00, 0x00]);
        assert!(frame.data[4..].iter().all(|&b| b == 0));
        assert!(read_frame(&mut stream).unwrap().is_none());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut stream = Cursor::new(vec![0b0001_1011, 0x05, 0x01]);
        let err = read_frame(&mut stream).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
