//! On-disk framing for [`crate::FileLog`].
//!
//! ```text
//! | magic (4) | version (2) | kind (1) | position (8) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! All integers are little-endian. The CRC covers every byte before it.

use crate::error::{LogError, LogResult};

/// Magic bytes identifying a log frame.
pub(crate) const FRAME_MAGIC: [u8; 4] = *b"LTLG";

/// Current frame format version.
pub(crate) const FRAME_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + position (8) + length (4)
pub(crate) const HEADER_SIZE: usize = 19;

pub(crate) const CRC_SIZE: usize = 4;

/// What a frame records about its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FrameKind {
    Data = 1,
    Fill = 2,
}

impl FrameKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Data),
            2 => Some(Self::Fill),
            _ => None,
        }
    }
}

/// A decoded frame header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    pub kind: FrameKind,
    pub position: u64,
    pub len: u32,
}

impl FrameHeader {
    /// Total size of the frame including header and CRC.
    pub fn frame_len(&self) -> u64 {
        (HEADER_SIZE + self.len as usize + CRC_SIZE) as u64
    }
}

/// Builds a complete frame.
pub(crate) fn encode_frame(kind: FrameKind, position: u64, payload: &[u8]) -> LogResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| LogError::corrupted("log payload larger than 4 GiB"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&FRAME_MAGIC);
    data.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    data.push(kind as u8);
    data.extend_from_slice(&position.to_le_bytes());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(payload);

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Parses a frame header. `offset` is only used for error reporting.
pub(crate) fn decode_header(bytes: &[u8], offset: u64) -> LogResult<FrameHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(LogError::corrupted(format!(
            "short frame header at offset {offset}"
        )));
    }
    if bytes[0..4] != FRAME_MAGIC {
        return Err(LogError::corrupted(format!("bad magic at offset {offset}")));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FRAME_VERSION {
        return Err(LogError::corrupted(format!(
            "unsupported frame version {version} at offset {offset}"
        )));
    }
    let kind = FrameKind::from_byte(bytes[6]).ok_or_else(|| {
        LogError::corrupted(format!("unknown frame kind {} at offset {offset}", bytes[6]))
    })?;
    let mut position = [0u8; 8];
    position.copy_from_slice(&bytes[7..15]);
    let mut len = [0u8; 4];
    len.copy_from_slice(&bytes[15..19]);

    Ok(FrameHeader {
        kind,
        position: u64::from_le_bytes(position),
        len: u32::from_le_bytes(len),
    })
}

/// Verifies the CRC trailing a complete frame.
pub(crate) fn verify_frame(frame: &[u8], offset: u64) -> LogResult<()> {
    let body_len = frame.len() - CRC_SIZE;
    let mut stored = [0u8; 4];
    stored.copy_from_slice(&frame[body_len..]);
    let expected = u32::from_le_bytes(stored);
    let actual = compute_crc32(&frame[..body_len]);
    if expected != actual {
        return Err(LogError::ChecksumMismatch {
            offset,
            expected,
            actual,
        });
    }
    Ok(())
}

/// CRC-32 (IEEE polynomial, reflected).
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let crc = data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    });
    !crc
}
