//! Frame encoding and decoding.
//!
//! An encoded frame is the 32-byte header, the payload zero-padded to an
//! 8-byte boundary, and a zeroed reserved pad. The payload CRC is written to
//! both CRC fields; on decode it is only checked when the two copies agree.

use tracing::trace;

use crate::crc::crc16;
use crate::error::{FrameError, Result};
use crate::header::FrameHeader;
use crate::layout::encoded_len;
use crate::FRAME_HEADER_SIZE;

/// Packet-level fields shared by every frame of one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    /// Packet id
    pub pack_id: u32,
    /// Packet size in bytes
    pub pack_sz: u32,
    /// Number of frames in the packet
    pub num_frames: u32,
    /// Payload capacity per frame
    pub mtu: u32,
}

impl FrameMeta {
    /// Header for frame `frame_id` carrying `payload`
    #[must_use]
    pub fn header(&self, frame_id: u32, payload: &[u8]) -> FrameHeader {
        let crc = crc16(payload);
        FrameHeader {
            pack_id: self.pack_id,
            pack_sz: self.pack_sz,
            frame_id,
            num_frames: self.num_frames,
            mtu: self.mtu,
            frame_sz: payload.len() as u32,
            frame_crc: crc,
            frame_crc2: crc,
            ..FrameHeader::new()
        }
    }

    /// Header of the zero-length frame that closes a streamed burst
    #[must_use]
    pub fn end_of_burst(&self) -> FrameHeader {
        self.header(self.num_frames, &[])
    }
}

/// Encode frame `frame_id` of a packet into `out`. Returns the encoded length.
///
/// # Errors
///
/// - `FrameError::PayloadTooLarge` if `payload` exceeds the MTU
/// - `FrameError::BufferTooSmall` if `out` cannot hold the encoded frame
pub fn encode_frame(
    meta: &FrameMeta,
    frame_id: u32,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    if payload.len() > meta.mtu as usize {
        return Err(FrameError::PayloadTooLarge {
            len: payload.len(),
            mtu: meta.mtu as usize,
        });
    }
    encode_with_header(&meta.header(frame_id, payload), payload, out)
}

/// Encode an explicit header followed by `payload`. Returns the encoded length.
///
/// The header is written as given; `frame_sz` and the CRC fields are not recomputed.
///
/// # Errors
///
/// Returns `FrameError::BufferTooSmall` if `out` cannot hold the encoded frame.
pub fn encode_with_header(header: &FrameHeader, payload: &[u8], out: &mut [u8]) -> Result<usize> {
    let needed = encoded_len(payload.len());
    if out.len() < needed {
        return Err(FrameError::BufferTooSmall {
            needed,
            available: out.len(),
        });
    }

    header.encode_into(&mut out[..FRAME_HEADER_SIZE]);
    let payload_end = FRAME_HEADER_SIZE + payload.len();
    out[FRAME_HEADER_SIZE..payload_end].copy_from_slice(payload);
    out[payload_end..needed].fill(0);

    trace!(
        pack_id = header.pack_id,
        frame_id = header.frame_id,
        frame_sz = header.frame_sz,
        "encoded frame"
    );
    Ok(needed)
}

/// Encode into a freshly allocated buffer
///
/// # Errors
///
/// As [`encode_frame`].
pub fn encode_frame_vec(meta: &FrameMeta, frame_id: u32, payload: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![0; encoded_len(payload.len())];
    encode_frame(meta, frame_id, payload, &mut out)?;
    Ok(out)
}

/// Outcome of the payload CRC check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    /// CRC copies agree and match the payload
    Valid,
    /// CRC copies agree but do not match the payload
    Mismatch {
        /// CRC carried in the header
        stored: u16,
        /// CRC computed over the received payload
        computed: u16,
    },
    /// CRC copies disagree, so the CRC cannot be trusted
    Unverifiable {
        /// First CRC copy
        crc: u16,
        /// Second CRC copy
        crc2: u16,
    },
}

impl CrcStatus {
    /// Whether the payload is verified intact
    #[must_use]
    pub fn is_valid(self) -> bool {
        self == CrcStatus::Valid
    }
}

/// Decoded view of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    /// Frame header
    pub header: FrameHeader,
    /// Payload bytes (`header.frame_sz` long)
    pub payload: &'a [u8],
    /// Payload CRC check outcome
    pub crc: CrcStatus,
}

/// Decode the frame at the start of `buf` and check its CRC
///
/// # Errors
///
/// Returns `FrameError::TooShort` if `buf` cannot hold the header or the announced payload.
pub fn decode_frame(buf: &[u8]) -> Result<DecodedFrame<'_>> {
    let header = FrameHeader::decode(buf)?;
    let payload_end = FRAME_HEADER_SIZE + header.frame_sz as usize;
    if buf.len() < payload_end {
        return Err(FrameError::TooShort {
            expected: payload_end,
            actual: buf.len(),
        });
    }
    let payload = &buf[FRAME_HEADER_SIZE..payload_end];

    Ok(DecodedFrame {
        header,
        payload,
        crc: check_crc(&header, payload),
    })
}

/// Check `payload` against the CRC carried in `header`
#[must_use]
pub fn check_crc(header: &FrameHeader, payload: &[u8]) -> CrcStatus {
    if !header.crc_consistent() {
        return CrcStatus::Unverifiable {
            crc: header.frame_crc,
            crc2: header.frame_crc2,
        };
    }
    let computed = crc16(payload);
    if computed == header.frame_crc {
        CrcStatus::Valid
    } else {
        CrcStatus::Mismatch {
            stored: header.frame_crc,
            computed,
        }
    }
}
