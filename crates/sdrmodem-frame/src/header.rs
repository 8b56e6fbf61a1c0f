//! Frame header encoding and decoding (32 bytes).
//!
//! Every hardware frame starts with a fixed 32-byte header:
//!
//! ```text
//!  Offset  Size  Field
//!  0       4     Ident (0x5AFEC0DE)
//!  4       4     Packet ID
//!  8       4     Packet Size (bytes)
//!  12      4     Frame ID (zero-based)
//!  16      4     Number of Frames
//!  20      4     MTU
//!  24      4     Frame Size (payload bytes in this frame)
//!  28      2     Frame CRC
//!  30      2     Frame CRC copy
//! ```
//!
//! All fields are little-endian.

use crate::error::{FrameError, HeaderError};
use crate::{FRAME_HEADER_SIZE, FRAME_IDENT};

/// Frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame ident, [`FRAME_IDENT`] for valid frames
    pub ident: u32,
    /// Packet this frame belongs to
    pub pack_id: u32,
    /// Total packet size in bytes
    pub pack_sz: u32,
    /// Zero-based index of this frame within the packet
    pub frame_id: u32,
    /// Number of frames composing the packet
    pub num_frames: u32,
    /// Payload capacity of the packet's frames
    pub mtu: u32,
    /// Payload bytes carried by this frame
    pub frame_sz: u32,
    /// CRC-16 over the payload
    pub frame_crc: u16,
    /// Copy of `frame_crc`
    pub frame_crc2: u16,
}

impl FrameHeader {
    /// Header with the frame ident set and all other fields zero
    #[must_use]
    pub fn new() -> Self {
        Self {
            ident: FRAME_IDENT,
            pack_id: 0,
            pack_sz: 0,
            frame_id: 0,
            num_frames: 0,
            mtu: 0,
            frame_sz: 0,
            frame_crc: 0,
            frame_crc2: 0,
        }
    }

    /// Encode the header into a 32-byte array.
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the header into a pre-allocated buffer.
    ///
    /// # Panics
    ///
    /// Panics if `buf.len() < 32`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.ident.to_le_bytes());
        buf[4..8].copy_from_slice(&self.pack_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.pack_sz.to_le_bytes());
        buf[12..16].copy_from_slice(&self.frame_id.to_le_bytes());
        buf[16..20].copy_from_slice(&self.num_frames.to_le_bytes());
        buf[20..24].copy_from_slice(&self.mtu.to_le_bytes());
        buf[24..28].copy_from_slice(&self.frame_sz.to_le_bytes());
        buf[28..30].copy_from_slice(&self.frame_crc.to_le_bytes());
        buf[30..32].copy_from_slice(&self.frame_crc2.to_le_bytes());
    }

    /// Decode a header from the start of `buf`.
    ///
    /// No field is validated; see [`Self::validate_first`].
    ///
    /// # Errors
    ///
    /// Returns `FrameError::TooShort` if the buffer is smaller than 32 bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: FRAME_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let u32_at = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        let u16_at = |i: usize| u16::from_le_bytes([buf[i], buf[i + 1]]);

        Ok(Self {
            ident: u32_at(0),
            pack_id: u32_at(4),
            pack_sz: u32_at(8),
            frame_id: u32_at(12),
            num_frames: u32_at(16),
            mtu: u32_at(20),
            frame_sz: u32_at(24),
            frame_crc: u16_at(28),
            frame_crc2: u16_at(30),
        })
    }

    /// Whether the ident matches [`FRAME_IDENT`]
    #[must_use]
    pub fn has_valid_ident(&self) -> bool {
        self.ident == FRAME_IDENT
    }

    /// Whether both CRC copies agree, i.e. the CRC can be trusted
    #[must_use]
    pub fn crc_consistent(&self) -> bool {
        self.frame_crc == self.frame_crc2
    }

    /// Whether this is the zero-length marker closing a streamed burst
    #[must_use]
    pub fn is_end_of_burst(&self) -> bool {
        self.has_valid_ident()
            && self.frame_sz == 0
            && self.num_frames != 0
            && self.frame_id == self.num_frames
    }

    /// Validate the header of the first frame of a packet.
    ///
    /// Fields are checked in order: ident, packet size, frame count, frame
    /// size (non-zero and at most `max_frame_sz`), MTU.
    ///
    /// # Errors
    ///
    /// Returns the [`HeaderError`] of the first field that fails.
    pub fn validate_first(&self, max_frame_sz: u32) -> Result<(), HeaderError> {
        if !self.has_valid_ident() {
            return Err(HeaderError::InvalidIdent { found: self.ident });
        }
        if self.pack_sz == 0 {
            return Err(HeaderError::PackSzZero);
        }
        if self.num_frames == 0 {
            return Err(HeaderError::NumFramesZero);
        }
        if self.frame_sz == 0 {
            return Err(HeaderError::FrameSzZero);
        }
        if self.frame_sz > max_frame_sz {
            return Err(HeaderError::FrameSzTooLarge {
                frame_sz: self.frame_sz,
                max: max_frame_sz,
            });
        }
        if self.mtu == 0 {
            return Err(HeaderError::MtuZero);
        }
        Ok(())
    }
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_MTU;

    fn sample() -> FrameHeader {
        FrameHeader {
            pack_id: 7,
            pack_sz: 600,
            frame_id: 2,
            num_frames: 3,
            mtu: 256,
            frame_sz: 88,
            frame_crc: 0xbeef,
            frame_crc2: 0xbeef,
            ..FrameHeader::new()
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample().encode();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..4], &[0xde, 0xc0, 0xfe, 0x5a]);
        assert_eq!(&bytes[8..12], &600u32.to_le_bytes());
        assert_eq!(&bytes[24..28], &88u32.to_le_bytes());
        assert_eq!(&bytes[28..32], &[0xef, 0xbe, 0xef, 0xbe]);
    }

    #[test]
    fn test_header_decode() {
        let header = sample();
        let mut buf = header.encode().to_vec();
        buf.extend_from_slice(&[0xff; 8]);
        assert_eq!(FrameHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_header_too_short() {
        assert_eq!(
            FrameHeader::decode(&[0u8; 31]),
            Err(FrameError::TooShort {
                expected: 32,
                actual: 31
            })
        );
    }

    #[test]
    fn test_validate_first_order() {
        assert!(sample().validate_first(MAX_MTU as u32).is_ok());

        let bad_ident = FrameHeader {
            ident: 0,
            pack_sz: 0,
            ..sample()
        };
        assert_eq!(
            bad_ident.validate_first(MAX_MTU as u32),
            Err(HeaderError::InvalidIdent { found: 0 })
        );

        let cases = [
            (FrameHeader { pack_sz: 0, num_frames: 0, ..sample() }, HeaderError::PackSzZero),
            (FrameHeader { num_frames: 0, frame_sz: 0, ..sample() }, HeaderError::NumFramesZero),
            (FrameHeader { frame_sz: 0, mtu: 0, ..sample() }, HeaderError::FrameSzZero),
            (FrameHeader { mtu: 0, ..sample() }, HeaderError::MtuZero),
            (
                FrameHeader { frame_sz: 9000, ..sample() },
                HeaderError::FrameSzTooLarge { frame_sz: 9000, max: MAX_MTU as u32 },
            ),
        ];
        for (header, expected) in cases {
            assert_eq!(header.validate_first(MAX_MTU as u32), Err(expected));
        }
    }

    #[test]
    fn test_end_of_burst() {
        let eob = FrameHeader {
            frame_id: 3,
            frame_sz: 0,
            ..sample()
        };
        assert!(eob.is_end_of_burst());
        assert!(!sample().is_end_of_burst());
        assert!(!FrameHeader { ident: 1, ..eob }.is_end_of_burst());
    }

    #[test]
    fn test_crc_consistent() {
        assert!(sample().crc_consistent());
        assert!(!FrameHeader { frame_crc2: 0, ..sample() }.crc_consistent());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_inverts_encode(
                pack_id: u32, pack_sz: u32, frame_id: u32, num_frames: u32,
                mtu: u32, frame_sz: u32, crc: u16, crc2: u16,
            ) {
                let header = FrameHeader {
                    ident: FRAME_IDENT,
                    pack_id, pack_sz, frame_id, num_frames, mtu, frame_sz,
                    frame_crc: crc,
                    frame_crc2: crc2,
                };
                prop_assert_eq!(FrameHeader::decode(&header.encode()).unwrap(), header);
            }
        }
    }
}
