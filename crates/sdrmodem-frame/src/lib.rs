//! Frame codec for the sdrmodem radio transport.
//!
//! Application packets travel over the radio as a sequence of hardware
//! frames. Each frame is a fixed header, up to one MTU of payload padded to
//! an 8-byte boundary, and a reserved pad:
//!
//! ```text
//! +-----------------+----------------------+-----------------+
//! | header (32)     | payload (frame_sz)   | pad to 8 | 16   |
//! +-----------------+----------------------+-----------------+
//! ```
//!
//! This crate is pure data layout: header encoding, the payload CRC, and the
//! fragmentation arithmetic shared by the TX framer and the RX reassembler.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod crc;
pub mod error;
pub mod header;
pub mod layout;

pub use codec::{
    CrcStatus, DecodedFrame, FrameMeta, check_crc, decode_frame, encode_frame, encode_frame_vec,
    encode_with_header,
};
pub use crc::crc16;
pub use error::{FrameError, HeaderError, Result};
pub use header::FrameHeader;
pub use layout::{
    Fragment, PacketLayout, encoded_len, frame_footprint, normalize_mtu, tx_frame_footprint,
};

/// Ident carried by every valid frame header
pub const FRAME_IDENT: u32 = 0x5AFE_C0DE;

/// Frame header size in bytes
pub const FRAME_HEADER_SIZE: usize = 32;

/// Size of the length word preceding each TX frame in the DMA buffer
pub const LENGTH_WORD_SIZE: usize = 8;

/// Payload padding boundary
pub const PAYLOAD_ALIGN: usize = 8;

/// Reserved pad following each frame's padded payload
pub const RESERVED_PAD: usize = 16;

/// MTUs are rounded down to a multiple of this
pub const MTU_ALIGN: usize = 4;

/// Largest TX record the IP cores accept, length word included
pub const MAX_HW_FRAME: usize = 8192;

/// Default frame size, header and reserved pad included
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Smallest configurable MTU
pub const MIN_MTU: usize = 64;

/// Largest configurable MTU
pub const MAX_MTU: usize = MAX_HW_FRAME - LENGTH_WORD_SIZE - FRAME_HEADER_SIZE - RESERVED_PAD;

/// MTU used when none or an out-of-range one is configured
pub const DEFAULT_MTU: usize = DEFAULT_FRAME_SIZE - FRAME_HEADER_SIZE - RESERVED_PAD;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mtu_constants() {
        assert_eq!(MAX_MTU, 8136);
        assert_eq!(DEFAULT_MTU, 4048);
        assert_eq!(MAX_MTU % PAYLOAD_ALIGN, 0);
        assert!(MIN_MTU < DEFAULT_MTU && DEFAULT_MTU < MAX_MTU);
    }
}
