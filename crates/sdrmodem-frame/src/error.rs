//! Error types for frame encoding and header validation

use thiserror::Error;

/// Errors raised while encoding or decoding a frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer too short to hold the header or the payload it announces
    #[error("Frame too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Payload larger than the frame's MTU
    #[error("Payload of {len} bytes exceeds MTU {mtu}")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Configured MTU
        mtu: usize,
    },

    /// Output buffer cannot hold the encoded frame
    #[error("Output buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Encoded frame size
        needed: usize,
        /// Output buffer size
        available: usize,
    },

    /// MTU of zero or beyond the 32-bit header field
    #[error("Invalid MTU: {0}")]
    InvalidMtu(usize),
}

/// First-frame header validation failures, one per field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// Frame does not start with the frame ident
    #[error("Invalid frame ident {found:#010x}")]
    InvalidIdent {
        /// Ident found in the header
        found: u32,
    },

    /// Packet size is zero
    #[error("Packet size is zero")]
    PackSzZero,

    /// Frame count is zero
    #[error("Frame count is zero")]
    NumFramesZero,

    /// Frame payload size is zero
    #[error("Frame payload size is zero")]
    FrameSzZero,

    /// Frame payload size beyond the largest hardware frame
    #[error("Frame payload size {frame_sz} exceeds maximum {max}")]
    FrameSzTooLarge {
        /// Announced payload size
        frame_sz: u32,
        /// Largest acceptable payload size
        max: u32,
    },

    /// MTU is zero
    #[error("Frame MTU is zero")]
    MtuZero,
}

/// Result type for frame operations
pub type Result<T> = std::result::Result<T, FrameError>;
