//! Error types for the TX framer and RX reassembler

use std::io;

use sdrmodem_frame::{FrameError, HeaderError};
use sdrmodem_hw::{BusError, DmaError};
use thiserror::Error;

/// Receive code: invalid frame length or malformed first frame
pub const RX_FRAME_INVALID: i32 = -30;
/// Receive code: first frame ident mismatch
pub const RX_INVALID_GUID: i32 = -29;
/// Receive code: packet size zero
pub const RX_PACK_SZ_ZERO: i32 = -28;
/// Receive code: frame count zero
pub const RX_NUM_FRAMES_ZERO: i32 = -27;
/// Receive code: first frame payload size zero
pub const RX_FRAME_SZ_ZERO: i32 = -26;
/// Receive code: interrupt worker could not be started
pub const RX_THREAD_SPAWN: i32 = -25;
/// Receive code: frame offset table exhausted
pub const RX_MALLOC_FAILED: i32 = -23;
/// Receive code: no frame within the deadline (`-ETIMEDOUT`)
pub const RX_TIMEOUT: i32 = -110;
/// Receive code: a receive cycle is still winding down (`-EBUSY`)
pub const RX_BUSY: i32 = -16;
/// Receive code: invalid configuration (`-EINVAL`)
pub const RX_INVALID_CONFIG: i32 = -22;
/// Receive code: hardware access failed (`-EIO`)
pub const RX_IO: i32 = -5;

/// Errors raised by the TX framer
#[derive(Debug, Error)]
pub enum TxError {
    /// MTU outside the supported range
    #[error("Invalid MTU {mtu}: must be within [{min}, {max}]")]
    InvalidMtu {
        /// Requested MTU
        mtu: usize,
        /// Smallest supported MTU
        min: usize,
        /// Largest supported MTU
        max: usize,
    },

    /// Packet cannot be staged in the DMA buffer at the current MTU
    #[error("Packet of {size} bytes too large: at most {max} bytes fit at MTU {mtu}")]
    PacketTooLarge {
        /// Requested packet size
        size: usize,
        /// Largest packet that fits
        max: usize,
        /// MTU in effect
        mtu: usize,
    },

    /// Invalid framer configuration
    #[error("Invalid TX configuration: {0}")]
    InvalidConfig(String),

    /// DMA transfer failed
    #[error("DMA error: {0}")]
    Dma(#[from] DmaError),

    /// Modem register access failed
    #[error("Register bus error: {0}")]
    Bus(#[from] BusError),

    /// Frame encoding failed
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Errors raised by the RX reassembler
#[derive(Debug, Error)]
pub enum RxError {
    /// RX core reported an invalid frame length, or the first frame is malformed
    #[error("Invalid frame: {0}")]
    FrameInvalid(String),

    /// First frame does not carry the frame ident
    #[error("Invalid frame ident {found:#010x}")]
    InvalidGuid {
        /// Ident found in the first frame
        found: u32,
    },

    /// First frame announces a zero-byte packet
    #[error("Packet size is zero")]
    PackSzZero,

    /// First frame announces zero frames
    #[error("Frame count is zero")]
    NumFramesZero,

    /// First frame carries no payload
    #[error("First frame payload size is zero")]
    FrameSzZero,

    /// Interrupt worker thread could not be spawned
    #[error("Failed to spawn RX interrupt worker: {0}")]
    ThreadSpawn(io::Error),

    /// More frames arrived than the offset table can hold
    #[error("Frame offset table full ({capacity} frames)")]
    TableFull {
        /// Table capacity
        capacity: usize,
    },

    /// No frame arrived before the deadline
    #[error("Timed out waiting for the first frame")]
    Timeout,

    /// Packet stopped arriving part way; received frames remain readable
    #[error("Packet incomplete: received {received} of {expected} frames")]
    Incomplete {
        /// Frames received
        received: usize,
        /// Frames announced by the first frame
        expected: usize,
    },

    /// Previous receive cycle's worker has not exited yet
    #[error("Previous receive cycle still active")]
    Busy,

    /// Invalid receive configuration
    #[error("Invalid RX configuration: {0}")]
    InvalidConfig(String),

    /// DMA transfer failed
    #[error("DMA error: {0}")]
    Dma(#[from] DmaError),

    /// Modem register access failed
    #[error("Register bus error: {0}")]
    Bus(#[from] BusError),
}

impl RxError {
    /// Negative receive code of this error
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            RxError::FrameInvalid(_) => RX_FRAME_INVALID,
            RxError::InvalidGuid { .. } => RX_INVALID_GUID,
            RxError::PackSzZero => RX_PACK_SZ_ZERO,
            RxError::NumFramesZero => RX_NUM_FRAMES_ZERO,
            RxError::FrameSzZero => RX_FRAME_SZ_ZERO,
            RxError::ThreadSpawn(_) => RX_THREAD_SPAWN,
            RxError::TableFull { .. } => RX_MALLOC_FAILED,
            RxError::Timeout | RxError::Incomplete { .. } => RX_TIMEOUT,
            RxError::Busy => RX_BUSY,
            RxError::InvalidConfig(_) => RX_INVALID_CONFIG,
            RxError::Dma(_) | RxError::Bus(_) => RX_IO,
        }
    }

    /// Whether the error is a timeout, the expected outcome on a lossy link
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.code() == RX_TIMEOUT
    }
}

impl From<HeaderError> for RxError {
    fn from(err: HeaderError) -> Self {
        match err {
            HeaderError::InvalidIdent { found } => RxError::InvalidGuid { found },
            HeaderError::PackSzZero => RxError::PackSzZero,
            HeaderError::NumFramesZero => RxError::NumFramesZero,
            HeaderError::FrameSzZero => RxError::FrameSzZero,
            HeaderError::FrameSzTooLarge { .. } | HeaderError::MtuZero => {
                RxError::FrameInvalid(err.to_string())
            }
        }
    }
}

/// Result type for TX operations
pub type TxResult<T> = std::result::Result<T, TxError>;

/// Result type for RX operations
pub type RxResult<T> = std::result::Result<T, RxError>;
