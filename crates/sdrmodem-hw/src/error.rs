//! Error types for the hardware access layer

use std::io;
use thiserror::Error;

/// Errors raised by a register bus
#[derive(Debug, Error)]
pub enum BusError {
    /// Register offset outside the mapped register window
    #[error("Register offset {offset:#x} outside {window:#x}-byte register window")]
    OutOfRange {
        /// Offending register offset
        offset: usize,
        /// Size of the mapped register window
        window: usize,
    },

    /// Register offset not aligned to a 32-bit word
    #[error("Register offset {0:#x} is not 4-byte aligned")]
    Misaligned(usize),

    /// Device could not be opened or mapped
    #[error("Device {device} unavailable: {reason}")]
    Unavailable {
        /// Device path or name
        device: String,
        /// Failure description
        reason: String,
    },

    /// No UIO device carries the requested name
    #[error("No UIO device named '{0}'")]
    NotFound(String),

    /// Interrupt mask, unmask or wait failed
    #[error("Interrupt operation failed: {0}")]
    Irq(io::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the DMA transfer engine
#[derive(Debug, Error)]
pub enum DmaError {
    /// Transfer size or offset outside the DMA buffer
    #[error("Transfer of {size} bytes at offset {offset} exceeds {buffer_size}-byte DMA buffer")]
    SizeError {
        /// Requested buffer offset
        offset: usize,
        /// Requested transfer size
        size: usize,
        /// Size of the DMA buffer
        buffer_size: usize,
    },

    /// Platform resource descriptor missing or unreadable
    #[error("DMA resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Mapping the DMA buffer failed
    #[error("Failed to map DMA buffer: {0}")]
    MapFailed(String),

    /// Transfer did not complete before the transfer deadline
    #[error("DMA transfer {xfer_id} timed out waiting for {phase}")]
    Timeout {
        /// Transfer id issued by the controller
        xfer_id: u32,
        /// Transfer phase that was being waited on
        phase: &'static str,
    },

    /// Invalid engine configuration
    #[error("Invalid DMA configuration: {0}")]
    InvalidConfig(String),

    /// Engine used after `close()`
    #[error("DMA engine is closed")]
    Closed,

    /// Register bus failure
    #[error("Register bus error: {0}")]
    Bus(#[from] BusError),
}

/// Result type for register bus operations
pub type BusResult<T> = std::result::Result<T, BusError>;

/// Result type for DMA operations
pub type Result<T> = std::result::Result<T, DmaError>;
