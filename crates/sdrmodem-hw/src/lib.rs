//! Hardware access layer for FPGA-hosted modem IP cores.
//!
//! This crate provides the pieces of the transport that touch hardware:
//!
//! - [`RegisterBus`]: register window plus interrupt line, implemented over
//!   Linux UIO by [`UioDevice`]
//! - [`DmaBuffer`]: bounds-checked access to the physically contiguous DMA buffer
//! - [`DmaEngine`]: AXI DMA controller driver moving bytes between the buffer
//!   and an IP core
//! - [`sim`]: register-level models of the above for tests
//!
//! # Example
//!
//! ```no_run
//! use sdrmodem_hw::{DmaConfig, DmaEngine};
//!
//! let engine = DmaEngine::open_by_name("tx_dma", DmaConfig::default())?;
//! let buffer = engine.buffer()?;
//! buffer.write_at(0, b"payload")?;
//! engine.write(0, 7, false)?;
//! engine.close();
//! # Ok::<(), sdrmodem_hw::DmaError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod bus;
pub mod engine;
pub mod error;
pub mod regs;
pub mod sim;
pub mod uio;

use std::time::Duration;

pub use buffer::{DmaBuffer, DmaRegion, HeapRegion, PhysMapping};
pub use bus::{IrqStatus, RegisterBus};
pub use engine::{Direction, DmaEngine};
pub use error::{BusError, BusResult, DmaError, Result};
pub use uio::{UioDevice, UioInfo, UioMap, UioPaths};

/// Interrupt wait window per attempt
pub const DEFAULT_IRQ_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Upper bound on one transfer, across all interrupt waits
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between status register polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(50);

/// DMA engine configuration
#[derive(Debug, Clone)]
pub struct DmaConfig {
    /// Interrupt wait window per attempt
    pub irq_timeout: Duration,
    /// Upper bound on one non-cyclic transfer
    pub transfer_timeout: Duration,
    /// Wait for end-of-transfer on writes before polling the done bitmap
    pub confirm_completion: bool,
    /// Busy-poll the status registers instead of waiting on the interrupt line
    pub poll_only: bool,
    /// Pause between status register polls
    pub poll_interval: Duration,
}

impl Default for DmaConfig {
    fn default() -> Self {
        Self {
            irq_timeout: DEFAULT_IRQ_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            confirm_completion: true,
            poll_only: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl DmaConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `DmaError::InvalidConfig` if a timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.irq_timeout.is_zero() {
            return Err(DmaError::InvalidConfig(
                "irq_timeout must be non-zero".to_string(),
            ));
        }
        if self.transfer_timeout.is_zero() {
            return Err(DmaError::InvalidConfig(
                "transfer_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
