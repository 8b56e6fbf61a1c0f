//! Radio frame transport between Linux userspace and the FPGA modem cores.
//!
//! - [`TxModem`] fragments a packet into frames, stages them in the TX DMA
//!   buffer and streams them to the TX core
//! - [`RxModem`] collects frames pulled in by an interrupt-driven worker and
//!   reassembles them into a packet, checking each frame's CRC
//!
//! Both are generic over [`RegisterBus`](sdrmodem_hw::RegisterBus), so the
//! same code drives real UIO devices and the register models in
//! [`sdrmodem_hw::sim`].
//!
//! # Example
//!
//! ```no_run
//! use sdrmodem_core::{RxConfig, RxModem, TxConfig, TxModem};
//!
//! let mut tx = TxModem::open_by_name(TxConfig::default())?;
//! tx.write(b"hello over the air")?;
//!
//! let mut rx = RxModem::open_by_name(RxConfig::default())?;
//! let size = rx.receive()?;
//! let mut packet = vec![0u8; size];
//! let valid = rx.read(&mut packet)?;
//! assert_eq!(valid, size);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod regs;
pub mod rx;
pub mod stats;
pub mod tx;

pub use config::{
    ExtFrCoefficients, FrameStride, RxConfig, RxModemConfig, TxConfig, TxSource,
};
pub use error::{RxError, RxResult, TxError, TxResult};
pub use rx::{FrameSlot, ReadReport, RxModem};
pub use stats::{ModemStats, ModemStatsSnapshot};
pub use tx::TxModem;
