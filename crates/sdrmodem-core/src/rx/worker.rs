//! RX interrupt worker.
//!
//! One detached thread per receive cycle. Each pass unmasks the RX core's
//! interrupt, waits one window, reads the length of the waiting frame, pulls
//! the frame into the DMA buffer and publishes its slot. The worker stops when
//! the consumer finishes the cycle, on an invalid frame length, on a hardware
//! error, or when the retry budget runs out before the first frame.

use std::sync::Arc;

use sdrmodem_hw::{DmaEngine, IrqStatus, RegisterBus};
use tracing::{debug, trace, warn};

use super::state::{FrameSlot, PublishError, Shared};
use crate::config::RxConfig;
use crate::error::RxError;
use crate::regs::*;
use crate::stats::ModemStats;

/// Everything the worker thread owns
pub(crate) struct Worker<M: RegisterBus, D: RegisterBus> {
    pub(crate) modem: Arc<M>,
    pub(crate) engine: Arc<DmaEngine<D>>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) stats: Arc<ModemStats>,
    pub(crate) config: RxConfig,
}

impl<M: RegisterBus, D: RegisterBus> Worker<M, D> {
    /// Thread body
    pub(crate) fn run(self) {
        let result = self.service();

        if let Err(e) = stop_modem(self.modem.as_ref()) {
            warn!("failed to stop RX core: {}", e);
        }

        let fault = match result {
            Ok(()) => None,
            Err(e) => {
                if e.is_timeout() {
                    debug!("RX worker timed out waiting for the first frame");
                } else {
                    warn!("RX worker stopped: {}", e);
                }
                Some(e)
            }
        };
        self.shared.worker_exited(fault);
        trace!("RX worker exited");
    }

    fn service(&self) -> Result<(), RxError> {
        start_modem(self.modem.as_ref())?;

        let mut offset = 0usize;
        let mut index = 0usize;
        let mut misses = 0u32;

        loop {
            if self.shared.is_done() {
                return Ok(());
            }

            self.modem.unmask_irq()?;
            match self.modem.wait_irq(self.config.irq_window)? {
                IrqStatus::None => {
                    if index == 0 {
                        misses += 1;
                        if misses > self.config.irq_retries {
                            return Err(RxError::Timeout);
                        }
                    }
                    continue;
                }
                IrqStatus::Pending(count) => {
                    trace!(count, "RX interrupt");
                }
            }
            misses = 0;

            if self.shared.is_done() {
                return Ok(());
            }

            let len = self.modem.read(RX_REG_PAYLOAD_LEN)?;
            if len == 0 || len == RX_INVALID_PAYLOAD_LEN {
                self.stats.record_invalid_frame();
                return Err(RxError::FrameInvalid(format!(
                    "RX core reported frame length {len:#x}"
                )));
            }
            let len = len as usize;

            self.engine.read(offset, len)?;
            match self.shared.publish(FrameSlot { offset, len }) {
                Ok(count) => {
                    self.stats.record_rx_frame();
                    debug!(frame = index, offset, len, count, "frame received");
                }
                Err(PublishError::Done) => return Ok(()),
                Err(PublishError::Full(capacity)) => return Err(RxError::TableFull { capacity }),
            }

            offset += self.config.stride.advance(len, index);
            index += 1;
        }
    }
}

/// Unmask the RX interrupt and enable decoding
pub(crate) fn start_modem<M: RegisterBus + ?Sized>(modem: &M) -> Result<(), RxError> {
    modem.unmask_irq()?;
    modem.write(RX_REG_RX_ENABLE, 1)?;
    Ok(())
}

/// Mask the RX interrupt and disable decoding
pub(crate) fn stop_modem<M: RegisterBus + ?Sized>(modem: &M) -> Result<(), RxError> {
    modem.mask_irq()?;
    modem.write(RX_REG_RX_ENABLE, 0)?;
    Ok(())
}
