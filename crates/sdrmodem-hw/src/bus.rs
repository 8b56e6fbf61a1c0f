//! Register bus capability.
//!
//! Every IP core on the fabric (modem cores and DMA controllers alike) is
//! reached through a window of 32-bit registers plus a single interrupt line.
//! [`RegisterBus`] is the seam between the transport and that hardware: the
//! production implementation is [`crate::uio::UioDevice`], tests use the
//! models in [`crate::sim`].

use std::time::Duration;

use crate::error::BusResult;

/// Outcome of waiting on an interrupt line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqStatus {
    /// Interrupt fired; carries the running interrupt count reported by the device
    Pending(u32),
    /// Wait window elapsed without an interrupt
    None,
}

impl IrqStatus {
    /// Whether an interrupt was observed
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, IrqStatus::Pending(_))
    }
}

/// Memory-mapped register window with one interrupt line.
///
/// Implementations must be shareable across threads: the RX interrupt worker
/// and the consumer touch the same modem core concurrently.
pub trait RegisterBus: Send + Sync {
    /// Read the 32-bit register at `offset` bytes into the window
    fn read(&self, offset: usize) -> BusResult<u32>;

    /// Write the 32-bit register at `offset` bytes into the window
    fn write(&self, offset: usize, value: u32) -> BusResult<()>;

    /// Mask the interrupt line
    fn mask_irq(&self) -> BusResult<()>;

    /// Unmask the interrupt line.
    ///
    /// UIO masks the line again after each delivered interrupt, so this has to
    /// be called before every wait.
    fn unmask_irq(&self) -> BusResult<()>;

    /// Block until the interrupt fires or `timeout` elapses
    fn wait_irq(&self, timeout: Duration) -> BusResult<IrqStatus>;

    /// Size of the register window in bytes
    fn window_size(&self) -> usize;
}

impl<T: RegisterBus + ?Sized> RegisterBus for std::sync::Arc<T> {
    fn read(&self, offset: usize) -> BusResult<u32> {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) -> BusResult<()> {
        (**self).write(offset, value)
    }

    fn mask_irq(&self) -> BusResult<()> {
        (**self).mask_irq()
    }

    fn unmask_irq(&self) -> BusResult<()> {
        (**self).unmask_irq()
    }

    fn wait_irq(&self, timeout: Duration) -> BusResult<IrqStatus> {
        (**self).wait_irq(timeout)
    }

    fn window_size(&self) -> usize {
        (**self).window_size()
    }
}

/// Check that `offset` addresses a whole, aligned register inside a window of `window` bytes
pub(crate) fn check_register(offset: usize, window: usize) -> BusResult<()> {
    use crate::error::BusError;

    if offset % 4 != 0 {
        return Err(BusError::Misaligned(offset));
    }
    if offset.checked_add(4).is_none_or(|end| end > window) {
        return Err(BusError::OutOfRange { offset, window });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;

    #[test]
    fn test_check_register_bounds() {
        assert!(check_register(0, 0x1000).is_ok());
        assert!(check_register(0xffc, 0x1000).is_ok());
        assert!(matches!(
            check_register(0x1000, 0x1000),
            Err(BusError::OutOfRange { offset: 0x1000, .. })
        ));
        assert!(matches!(
            check_register(usize::MAX - 3, 0x1000),
            Err(BusError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_check_register_alignment() {
        assert!(matches!(check_register(0x102, 0x1000), Err(BusError::Misaligned(0x102))));
    }

    #[test]
    fn test_irq_status_pending() {
        assert!(IrqStatus::Pending(3).is_pending());
        assert!(!IrqStatus::None.is_pending());
    }
}
