//! DMA transfer engine.
//!
//! Drives an AXI DMA controller to move bytes between the engine's DMA buffer
//! and a modem IP core. A transfer is programmed as:
//!
//! 1. controller reset and re-enable, transfer interrupts unmasked
//! 2. transfer id fetched, address/stride/length programmed
//! 3. transfer queued; for non-cyclic transfers the caller blocks until the
//!    start-of-transfer (and, where required, end-of-transfer) interrupt is
//!    observed and the transfer-done bitmap carries the issued id
//!
//! Interrupts only shorten the wait. Every wait window that elapses without an
//! interrupt falls back to the controller status registers, and the overall
//! transfer is bounded by [`DmaConfig::transfer_timeout`].

use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::DmaConfig;
use crate::buffer::{DmaBuffer, PhysMapping};
use crate::bus::RegisterBus;
use crate::error::{DmaError, Result};
use crate::regs::*;
use crate::uio::{UioDevice, UioPaths};

/// Transfer direction relative to the DMA buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Buffer to IP core (`SRC_ADDR`)
    ToDevice,
    /// IP core to buffer (`DEST_ADDR`)
    FromDevice,
}

impl Direction {
    fn addr_reg(self) -> usize {
        match self {
            Direction::ToDevice => DMAC_REG_SRC_ADDR,
            Direction::FromDevice => DMAC_REG_DEST_ADDR,
        }
    }

    fn stride_reg(self) -> usize {
        match self {
            Direction::ToDevice => DMAC_REG_SRC_STRIDE,
            Direction::FromDevice => DMAC_REG_DEST_STRIDE,
        }
    }
}

struct Inner<B> {
    bus: B,
    buffer: DmaBuffer,
}

/// One DMA controller plus its exclusively owned DMA buffer
pub struct DmaEngine<B: RegisterBus> {
    inner: Mutex<Option<Inner<B>>>,
    config: DmaConfig,
}

impl DmaEngine<UioDevice> {
    /// Bind to the DMA controller exported as `/dev/uio{bus_id}`.
    ///
    /// The buffer's physical address and size are read from the device's
    /// `map1` descriptor and the region is mapped through `/dev/mem`.
    ///
    /// # Errors
    ///
    /// - `DmaError::Bus` if the register window cannot be opened
    /// - `DmaError::ResourceUnavailable` if the buffer descriptor cannot be read
    /// - `DmaError::MapFailed` if the buffer cannot be mapped
    pub fn open(bus_id: u32, config: DmaConfig) -> Result<Self> {
        Self::open_with(&UioPaths::default(), bus_id, config)
    }

    /// Bind to a DMA controller by its device tree name
    ///
    /// # Errors
    ///
    /// As [`Self::open`], plus `DmaError::Bus` if no device carries `name`.
    pub fn open_by_name(name: &str, config: DmaConfig) -> Result<Self> {
        let paths = UioPaths::default();
        let id = paths.find_by_name(name)?;
        Self::open_with(&paths, id, config)
    }

    /// Bind using an explicit sysfs/device node layout
    ///
    /// # Errors
    ///
    /// As [`Self::open`].
    pub fn open_with(paths: &UioPaths, bus_id: u32, config: DmaConfig) -> Result<Self> {
        config.validate()?;

        let map = paths.map_info(bus_id, 1).map_err(|e| {
            DmaError::ResourceUnavailable(format!("uio{bus_id} buffer descriptor: {e}"))
        })?;
        let bus = UioDevice::open_with(paths, bus_id)?;
        let region = PhysMapping::open(map.addr, map.size)?;

        debug!(bus_id, phys_addr = map.addr, size = map.size, "opened DMA engine");
        Self::from_parts(bus, DmaBuffer::new(std::sync::Arc::new(region), map.addr), config)
    }
}

impl<B: RegisterBus> DmaEngine<B> {
    /// Assemble an engine from a register bus and a buffer
    ///
    /// # Errors
    ///
    /// Returns `DmaError::InvalidConfig` if `config` fails validation.
    pub fn from_parts(bus: B, buffer: DmaBuffer, config: DmaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Mutex::new(Some(Inner { bus, buffer })),
            config,
        })
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &DmaConfig {
        &self.config
    }

    /// Handle to the engine's DMA buffer
    ///
    /// # Errors
    ///
    /// Returns `DmaError::Closed` after [`Self::close`].
    pub fn buffer(&self) -> Result<DmaBuffer> {
        self.inner
            .lock()
            .as_ref()
            .map(|inner| inner.buffer.clone())
            .ok_or(DmaError::Closed)
    }

    /// DMA buffer size in bytes
    ///
    /// # Errors
    ///
    /// Returns `DmaError::Closed` after [`Self::close`].
    pub fn buffer_size(&self) -> Result<usize> {
        self.buffer().map(|b| b.len())
    }

    /// Whether [`Self::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }

    /// Push `size` bytes at `offset` from the DMA buffer to the IP core.
    ///
    /// With `cyclic` set the controller repeats the transfer until reset and
    /// the call returns as soon as it is queued.
    ///
    /// # Errors
    ///
    /// - `DmaError::SizeError` if the range exceeds the buffer
    /// - `DmaError::Timeout` if the transfer does not complete within the transfer deadline
    /// - `DmaError::Bus` on register access failure
    pub fn write(&self, offset: usize, size: usize, cyclic: bool) -> Result<usize> {
        let guard = self.inner.lock();
        let inner = guard.as_ref().ok_or(DmaError::Closed)?;
        inner.buffer.check(offset, size)?;
        if size == 0 {
            return Ok(0);
        }

        let deadline = Instant::now() + self.config.transfer_timeout;
        let xfer_id = self.start(inner, Direction::ToDevice, offset, size, cyclic)?;
        if cyclic {
            debug!(xfer_id, offset, size, "cyclic DMA write queued");
            return Ok(size);
        }

        let seen = self.await_irq(
            &inner.bus,
            xfer_id,
            DMAC_IRQ_SOT,
            0,
            false,
            deadline,
            "start of transfer",
        )?;
        if self.config.confirm_completion {
            self.await_irq(
                &inner.bus,
                xfer_id,
                DMAC_IRQ_EOT,
                seen,
                false,
                deadline,
                "end of transfer",
            )?;
        }
        self.await_done(&inner.bus, xfer_id, deadline)?;

        trace!(xfer_id, offset, size, "DMA write complete");
        Ok(size)
    }

    /// Pull `size` bytes from the IP core into the DMA buffer at `offset`
    ///
    /// # Errors
    ///
    /// As [`Self::write`].
    pub fn read(&self, offset: usize, size: usize) -> Result<usize> {
        let guard = self.inner.lock();
        let inner = guard.as_ref().ok_or(DmaError::Closed)?;
        inner.buffer.check(offset, size)?;
        if size == 0 {
            return Ok(0);
        }

        let deadline = Instant::now() + self.config.transfer_timeout;
        let xfer_id = self.start(inner, Direction::FromDevice, offset, size, false)?;

        let seen = self.await_irq(
            &inner.bus,
            xfer_id,
            DMAC_IRQ_SOT,
            0,
            false,
            deadline,
            "start of transfer",
        )?;
        self.await_irq(
            &inner.bus,
            xfer_id,
            DMAC_IRQ_EOT,
            seen,
            true,
            deadline,
            "end of transfer",
        )?;
        self.await_done(&inner.bus, xfer_id, deadline)?;

        trace!(xfer_id, offset, size, "DMA read complete");
        Ok(size)
    }

    /// Release the register window and the buffer. Idempotent.
    ///
    /// The buffer mapping is dropped once outstanding [`DmaBuffer`] handles are gone.
    pub fn close(&self) {
        if let Some(inner) = self.inner.lock().take() {
            if let Err(e) = inner.bus.write(DMAC_REG_CTRL, 0) {
                warn!("failed to disable DMA controller on close: {}", e);
            }
            debug!("closed DMA engine");
        }
    }

    /// Reset the controller, program one transfer and queue it. Returns the transfer id.
    fn start(
        &self,
        inner: &Inner<B>,
        direction: Direction,
        offset: usize,
        size: usize,
        cyclic: bool,
    ) -> Result<u32> {
        let bus = &inner.bus;
        let addr = inner.buffer.phys_addr() + offset as u64;
        let addr = u32::try_from(addr).map_err(|_| {
            DmaError::InvalidConfig(format!("buffer address {addr:#x} exceeds 32-bit DMA range"))
        })?;
        let x_len = u32::try_from(size - 1).map_err(|_| DmaError::SizeError {
            offset,
            size,
            buffer_size: inner.buffer.len(),
        })?;

        trace!(?direction, "resetting DMA controller");
        bus.write(DMAC_REG_CTRL, 0)?;
        bus.write(DMAC_REG_CTRL, DMAC_CTRL_ENABLE)?;
        bus.write(DMAC_REG_IRQ_MASK, 0)?;

        let xfer_id = bus.read(DMAC_REG_XFER_ID)?;

        if direction == Direction::FromDevice {
            let pending = bus.read(DMAC_REG_IRQ_PENDING)?;
            bus.write(DMAC_REG_IRQ_PENDING, pending)?;
        }

        bus.write(DMAC_REG_FLAGS, if cyclic { DMAC_FLAGS_CYCLIC } else { 0 })?;
        bus.write(direction.addr_reg(), addr)?;
        bus.write(direction.stride_reg(), 0)?;
        bus.write(DMAC_REG_X_LEN, x_len)?;
        bus.write(DMAC_REG_Y_LEN, 0)?;
        bus.write(DMAC_REG_START_XFER, 1)?;

        trace!(xfer_id, addr, size, ?direction, "DMA transfer queued");
        Ok(xfer_id)
    }

    fn is_done(bus: &B, xfer_id: u32) -> Result<bool> {
        Ok(bus.read(DMAC_REG_XFER_DONE)? & xfer_done_bit(xfer_id) != 0)
    }

    /// Wait for interrupt condition `want`.
    ///
    /// `seen` carries pending bits observed by an earlier phase. Returns the
    /// accumulated pending bits. A completed transfer satisfies every phase;
    /// with `done_shortcut` the done bitmap is checked before each wait.
    #[allow(clippy::too_many_arguments)]
    fn await_irq(
        &self,
        bus: &B,
        xfer_id: u32,
        want: u32,
        mut seen: u32,
        done_shortcut: bool,
        deadline: Instant,
        phase: &'static str,
    ) -> Result<u32> {
        let mut attempts = 0u32;

        loop {
            if seen & want != 0 {
                trace!(xfer_id, phase, attempts, "DMA interrupt observed");
                return Ok(seen);
            }
            if done_shortcut && Self::is_done(bus, xfer_id)? {
                trace!(xfer_id, phase, "transfer already done");
                return Ok(seen | DMAC_IRQ_ALL);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DmaError::Timeout { xfer_id, phase });
            }
            let window = self.config.irq_timeout.min(deadline - now);

            let fired = if self.config.poll_only {
                thread::sleep(self.config.poll_interval.min(window));
                false
            } else {
                bus.unmask_irq()?;
                bus.wait_irq(window)?.is_pending()
            };
            attempts += 1;

            let pending = bus.read(DMAC_REG_IRQ_PENDING)?;
            if pending != 0 {
                bus.write(DMAC_REG_IRQ_PENDING, pending)?;
            }
            seen |= pending;

            if seen & want == 0 && !fired {
                if Self::is_done(bus, xfer_id)? {
                    debug!(xfer_id, phase, "interrupt missed; status shows transfer done");
                    return Ok(seen | DMAC_IRQ_ALL);
                }
                trace!(xfer_id, phase, attempts, "DMA interrupt wait elapsed");
            }
        }
    }

    /// Poll the transfer-done bitmap until `xfer_id` is set
    fn await_done(&self, bus: &B, xfer_id: u32, deadline: Instant) -> Result<()> {
        loop {
            if Self::is_done(bus, xfer_id)? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DmaError::Timeout {
                    xfer_id,
                    phase: "transfer done",
                });
            }
            thread::sleep(self.config.poll_interval);
        }
    }
}

impl<B: RegisterBus> Drop for DmaEngine<B> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<B: RegisterBus> std::fmt::Debug for DmaEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaEngine")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}
