//! Simulated hardware.
//!
//! Register-level models of the fabric used by unit and integration tests:
//!
//! - [`SimLink`]: the radio between a TX and an RX modem. TX bursts are
//!   recorded and, in loopback mode, split on the TX IP core's 64-bit length
//!   words into frames queued for the receiver.
//! - [`SimModem`]: a modem IP core. The payload-length register reports the
//!   size of the next queued frame and the interrupt line fires while a frame
//!   is queued, receive is enabled and the line is unmasked.
//! - [`SimDmac`]: an AXI DMA controller. Queuing a transfer copies bytes
//!   between a [`DmaBuffer`] and the link, raises SOT/EOT and sets the
//!   transfer's done bit.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::buffer::DmaBuffer;
use crate::bus::{IrqStatus, RegisterBus, check_register};
use crate::engine::Direction;
use crate::error::{BusError, BusResult};
use crate::regs::*;

/// Register window size of every simulated core
pub const SIM_WINDOW: usize = 0x1000;

type Tamper = Box<dyn FnMut(u64, &mut Vec<u8>) + Send>;

#[derive(Default)]
struct LinkState {
    queue: VecDeque<Vec<u8>>,
    bursts: Vec<Vec<u8>>,
    loopback: bool,
    frames_sent: u64,
    tamper: Option<Tamper>,
}

/// Frame channel between simulated TX and RX cores
#[derive(Default)]
pub struct SimLink {
    state: Mutex<LinkState>,
    arrived: Condvar,
}

impl SimLink {
    /// Link that records TX bursts without delivering them
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Link that delivers every transmitted frame to the receiver
    #[must_use]
    pub fn loopback() -> Arc<Self> {
        let link = Self::new();
        link.set_loopback(true);
        link
    }

    /// Enable or disable TX to RX delivery
    pub fn set_loopback(&self, enabled: bool) {
        self.state.lock().loopback = enabled;
    }

    /// Install a hook applied to every looped-back frame before delivery.
    ///
    /// The hook receives the zero-based index of the frame on the link.
    pub fn set_tamper(&self, tamper: impl FnMut(u64, &mut Vec<u8>) + Send + 'static) {
        self.state.lock().tamper = Some(Box::new(tamper));
    }

    /// Queue a frame for the receiver, as if it arrived over the air
    pub fn inject(&self, frame: Vec<u8>) {
        self.state.lock().queue.push_back(frame);
        self.arrived.notify_all();
    }

    /// Number of frames waiting for the receiver
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Length of the next frame waiting for the receiver
    #[must_use]
    pub fn front_len(&self) -> Option<usize> {
        self.state.lock().queue.front().map(Vec::len)
    }

    /// Remove the next frame waiting for the receiver
    pub fn pop_front(&self) -> Option<Vec<u8>> {
        self.state.lock().queue.pop_front()
    }

    /// Drop every queued frame
    pub fn clear(&self) {
        self.state.lock().queue.clear();
    }

    /// Raw bursts pushed by the TX DMA controller since the last call
    pub fn take_bursts(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().bursts)
    }

    /// Frames delivered by loopback so far
    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.state.lock().frames_sent
    }

    /// Block until a frame is queued or `timeout` elapses
    pub fn wait_frame(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.queue.is_empty() {
            if self.arrived.wait_until(&mut state, deadline).timed_out() {
                return !state.queue.is_empty();
            }
        }
        true
    }

    /// Accept one TX burst: `[len: u64 LE][len bytes]` records until a zero or
    /// truncated length word
    fn transmit(&self, burst: Vec<u8>) {
        let mut state = self.state.lock();
        if state.loopback {
            let mut pos = 0usize;
            while pos + 8 <= burst.len() {
                let mut word = [0u8; 8];
                word.copy_from_slice(&burst[pos..pos + 8]);
                let len = u64::from_le_bytes(word) as usize;
                if len == 0 {
                    break;
                }
                let Some(end) = (pos + 8).checked_add(len).filter(|&end| end <= burst.len()) else {
                    warn!(pos, len, "truncated frame in TX burst");
                    break;
                };

                let mut frame = burst[pos + 8..end].to_vec();
                let index = state.frames_sent;
                if let Some(tamper) = state.tamper.as_mut() {
                    tamper(index, &mut frame);
                }
                state.frames_sent += 1;
                state.queue.push_back(frame);
                pos = end;
            }
            self.arrived.notify_all();
        }
        state.bursts.push(burst);
    }
}

struct ModemState {
    regs: HashMap<usize, u32>,
    writes: Vec<(usize, u32)>,
    unmasked: bool,
    irq_count: u32,
}

/// Modem IP core model
pub struct SimModem {
    state: Mutex<ModemState>,
    link: Arc<SimLink>,
    payload_len_reg: usize,
    rx_enable_reg: usize,
}

impl SimModem {
    /// Core whose payload-length and receive-enable registers live at the given offsets
    #[must_use]
    pub fn new(link: Arc<SimLink>, payload_len_reg: usize, rx_enable_reg: usize) -> Self {
        Self {
            state: Mutex::new(ModemState {
                regs: HashMap::new(),
                writes: Vec::new(),
                unmasked: false,
                irq_count: 0,
            }),
            link,
            payload_len_reg,
            rx_enable_reg,
        }
    }

    /// Last value written to `offset`
    #[must_use]
    pub fn register(&self, offset: usize) -> u32 {
        self.state.lock().regs.get(&offset).copied().unwrap_or(0)
    }

    /// Every register write, in order
    #[must_use]
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.state.lock().writes.clone()
    }

    /// Whether the interrupt line is currently unmasked
    #[must_use]
    pub fn irq_unmasked(&self) -> bool {
        self.state.lock().unmasked
    }
}

impl RegisterBus for SimModem {
    fn read(&self, offset: usize) -> BusResult<u32> {
        check_register(offset, SIM_WINDOW)?;
        if offset == self.payload_len_reg {
            return Ok(self.link.front_len().map_or(0, |len| len as u32));
        }
        Ok(self.register(offset))
    }

    fn write(&self, offset: usize, value: u32) -> BusResult<()> {
        check_register(offset, SIM_WINDOW)?;
        let mut state = self.state.lock();
        state.regs.insert(offset, value);
        state.writes.push((offset, value));
        Ok(())
    }

    fn mask_irq(&self) -> BusResult<()> {
        self.state.lock().unmasked = false;
        Ok(())
    }

    fn unmask_irq(&self) -> BusResult<()> {
        self.state.lock().unmasked = true;
        Ok(())
    }

    fn wait_irq(&self, timeout: Duration) -> BusResult<IrqStatus> {
        let armed = {
            let state = self.state.lock();
            state.unmasked && state.regs.get(&self.rx_enable_reg).copied().unwrap_or(0) != 0
        };
        if !armed {
            thread::sleep(timeout);
            return Ok(IrqStatus::None);
        }
        if !self.link.wait_frame(timeout) {
            return Ok(IrqStatus::None);
        }

        let mut state = self.state.lock();
        // UIO masks the line again after delivery
        state.unmasked = false;
        state.irq_count += 1;
        Ok(IrqStatus::Pending(state.irq_count))
    }

    fn window_size(&self) -> usize {
        SIM_WINDOW
    }
}

#[derive(Default)]
struct DmacState {
    regs: HashMap<usize, u32>,
    direction: Option<Direction>,
    next_id: u32,
    pending: u32,
    done: u32,
    irq_latched: bool,
    irq_count: u32,
    irq_stalled: bool,
    hung: bool,
    transfers: u64,
}

/// AXI DMA controller model
pub struct SimDmac {
    state: Mutex<DmacState>,
    irq: Condvar,
    buffer: DmaBuffer,
    link: Arc<SimLink>,
}

impl SimDmac {
    /// Controller moving bytes between `buffer` and `link`
    #[must_use]
    pub fn new(buffer: DmaBuffer, link: Arc<SimLink>) -> Self {
        Self {
            state: Mutex::new(DmacState::default()),
            irq: Condvar::new(),
            buffer,
            link,
        }
    }

    /// Complete transfers without raising interrupts or pending bits
    pub fn set_irq_stalled(&self, stalled: bool) {
        self.state.lock().irq_stalled = stalled;
    }

    /// Accept transfers but never complete them
    pub fn set_hung(&self, hung: bool) {
        self.state.lock().hung = hung;
    }

    /// Number of transfers queued
    #[must_use]
    pub fn transfers(&self) -> u64 {
        self.state.lock().transfers
    }

    /// Last programmed source address
    #[must_use]
    pub fn last_src_addr(&self) -> u32 {
        self.reg(DMAC_REG_SRC_ADDR)
    }

    /// Last programmed transfer flags
    #[must_use]
    pub fn last_flags(&self) -> u32 {
        self.reg(DMAC_REG_FLAGS)
    }

    fn reg(&self, offset: usize) -> u32 {
        self.state.lock().regs.get(&offset).copied().unwrap_or(0)
    }

    fn run_transfer(&self, state: &mut DmacState) -> BusResult<()> {
        let xfer_id = state.next_id;
        state.next_id = (state.next_id + 1) % DMAC_XFER_ID_COUNT;
        state.done &= !xfer_done_bit(xfer_id);
        state.transfers += 1;

        if state.hung {
            trace!(xfer_id, "sim DMAC hung");
            return Ok(());
        }

        let len = state.regs.get(&DMAC_REG_X_LEN).copied().unwrap_or(0) as usize + 1;
        let direction = state.direction.unwrap_or(Direction::ToDevice);
        let addr = match direction {
            Direction::ToDevice => state.regs.get(&DMAC_REG_SRC_ADDR),
            Direction::FromDevice => state.regs.get(&DMAC_REG_DEST_ADDR),
        }
        .copied()
        .unwrap_or(0) as u64;
        let offset = addr.checked_sub(self.buffer.phys_addr()).ok_or_else(|| {
            BusError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("address {addr:#x} below DMA buffer"),
            ))
        })? as usize;
        let to_bus = |e: crate::error::DmaError| {
            BusError::Io(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
        };

        match direction {
            Direction::ToDevice => {
                let burst = self.buffer.read_vec(offset, len).map_err(to_bus)?;
                self.link.transmit(burst);
            }
            Direction::FromDevice => {
                let frame = self.link.pop_front().unwrap_or_default();
                let n = frame.len().min(len);
                self.buffer.write_at(offset, &frame[..n]).map_err(to_bus)?;
            }
        }

        state.done |= xfer_done_bit(xfer_id);
        if !state.irq_stalled {
            state.pending |= DMAC_IRQ_ALL;
            state.irq_latched = true;
            self.irq.notify_all();
        }
        trace!(xfer_id, ?direction, offset, len, "sim DMAC transfer complete");
        Ok(())
    }
}

impl RegisterBus for SimDmac {
    fn read(&self, offset: usize) -> BusResult<u32> {
        check_register(offset, SIM_WINDOW)?;
        let state = self.state.lock();
        Ok(match offset {
            DMAC_REG_XFER_ID => state.next_id,
            DMAC_REG_IRQ_PENDING => state.pending,
            DMAC_REG_XFER_DONE => state.done,
            _ => state.regs.get(&offset).copied().unwrap_or(0),
        })
    }

    fn write(&self, offset: usize, value: u32) -> BusResult<()> {
        check_register(offset, SIM_WINDOW)?;
        let mut state = self.state.lock();
        match offset {
            DMAC_REG_CTRL => {
                if value & DMAC_CTRL_ENABLE == 0 {
                    state.pending = 0;
                    state.done = 0;
                }
            }
            DMAC_REG_IRQ_PENDING => state.pending &= !value,
            DMAC_REG_SRC_ADDR => state.direction = Some(Direction::ToDevice),
            DMAC_REG_DEST_ADDR => state.direction = Some(Direction::FromDevice),
            _ => {}
        }
        state.regs.insert(offset, value);

        if offset == DMAC_REG_START_XFER && value & 1 != 0 {
            self.run_transfer(&mut state)?;
        }
        Ok(())
    }

    fn mask_irq(&self) -> BusResult<()> {
        Ok(())
    }

    fn unmask_irq(&self) -> BusResult<()> {
        Ok(())
    }

    fn wait_irq(&self, timeout: Duration) -> BusResult<IrqStatus> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.irq_latched {
            if self.irq.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if !state.irq_latched {
            return Ok(IrqStatus::None);
        }
        state.irq_latched = false;
        state.irq_count += 1;
        Ok(IrqStatus::Pending(state.irq_count))
    }

    fn window_size(&self) -> usize {
        SIM_WINDOW
    }
}
