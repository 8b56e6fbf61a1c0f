//! AXI DMA controller register map.
//!
//! Offsets are relative to the controller's register window (UIO `map0`).

/// Interrupt mask register (1 = masked)
pub const DMAC_REG_IRQ_MASK: usize = 0x080;
/// Interrupt pending register (write 1 to clear)
pub const DMAC_REG_IRQ_PENDING: usize = 0x084;

/// Control register
pub const DMAC_REG_CTRL: usize = 0x400;
/// Id of the next transfer to be queued
pub const DMAC_REG_XFER_ID: usize = 0x404;
/// Write 1 to queue the programmed transfer
pub const DMAC_REG_START_XFER: usize = 0x408;
/// Transfer flags (cyclic, last)
pub const DMAC_REG_FLAGS: usize = 0x40c;
/// Destination address (device to memory)
pub const DMAC_REG_DEST_ADDR: usize = 0x410;
/// Source address (memory to device)
pub const DMAC_REG_SRC_ADDR: usize = 0x414;
/// Transfer length minus one
pub const DMAC_REG_X_LEN: usize = 0x418;
/// Number of rows minus one (2D transfers)
pub const DMAC_REG_Y_LEN: usize = 0x41c;
/// Destination stride (2D transfers)
pub const DMAC_REG_DEST_STRIDE: usize = 0x420;
/// Source stride (2D transfers)
pub const DMAC_REG_SRC_STRIDE: usize = 0x424;
/// Bitmap of completed transfer ids
pub const DMAC_REG_XFER_DONE: usize = 0x428;

/// Controller enable bit in [`DMAC_REG_CTRL`]
pub const DMAC_CTRL_ENABLE: u32 = 1 << 0;

/// Start-of-transfer interrupt
pub const DMAC_IRQ_SOT: u32 = 1 << 0;
/// End-of-transfer interrupt
pub const DMAC_IRQ_EOT: u32 = 1 << 1;
/// Both transfer interrupts
pub const DMAC_IRQ_ALL: u32 = DMAC_IRQ_SOT | DMAC_IRQ_EOT;

/// Cyclic transfer flag in [`DMAC_REG_FLAGS`]
pub const DMAC_FLAGS_CYCLIC: u32 = 1 << 0;

/// Number of transfer ids the controller cycles through
pub const DMAC_XFER_ID_COUNT: u32 = 4;

/// Bit of `xfer_id` in [`DMAC_REG_XFER_DONE`]
#[inline]
#[must_use]
pub const fn xfer_done_bit(xfer_id: u32) -> u32 {
    1 << (xfer_id % DMAC_XFER_ID_COUNT)
}
