//! Modem IP core register maps.
//!
//! Offsets are relative to each core's register window (UIO `map0`).

/// Device tree name of the TX modem core
pub const TX_MODEM_NAME: &str = "tx_ipcore";
/// Device tree name of the TX DMA controller
pub const TX_DMA_NAME: &str = "tx_dma";
/// Device tree name of the RX modem core
pub const RX_MODEM_NAME: &str = "rx_ipcore";
/// Device tree name of the RX DMA controller
pub const RX_DMA_NAME: &str = "rx_dma";

/// TX core: write 1 to reset the core
pub const TX_REG_RESET: usize = 0x000;
/// TX core: frame source select (see [`crate::TxSource`])
pub const TX_REG_SRC_SEL: usize = 0x124;
/// TX core: transmit the internal test packet continuously
pub const TX_REG_PACKET_TX_ALWAYS: usize = 0x12c;
/// TX core: toggle 1 then 0 to emit one internal test packet
pub const TX_REG_INTERNAL_PACK_TX_TOGGLE: usize = 0x138;

/// RX core: write 1 to hold the core in reset
pub const RX_REG_RESET: usize = 0x000;
/// RX core: frequency recovery loop bandwidth
pub const RX_REG_FR_LOOP_BW: usize = 0x100;
/// RX core: equalizer step size
pub const RX_REG_EQ_MU: usize = 0x104;
/// RX core: packet detector threshold
pub const RX_REG_PD_THRESHOLD: usize = 0x108;
/// RX core: 1 to start decoding, 0 to stop
pub const RX_REG_RX_ENABLE: usize = 0x10c;
/// RX core: bypass channel coding
pub const RX_REG_BYPASS_CODING: usize = 0x110;
/// RX core: bypass the equalizer
pub const RX_REG_BYPASS_EQ: usize = 0x114;
/// RX core: use the external frequency recovery coefficients
pub const RX_REG_EXT_FR_ENABLE: usize = 0x118;
/// RX core: external frequency recovery proportional gain
pub const RX_REG_EXT_FR_K1: usize = 0x11c;
/// RX core: external frequency recovery integral gain
pub const RX_REG_EXT_FR_K2: usize = 0x120;
/// RX core: length in bytes of the frame waiting in the core (read-only)
pub const RX_REG_PAYLOAD_LEN: usize = 0x134;

/// Payload length the RX core reports when its FIFO holds no valid frame
pub const RX_INVALID_PAYLOAD_LEN: u32 = 0x1ffc;
