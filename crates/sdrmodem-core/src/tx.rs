//! TX framer.
//!
//! Fragments application packets into MTU-sized frames, stages them in the TX
//! DMA buffer and pushes them to the TX modem core. Each frame is staged as a
//! record the TX core consumes directly:
//!
//! ```text
//! +--------------------+-----------------------------------------------+
//! | length (u64 LE)    | header | payload | pad to 8 | reserved pad     |
//! +--------------------+-----------------------------------------------+
//!                       <------------------ length ------------------->
//! ```
//!
//! Packets of up to [`TxConfig::staged_frame_limit`] frames are staged whole
//! and flushed in one transfer. Longer packets are streamed one frame per
//! transfer with a pause every [`TxConfig::throttle_every`] frames and closed
//! with a zero-length end-of-burst frame.

use std::sync::Arc;
use std::thread;

use sdrmodem_frame::{
    FrameHeader, FrameMeta, LENGTH_WORD_SIZE, PacketLayout, encode_with_header, encoded_len,
    normalize_mtu, tx_frame_footprint,
};
use sdrmodem_hw::{DmaBuffer, DmaEngine, RegisterBus, UioDevice};
use tracing::{debug, info, trace};

use crate::config::{TxConfig, TxSource, validate_mtu};
use crate::error::{TxError, TxResult};
use crate::regs::*;
use crate::stats::{ModemStats, ModemStatsSnapshot};

/// TX modem core plus its DMA engine
pub struct TxModem<M: RegisterBus, D: RegisterBus> {
    modem: M,
    engine: DmaEngine<D>,
    config: TxConfig,
    mtu: usize,
    pack_id: u32,
    stats: Arc<ModemStats>,
}

impl TxModem<UioDevice, UioDevice> {
    /// Open the TX core `/dev/uio{modem_id}` and the TX DMA controller `/dev/uio{dma_id}`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or either device cannot be opened.
    pub fn open(modem_id: u32, dma_id: u32, config: TxConfig) -> TxResult<Self> {
        config.validate()?;
        let modem = UioDevice::open(modem_id)?;
        let engine = DmaEngine::open(dma_id, config.dma.clone())?;
        Self::from_parts(modem, engine, config)
    }

    /// Open the TX core and DMA controller by their device tree names
    ///
    /// # Errors
    ///
    /// As [`Self::open`].
    pub fn open_by_name(config: TxConfig) -> TxResult<Self> {
        config.validate()?;
        let modem = UioDevice::open_by_name(TX_MODEM_NAME)?;
        let engine = DmaEngine::open_by_name(TX_DMA_NAME, config.dma.clone())?;
        Self::from_parts(modem, engine, config)
    }
}

impl<M: RegisterBus, D: RegisterBus> TxModem<M, D> {
    /// Assemble a framer from a modem register bus and a DMA engine
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_parts(modem: M, engine: DmaEngine<D>, config: TxConfig) -> TxResult<Self> {
        config.validate()?;
        let mtu = normalize_mtu(config.mtu);
        debug!(mtu, "TX modem ready");
        Ok(Self {
            modem,
            engine,
            config,
            mtu,
            pack_id: 0,
            stats: Arc::new(ModemStats::new()),
        })
    }

    /// Reset the TX core and select its frame source
    ///
    /// # Errors
    ///
    /// Returns `TxError::Bus` on register access failure.
    pub fn reset(&self, source: TxSource) -> TxResult<()> {
        self.modem.write(TX_REG_RESET, 1)?;
        self.modem.write(TX_REG_SRC_SEL, source.register_value())?;
        debug!(?source, "TX core reset");
        Ok(())
    }

    /// MTU in effect
    #[must_use]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Set the MTU; 0 selects the default. Returns the MTU in effect after alignment.
    ///
    /// # Errors
    ///
    /// Returns `TxError::InvalidMtu` if `mtu` is non-zero and outside the supported range.
    pub fn set_mtu(&mut self, mtu: usize) -> TxResult<usize> {
        validate_mtu(mtu)?;
        self.mtu = normalize_mtu(mtu);
        debug!(requested = mtu, mtu = self.mtu, "TX MTU set");
        Ok(self.mtu)
    }

    /// Largest packet [`Self::write`] accepts at the current MTU
    ///
    /// # Errors
    ///
    /// Returns `TxError::Dma` if the engine is closed.
    pub fn max_packet_size(&self) -> TxResult<usize> {
        let buffer_size = self.engine.buffer_size()?;
        let max_frames = buffer_size.saturating_sub(1) / tx_frame_footprint(self.mtu);
        Ok(max_frames * self.mtu)
    }

    /// Id of the last packet transmitted
    #[must_use]
    pub fn last_pack_id(&self) -> u32 {
        self.pack_id
    }

    /// Statistics snapshot
    #[must_use]
    pub fn stats(&self) -> ModemStatsSnapshot {
        self.stats.snapshot()
    }

    /// Transmit one packet. Blocks until every DMA transfer has completed.
    ///
    /// Returns the number of bytes accepted. An empty packet sends nothing.
    ///
    /// # Errors
    ///
    /// - `TxError::PacketTooLarge` if the packet cannot be staged; nothing is transmitted
    /// - `TxError::Dma` if a transfer fails
    pub fn write(&mut self, buf: &[u8]) -> TxResult<usize> {
        let Some((layout, buffer)) = self.prepare(buf)? else {
            return Ok(0);
        };
        let meta = self.next_packet(&layout);

        if layout.num_frames <= self.config.staged_frame_limit {
            let staged = self.stage_packet(&buffer, &meta, &layout, buf)?;
            self.engine.write(0, staged, false)?;
            debug!(pack_id = meta.pack_id, frames = layout.num_frames, staged, "packet flushed");
        } else {
            self.stream_packet(&buffer, &meta, &layout, buf)?;
        }

        self.stats.record_tx(layout.num_frames as u64, buf.len() as u64);
        info!(
            pack_id = meta.pack_id,
            size = buf.len(),
            frames = layout.num_frames,
            mtu = layout.mtu,
            "packet transmitted"
        );
        Ok(buf.len())
    }

    /// Stage one packet and start a cyclic transfer that repeats it until the next reset
    ///
    /// # Errors
    ///
    /// As [`Self::write`].
    pub fn transmit_cyclic(&mut self, buf: &[u8]) -> TxResult<usize> {
        let Some((layout, buffer)) = self.prepare(buf)? else {
            return Ok(0);
        };
        let meta = self.next_packet(&layout);
        let staged = self.stage_packet(&buffer, &meta, &layout, buf)?;
        self.engine.write(0, staged, true)?;

        info!(
            pack_id = meta.pack_id,
            size = buf.len(),
            frames = layout.num_frames,
            "cyclic transmission started"
        );
        Ok(buf.len())
    }

    /// Make the internal packet generator transmit continuously
    ///
    /// # Errors
    ///
    /// Returns `TxError::Bus` on register access failure.
    pub fn set_tx_always(&self, enabled: bool) -> TxResult<()> {
        self.modem.write(TX_REG_PACKET_TX_ALWAYS, u32::from(enabled))?;
        Ok(())
    }

    /// Emit one packet from the internal packet generator
    ///
    /// # Errors
    ///
    /// Returns `TxError::Bus` on register access failure.
    pub fn pulse_internal_packet(&self) -> TxResult<()> {
        self.modem.write(TX_REG_INTERNAL_PACK_TX_TOGGLE, 1)?;
        self.modem.write(TX_REG_INTERNAL_PACK_TX_TOGGLE, 0)?;
        Ok(())
    }

    /// Release the DMA engine. Idempotent.
    pub fn close(&self) {
        self.engine.close();
    }

    /// Validate a packet against the buffer. `None` for an empty packet.
    fn prepare(&mut self, buf: &[u8]) -> TxResult<Option<(PacketLayout, DmaBuffer)>> {
        self.mtu = normalize_mtu(self.mtu);
        if buf.is_empty() {
            return Ok(None);
        }

        let layout = PacketLayout::new(buf.len(), self.mtu)?;
        let buffer = self.engine.buffer()?;
        let footprint = tx_frame_footprint(layout.mtu);

        if layout.tx_footprint() >= buffer.len() || u32::try_from(buf.len()).is_err() {
            let max = buffer.len().saturating_sub(1) / footprint * layout.mtu;
            return Err(TxError::PacketTooLarge {
                size: buf.len(),
                max,
                mtu: layout.mtu,
            });
        }
        Ok(Some((layout, buffer)))
    }

    fn next_packet(&mut self, layout: &PacketLayout) -> FrameMeta {
        self.pack_id = self.pack_id.wrapping_add(1);
        FrameMeta {
            pack_id: self.pack_id,
            pack_sz: layout.pack_sz as u32,
            num_frames: layout.num_frames as u32,
            mtu: layout.mtu as u32,
        }
    }

    /// Stage every frame back to back from offset 0. Returns the staged byte count.
    fn stage_packet(
        &self,
        buffer: &DmaBuffer,
        meta: &FrameMeta,
        layout: &PacketLayout,
        buf: &[u8],
    ) -> TxResult<usize> {
        let mut offset = 0;
        for fragment in layout.fragments() {
            let payload = &buf[fragment.offset..fragment.offset + fragment.len];
            let header = meta.header(fragment.frame_id, payload);
            offset += stage_record(buffer, offset, &header, payload)?;
        }
        Ok(offset)
    }

    fn stream_packet(
        &self,
        buffer: &DmaBuffer,
        meta: &FrameMeta,
        layout: &PacketLayout,
        buf: &[u8],
    ) -> TxResult<()> {
        debug!(pack_id = meta.pack_id, frames = layout.num_frames, "streaming packet");

        for fragment in layout.fragments() {
            let payload = &buf[fragment.offset..fragment.offset + fragment.len];
            let header = meta.header(fragment.frame_id, payload);
            let staged = stage_record(buffer, 0, &header, payload)?;
            self.engine.write(0, staged, false)?;

            let sent = fragment.frame_id as usize + 1;
            if sent % self.config.throttle_every == 0 && sent < layout.num_frames {
                trace!(sent, "throttling");
                thread::sleep(self.config.throttle_pause);
            }
        }

        let staged = stage_record(buffer, 0, &meta.end_of_burst(), &[])?;
        self.engine.write(0, staged, false)?;
        trace!(pack_id = meta.pack_id, "end of burst sent");
        Ok(())
    }
}

impl<M: RegisterBus, D: RegisterBus> std::fmt::Debug for TxModem<M, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxModem")
            .field("mtu", &self.mtu)
            .field("pack_id", &self.pack_id)
            .field("engine", &self.engine)
            .finish()
    }
}

/// Write one length-prefixed frame record at `offset`. Returns the record size.
fn stage_record(
    buffer: &DmaBuffer,
    offset: usize,
    header: &FrameHeader,
    payload: &[u8],
) -> TxResult<usize> {
    let frame_len = encoded_len(payload.len());
    let mut record = vec![0u8; LENGTH_WORD_SIZE + frame_len];
    record[..LENGTH_WORD_SIZE].copy_from_slice(&(frame_len as u64).to_le_bytes());
    encode_with_header(header, payload, &mut record[LENGTH_WORD_SIZE..])?;
    buffer.write_at(offset, &record)?;
    Ok(record.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdrmodem_frame::{DEFAULT_MTU, FRAME_HEADER_SIZE, decode_frame};
    use sdrmodem_hw::DmaConfig;
    use sdrmodem_hw::sim::{SimDmac, SimLink, SimModem};
    use std::time::Duration;

    type SimTx = TxModem<Arc<SimModem>, Arc<SimDmac>>;

    fn tx(
        buffer_size: usize,
        config: TxConfig,
    ) -> (SimTx, Arc<SimLink>, Arc<SimModem>, Arc<SimDmac>) {
        let link = SimLink::new();
        let modem = Arc::new(SimModem::new(link.clone(), RX_REG_PAYLOAD_LEN, RX_REG_RX_ENABLE));
        let buffer = DmaBuffer::heap(buffer_size, 0x0e00_0000);
        let dmac = Arc::new(SimDmac::new(buffer.clone(), link.clone()));
        let dma = DmaConfig {
            irq_timeout: Duration::from_millis(20),
            transfer_timeout: Duration::from_millis(500),
            ..config.dma.clone()
        };
        let engine = DmaEngine::from_parts(dmac.clone(), buffer, dma).unwrap();
        let tx = TxModem::from_parts(modem.clone(), engine, config).unwrap();
        (tx, link, modem, dmac)
    }

    fn records(burst: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos + 8 <= burst.len() {
            let len = u64::from_le_bytes(burst[pos..pos + 8].try_into().unwrap()) as usize;
            if len == 0 {
                break;
            }
            out.push(burst[pos + 8..pos + 8 + len].to_vec());
            pos += 8 + len;
        }
        out
    }

    #[test]
    fn test_default_mtu() {
        let (mut tx, ..) = tx(1 << 16, TxConfig::default());
        assert_eq!(tx.mtu(), DEFAULT_MTU);
        assert_eq!(tx.set_mtu(259).unwrap(), 256);
        assert_eq!(tx.set_mtu(0).unwrap(), DEFAULT_MTU);
        assert!(matches!(tx.set_mtu(10), Err(TxError::InvalidMtu { .. })));
    }

    #[test]
    fn test_staged_packet_single_transfer() {
        let (mut tx, link, _modem, dmac) = tx(1 << 16, TxConfig::default());
        tx.set_mtu(256).unwrap();
        let data: Vec<u8> = (0..600).map(|i| i as u8).collect();

        assert_eq!(tx.write(&data).unwrap(), 600);
        assert_eq!(dmac.transfers(), 1);

        let bursts = link.take_bursts();
        let frames = records(&bursts[0]);
        assert_eq!(frames.len(), 3);

        let sizes: Vec<_> = frames
            .iter()
            .map(|f| decode_frame(f).unwrap().header.frame_sz)
            .collect();
        assert_eq!(sizes, [256, 256, 88]);

        let last = decode_frame(&frames[2]).unwrap();
        assert_eq!(last.header.pack_id, 1);
        assert_eq!(last.header.pack_sz, 600);
        assert_eq!(last.header.num_frames, 3);
        assert_eq!(last.payload, &data[512..]);
        assert!(last.crc.is_valid());
        assert_eq!(frames[2].len(), FRAME_HEADER_SIZE + 88 + 16);
    }

    #[test]
    fn test_streamed_packet_ends_with_marker() {
        let config = TxConfig {
            throttle_pause: Duration::from_millis(1),
            ..TxConfig::default()
        };
        let (mut tx, link, _modem, dmac) = tx(1 << 16, config);
        tx.set_mtu(64).unwrap();
        let data = vec![0x42; 64 * 9 + 1];

        tx.write(&data).unwrap();
        assert_eq!(dmac.transfers(), 11);

        let bursts = link.take_bursts();
        let headers: Vec<_> = bursts
            .iter()
            .map(|b| decode_frame(&records(b)[0]).unwrap().header)
            .collect();
        assert_eq!(headers[9].frame_sz, 1);
        assert!(headers[10].is_end_of_burst());
        assert_eq!(headers[10].frame_id, 10);
        assert_eq!(tx.stats().frames_sent, 10);
    }

    #[test]
    fn test_packet_too_large_no_transfer() {
        let (mut tx, _link, _modem, dmac) = tx(4096, TxConfig::default());
        tx.set_mtu(256).unwrap();
        let footprint = tx_frame_footprint(256);
        let max_frames = 4095 / footprint;

        let err = tx.write(&vec![0; 256 * (max_frames + 1)]).unwrap_err();
        assert!(matches!(err, TxError::PacketTooLarge { max, .. } if max == max_frames * 256));
        assert_eq!(dmac.transfers(), 0);
        assert_eq!(tx.last_pack_id(), 0);

        assert_eq!(tx.max_packet_size().unwrap(), max_frames * 256);
        assert!(tx.write(&vec![0; max_frames * 256]).is_ok());
    }

    #[test]
    fn test_exact_fit_rejected() {
        // One frame of 64 bytes needs 8 + 32 + 64 + 16 = 120 bytes
        let (mut tx, _link, _modem, dmac) = tx(120, TxConfig::default());
        tx.set_mtu(64).unwrap();
        assert!(matches!(tx.write(&[1; 64]), Err(TxError::PacketTooLarge { .. })));
        assert_eq!(dmac.transfers(), 0);
    }

    #[test]
    fn test_pack_id_per_packet() {
        let (mut tx, link, ..) = tx(1 << 16, TxConfig::default());
        tx.set_mtu(64).unwrap();
        tx.write(&[1; 100]).unwrap();
        tx.write(&[2; 10]).unwrap();
        assert_eq!(tx.last_pack_id(), 2);

        let bursts = link.take_bursts();
        let ids: Vec<_> = records(&bursts[0])
            .iter()
            .map(|f| decode_frame(f).unwrap().header.pack_id)
            .collect();
        assert_eq!(ids, [1, 1]);
    }

    #[test]
    fn test_empty_write_sends_nothing() {
        let (mut tx, _link, _modem, dmac) = tx(4096, TxConfig::default());
        assert_eq!(tx.write(&[]).unwrap(), 0);
        assert_eq!(dmac.transfers(), 0);
    }

    #[test]
    fn test_reset_and_generator_registers() {
        let (tx, _link, modem, _dmac) = tx(4096, TxConfig::default());
        tx.reset(TxSource::InternalGenerator).unwrap();
        tx.set_tx_always(true).unwrap();
        tx.pulse_internal_packet().unwrap();

        assert_eq!(
            modem.writes(),
            vec![
                (TX_REG_RESET, 1),
                (TX_REG_SRC_SEL, 1),
                (TX_REG_PACKET_TX_ALWAYS, 1),
                (TX_REG_INTERNAL_PACK_TX_TOGGLE, 1),
                (TX_REG_INTERNAL_PACK_TX_TOGGLE, 0),
            ]
        );
    }

    #[test]
    fn test_cyclic_sets_flag() {
        let (mut tx, link, _modem, dmac) = tx(1 << 16, TxConfig::default());
        assert_eq!(tx.transmit_cyclic(b"beacon").unwrap(), 6);
        assert_eq!(dmac.last_flags(), sdrmodem_hw::regs::DMAC_FLAGS_CYCLIC);
        assert_eq!(records(&link.take_bursts()[0]).len(), 1);
    }

    #[test]
    fn test_closed_engine() {
        let (mut tx, ..) = tx(4096, TxConfig::default());
        tx.close();
        tx.close();
        assert!(matches!(tx.write(b"x"), Err(TxError::Dma(_))));
    }
}
