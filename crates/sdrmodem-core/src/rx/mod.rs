//! RX reassembler.
//!
//! A receive cycle moves through `Idle -> Arming -> Receiving ->
//! {Complete | TimedOut | Failed} -> Idle`:
//!
//! - [`RxModem::receive`] resets the RX core, clears the DMA buffer, arms the
//!   shared state and spawns a detached interrupt worker
//! - the worker publishes each frame's slot as it lands in the buffer
//! - the consumer validates the first frame's header, then waits for the
//!   remaining frames with a fresh deadline per frame
//! - whatever the outcome, the consumer marks the cycle done and the worker
//!   winds down within one interrupt window
//!
//! [`RxModem::read`] then copies the payloads out and checks their CRCs.

mod state;
mod worker;

pub use state::FrameSlot;

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use sdrmodem_frame::{CrcStatus, FRAME_HEADER_SIZE, FrameHeader, decode_frame};
use sdrmodem_hw::{DmaBuffer, DmaEngine, DmaError, RegisterBus, UioDevice};
use tracing::{debug, info, warn};

use crate::config::{RxConfig, RxModemConfig};
use crate::error::{RxError, RxResult};
use crate::regs::*;
use crate::stats::{ModemStats, ModemStatsSnapshot};

use state::{Shared, WaitOutcome};
use worker::{Worker, start_modem, stop_modem};

/// Result of reading a received packet out of the DMA buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadReport {
    /// Payload bytes whose CRC matched
    pub valid_bytes: usize,
    /// Payload bytes copied into the destination
    pub copied_bytes: usize,
    /// Frames read
    pub frames: usize,
    /// Frames whose CRC did not match
    pub crc_failures: usize,
    /// Frames whose CRC copies disagreed
    pub crc_unverifiable: usize,
    /// Frames skipped because they were malformed or did not fit the destination
    pub skipped: usize,
}

/// Packet currently held in the DMA buffer
#[derive(Debug, Clone, Copy)]
struct Pending {
    /// Slot index of the packet's first frame
    first: usize,
    /// Frames announced by the first frame
    expected: usize,
}

/// RX modem core plus its DMA engine
pub struct RxModem<M: RegisterBus + 'static, D: RegisterBus + 'static> {
    modem: Arc<M>,
    engine: Arc<DmaEngine<D>>,
    buffer: DmaBuffer,
    shared: Arc<Shared>,
    stats: Arc<ModemStats>,
    config: RxConfig,
    modem_config: RxModemConfig,
    pending: Option<Pending>,
}

impl RxModem<UioDevice, UioDevice> {
    /// Open the RX core `/dev/uio{modem_id}` and the RX DMA controller `/dev/uio{dma_id}`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or either device cannot be opened.
    pub fn open(modem_id: u32, dma_id: u32, config: RxConfig) -> RxResult<Self> {
        config.validate()?;
        let modem = UioDevice::open(modem_id)?;
        let engine = DmaEngine::open(dma_id, config.dma.clone())?;
        Self::from_parts(modem, engine, config)
    }

    /// Open the RX core and DMA controller by their device tree names
    ///
    /// # Errors
    ///
    /// As [`Self::open`].
    pub fn open_by_name(config: RxConfig) -> RxResult<Self> {
        config.validate()?;
        let modem = UioDevice::open_by_name(RX_MODEM_NAME)?;
        let engine = DmaEngine::open_by_name(RX_DMA_NAME, config.dma.clone())?;
        Self::from_parts(modem, engine, config)
    }
}

impl<M: RegisterBus + 'static, D: RegisterBus + 'static> RxModem<M, D> {
    /// Assemble a reassembler from a modem register bus and a DMA engine.
    ///
    /// The RX interrupt is masked until a receive cycle starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the interrupt cannot be masked.
    pub fn from_parts(modem: M, engine: DmaEngine<D>, config: RxConfig) -> RxResult<Self> {
        config.validate()?;
        let buffer = engine.buffer()?;
        let capacity = buffer.len() / FRAME_HEADER_SIZE + 1;

        modem.mask_irq()?;
        debug!(buffer_size = buffer.len(), capacity, "RX modem ready");

        Ok(Self {
            modem: Arc::new(modem),
            engine: Arc::new(engine),
            buffer,
            shared: Arc::new(Shared::new(capacity)),
            stats: Arc::new(ModemStats::new()),
            config,
            modem_config: RxModemConfig::default(),
            pending: None,
        })
    }

    /// RX core configuration applied by [`Self::receive`]
    #[must_use]
    pub fn modem_config(&self) -> &RxModemConfig {
        &self.modem_config
    }

    /// Replace the RX core configuration applied by [`Self::receive`]
    pub fn set_modem_config(&mut self, config: RxModemConfig) {
        self.modem_config = config;
    }

    /// Statistics snapshot
    #[must_use]
    pub fn stats(&self) -> ModemStatsSnapshot {
        self.stats.snapshot()
    }

    /// Frames received in the current or last cycle
    #[must_use]
    pub fn frames_received(&self) -> usize {
        self.shared.frame_count()
    }

    /// Write `config` to the RX core, holding it in reset meanwhile
    ///
    /// # Errors
    ///
    /// Returns `RxError::Bus` on register access failure.
    pub fn reset(&self, config: &RxModemConfig) -> RxResult<()> {
        let modem = self.modem.as_ref();
        modem.write(RX_REG_RESET, 1)?;
        modem.write(RX_REG_RX_ENABLE, 0)?;
        modem.write(RX_REG_FR_LOOP_BW, config.loop_bw)?;
        modem.write(RX_REG_EQ_MU, config.eq_mu)?;
        modem.write(RX_REG_BYPASS_CODING, u32::from(config.bypass_coding))?;
        modem.write(RX_REG_BYPASS_EQ, u32::from(config.bypass_eq))?;
        modem.write(RX_REG_PD_THRESHOLD, config.pd_threshold)?;
        match config.ext_fr {
            Some(coefficients) => {
                modem.write(RX_REG_EXT_FR_K1, coefficients.k1)?;
                modem.write(RX_REG_EXT_FR_K2, coefficients.k2)?;
                modem.write(RX_REG_EXT_FR_ENABLE, 1)?;
            }
            None => modem.write(RX_REG_EXT_FR_ENABLE, 0)?,
        }
        modem.write(RX_REG_RESET, 0)?;
        debug!(?config, "RX core reset");
        Ok(())
    }

    /// Unmask the RX interrupt and enable decoding
    ///
    /// # Errors
    ///
    /// Returns `RxError::Bus` on register access failure.
    pub fn start(&self) -> RxResult<()> {
        start_modem(self.modem.as_ref())
    }

    /// Mask the RX interrupt and disable decoding
    ///
    /// # Errors
    ///
    /// Returns `RxError::Bus` on register access failure.
    pub fn stop(&self) -> RxResult<()> {
        stop_modem(self.modem.as_ref())
    }

    /// Receive one packet. Returns its size as announced by the first frame.
    ///
    /// Blocks until every frame has arrived or a deadline passes. The payload
    /// is then available through [`Self::read`].
    ///
    /// # Errors
    ///
    /// - `RxError::Timeout` if no frame arrives before the first-frame deadline
    /// - `RxError::Incomplete` if frames stop arriving part way; the received frames stay readable
    /// - `RxError::InvalidGuid`, `PackSzZero`, `NumFramesZero`, `FrameSzZero`,
    ///   `FrameInvalid` if the first frame is malformed
    /// - `RxError::Busy` if the previous cycle's worker does not exit in time
    /// - `RxError::ThreadSpawn` if the worker cannot be started
    pub fn receive(&mut self) -> RxResult<usize> {
        self.pending = None;
        if self.engine.is_closed() {
            return Err(DmaError::Closed.into());
        }

        let exit_deadline =
            Instant::now() + self.config.irq_window + self.config.dma.transfer_timeout;
        if !self.shared.wait_worker_exit(exit_deadline) {
            return Err(RxError::Busy);
        }

        self.reset(&self.modem_config)?;
        self.buffer.zero_all();
        self.shared.arm()?;

        let worker = Worker {
            modem: self.modem.clone(),
            engine: self.engine.clone(),
            shared: self.shared.clone(),
            stats: self.stats.clone(),
            config: self.config.clone(),
        };
        if let Err(e) = thread::Builder::new()
            .name("rx-irq".to_string())
            .spawn(move || worker.run())
        {
            self.shared.disarm();
            return Err(RxError::ThreadSpawn(e));
        }

        let result = self.collect();
        self.shared.finish();

        match &result {
            Ok(pack_sz) => info!(
                pack_sz,
                frames = self.pending.map_or(0, |p| p.expected),
                "packet received"
            ),
            Err(e) if e.is_timeout() => {
                self.stats.record_timeout();
                debug!("receive timed out: {}", e);
            }
            Err(e) => warn!("receive failed: {}", e),
        }
        result
    }

    /// Wait for and validate the first frame, then wait for the rest
    fn collect(&mut self) -> RxResult<usize> {
        let first_deadline = Instant::now() + self.config.first_frame_timeout;
        let mut first = 0usize;

        let header = loop {
            match self.shared.wait_frames(first + 1, first_deadline) {
                WaitOutcome::Ready(_) => {}
                WaitOutcome::Fault(e) => return Err(e),
                WaitOutcome::TimedOut(_) | WaitOutcome::WorkerExited(_) => {
                    return Err(RxError::Timeout);
                }
            }

            let header = self
                .frame_header(first)
                .inspect_err(|_| self.stats.record_invalid_frame())?;
            if header.is_end_of_burst() {
                debug!(pack_id = header.pack_id, "skipping stale end-of-burst frame");
                first += 1;
                continue;
            }
            break header;
        };

        if let Err(e) = header.validate_first(self.config.max_frame_sz) {
            self.stats.record_invalid_frame();
            return Err(e.into());
        }

        let expected = header.num_frames as usize;
        self.pending = Some(Pending { first, expected });
        let target = first + expected;
        debug!(pack_id = header.pack_id, pack_sz = header.pack_sz, expected, "first frame valid");

        loop {
            let received = self.shared.frame_count();
            if received >= target {
                return Ok(header.pack_sz as usize);
            }

            let deadline = Instant::now() + self.config.frame_timeout;
            match self.shared.wait_frames(received + 1, deadline) {
                WaitOutcome::Ready(_) => {}
                WaitOutcome::Fault(e) => {
                    warn!("RX worker failed mid-packet: {}", e);
                    return Err(self.incomplete(first, expected));
                }
                WaitOutcome::TimedOut(_) | WaitOutcome::WorkerExited(_) => {
                    return Err(self.incomplete(first, expected));
                }
            }
        }
    }

    fn incomplete(&self, first: usize, expected: usize) -> RxError {
        RxError::Incomplete {
            received: self.shared.frame_count().saturating_sub(first).min(expected),
            expected,
        }
    }

    /// Decode the header of visible frame `index`
    fn frame_header(&self, index: usize) -> RxResult<FrameHeader> {
        let slot = self
            .shared
            .slot(index)
            .ok_or_else(|| RxError::FrameInvalid(format!("frame {index} not recorded")))?;
        if slot.len < FRAME_HEADER_SIZE {
            return Err(RxError::FrameInvalid(format!(
                "frame of {} bytes shorter than its header",
                slot.len
            )));
        }
        let bytes = self.buffer.read_vec(slot.offset, FRAME_HEADER_SIZE)?;
        FrameHeader::decode(&bytes).map_err(|e| RxError::FrameInvalid(e.to_string()))
    }

    /// Copy the received packet into `dest`. Returns the number of bytes with a valid CRC.
    ///
    /// Compare against the size returned by [`Self::receive`] to detect corruption.
    ///
    /// # Errors
    ///
    /// Returns `RxError::Dma` if the buffer is no longer available.
    pub fn read(&mut self, dest: &mut [u8]) -> RxResult<usize> {
        self.read_report(dest).map(|report| report.valid_bytes)
    }

    /// As [`Self::read`], with per-frame detail.
    ///
    /// Frames are copied back to back in arrival order. A frame is copied only
    /// if it fits in what remains of `dest`. Frames with a CRC mismatch or an
    /// unverifiable CRC are still copied but do not count as valid. The
    /// packet is discarded afterwards.
    ///
    /// # Errors
    ///
    /// Returns `RxError::Dma` if the buffer is no longer available.
    pub fn read_report(&mut self, dest: &mut [u8]) -> RxResult<ReadReport> {
        let mut report = ReadReport::default();
        let Some(pending) = self.pending.take() else {
            return Ok(report);
        };

        let mut total = 0usize;
        for slot in self.shared.slots(pending.first, pending.first + pending.expected) {
            let bytes = self.buffer.read_vec(slot.offset, slot.len)?;
            let frame = match decode_frame(&bytes) {
                Ok(frame) if frame.header.has_valid_ident() => frame,
                Ok(frame) => {
                    warn!(
                        offset = slot.offset,
                        ident = frame.header.ident,
                        "skipping frame with invalid ident"
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(offset = slot.offset, "skipping malformed frame: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };
            report.frames += 1;

            let len = frame.payload.len();
            if total + len > dest.len() {
                warn!(
                    frame_id = frame.header.frame_id,
                    len,
                    room = dest.len().saturating_sub(total),
                    "frame does not fit destination"
                );
                report.skipped += 1;
                total += len;
                continue;
            }
            dest[total..total + len].copy_from_slice(frame.payload);
            report.copied_bytes += len;
            total += len;

            match frame.crc {
                CrcStatus::Valid => report.valid_bytes += len,
                CrcStatus::Mismatch { stored, computed } => {
                    self.stats.record_crc_failure();
                    report.crc_failures += 1;
                    warn!(frame_id = frame.header.frame_id, stored, computed, "frame CRC mismatch");
                }
                CrcStatus::Unverifiable { crc, crc2 } => {
                    self.stats.record_crc_unverifiable();
                    report.crc_unverifiable += 1;
                    warn!(frame_id = frame.header.frame_id, crc, crc2, "frame CRC unverifiable");
                }
            }
        }

        self.stats.record_rx_packet(report.valid_bytes as u64);
        debug!(?report, "packet read");
        Ok(report)
    }

    /// Stop the worker, the RX core and the DMA engine. Idempotent.
    pub fn close(&mut self) {
        self.pending = None;
        self.shared.finish();
        let deadline = Instant::now() + self.config.irq_window + self.config.dma.transfer_timeout;
        if !self.shared.wait_worker_exit(deadline) {
            warn!("RX worker still running at close");
        }
        if !self.engine.is_closed() {
            if let Err(e) = self.stop() {
                warn!("failed to stop RX core: {}", e);
            }
        }
        self.engine.close();
    }
}

impl<M: RegisterBus + 'static, D: RegisterBus + 'static> Drop for RxModem<M, D> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<M: RegisterBus + 'static, D: RegisterBus + 'static> std::fmt::Debug for RxModem<M, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxModem")
            .field("buffer", &self.buffer)
            .field("frames_received", &self.shared.frame_count())
            .field("worker_running", &self.shared.worker_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtFrCoefficients, FrameStride};
    use sdrmodem_frame::{FrameMeta, encode_frame_vec, encode_with_header, encoded_len};
    use sdrmodem_hw::DmaConfig;
    use sdrmodem_hw::sim::{SimDmac, SimLink, SimModem};
    use std::time::Duration;

    type SimRx = RxModem<Arc<SimModem>, Arc<SimDmac>>;

    fn fast_config() -> RxConfig {
        RxConfig {
            first_frame_timeout: Duration::from_millis(400),
            frame_timeout: Duration::from_millis(200),
            irq_window: Duration::from_millis(10),
            irq_retries: 100,
            dma: DmaConfig {
                irq_timeout: Duration::from_millis(10),
                transfer_timeout: Duration::from_millis(200),
                ..DmaConfig::default()
            },
            ..RxConfig::default()
        }
    }

    fn rx(config: RxConfig) -> (SimRx, Arc<SimLink>, Arc<SimModem>) {
        let link = SimLink::new();
        let modem = Arc::new(SimModem::new(link.clone(), RX_REG_PAYLOAD_LEN, RX_REG_RX_ENABLE));
        let buffer = DmaBuffer::heap(1 << 16, 0x0f00_0000);
        let dmac = Arc::new(SimDmac::new(buffer.clone(), link.clone()));
        let engine = DmaEngine::from_parts(dmac, buffer, config.dma.clone()).unwrap();
        (RxModem::from_parts(modem.clone(), engine, config).unwrap(), link, modem)
    }

    fn inject_packet(link: &SimLink, pack_id: u32, data: &[u8], mtu: usize) -> usize {
        let num_frames = data.len().div_ceil(mtu);
        let meta = FrameMeta {
            pack_id,
            pack_sz: data.len() as u32,
            num_frames: num_frames as u32,
            mtu: mtu as u32,
        };
        for (i, chunk) in data.chunks(mtu).enumerate() {
            link.inject(encode_frame_vec(&meta, i as u32, chunk).unwrap());
        }
        num_frames
    }

    #[test]
    fn test_receive_and_read() {
        let (mut rx, link, _modem) = rx(fast_config());
        let data: Vec<u8> = (0..600u32).map(|i| (i * 7) as u8).collect();
        inject_packet(&link, 1, &data, 256);

        assert_eq!(rx.receive().unwrap(), 600);
        assert_eq!(rx.frames_received(), 3);

        let mut out = vec![0u8; 600];
        let report = rx.read_report(&mut out).unwrap();
        assert_eq!(report.valid_bytes, 600);
        assert_eq!(report.frames, 3);
        assert_eq!(out, data);
        assert_eq!(rx.stats().packets_received, 1);
    }

    #[test]
    fn test_plain_stride() {
        let config = RxConfig {
            stride: FrameStride::ReportedLen,
            ..fast_config()
        };
        let (mut rx, link, _modem) = rx(config);
        inject_packet(&link, 4, &[9u8; 300], 128);

        assert_eq!(rx.receive().unwrap(), 300);
        let mut out = vec![0u8; 300];
        assert_eq!(rx.read(&mut out).unwrap(), 300);
        assert_eq!(out, vec![9u8; 300]);
    }

    #[test]
    fn test_invalid_guid() {
        let (mut rx, link, _modem) = rx(fast_config());
        let mut frame = encode_frame_vec(
            &FrameMeta { pack_id: 1, pack_sz: 10, num_frames: 1, mtu: 64 },
            0,
            &[0; 10],
        )
        .unwrap();
        frame[0] = 0;
        link.inject(frame);

        let err = rx.receive().unwrap_err();
        assert!(matches!(err, RxError::InvalidGuid { .. }));
        assert_eq!(err.code(), crate::error::RX_INVALID_GUID);
    }

    #[test]
    fn test_zero_fields() {
        let (mut rx, link, _modem) = rx(fast_config());
        let header = FrameHeader {
            pack_sz: 10,
            num_frames: 0,
            mtu: 64,
            frame_sz: 10,
            ..FrameHeader::new()
        };
        let mut frame = vec![0u8; encoded_len(10)];
        encode_with_header(&header, &[0; 10], &mut frame).unwrap();
        link.inject(frame);
        assert!(matches!(rx.receive(), Err(RxError::NumFramesZero)));

        let header = FrameHeader {
            pack_sz: 10,
            num_frames: 1,
            mtu: 64,
            frame_sz: 0,
            frame_id: 0,
            ..FrameHeader::new()
        };
        let mut frame = vec![0u8; encoded_len(0)];
        encode_with_header(&header, &[], &mut frame).unwrap();
        link.inject(frame);
        assert!(matches!(rx.receive(), Err(RxError::FrameSzZero)));
    }

    #[test]
    fn test_invalid_length_register() {
        let (mut rx, link, _modem) = rx(fast_config());
        link.inject(Vec::new());
        let err = rx.receive().unwrap_err();
        assert_eq!(err.code(), crate::error::RX_FRAME_INVALID);
    }

    #[test]
    fn test_timeout_then_clean_receive() {
        let config = RxConfig {
            irq_retries: 3,
            ..fast_config()
        };
        let (mut rx, link, modem) = rx(config);

        let err = rx.receive().unwrap_err();
        assert!(matches!(err, RxError::Timeout));
        assert_eq!(err.code(), crate::error::RX_TIMEOUT);
        assert_eq!(rx.stats().timeouts, 1);

        inject_packet(&link, 2, b"second attempt", 64);
        assert_eq!(rx.receive().unwrap(), 14);
        let mut out = [0u8; 14];
        assert_eq!(rx.read(&mut out).unwrap(), 14);
        assert_eq!(&out, b"second attempt");

        // worker released the core once the cycle finished
        assert!(rx.shared.wait_worker_exit(Instant::now() + Duration::from_secs(2)));
        assert_eq!(modem.register(RX_REG_RX_ENABLE), 0);
        assert!(!modem.irq_unmasked());
    }

    #[test]
    fn test_incomplete_keeps_frames_readable() {
        let (mut rx, link, _modem) = rx(fast_config());
        let data = vec![5u8; 300];
        let meta = FrameMeta { pack_id: 3, pack_sz: 300, num_frames: 3, mtu: 128 };
        link.inject(encode_frame_vec(&meta, 0, &data[..128]).unwrap());
        link.inject(encode_frame_vec(&meta, 1, &data[128..256]).unwrap());

        let err = rx.receive().unwrap_err();
        assert!(matches!(err, RxError::Incomplete { received: 2, expected: 3 }));
        assert!(err.is_timeout());

        let mut out = vec![0u8; 300];
        assert_eq!(rx.read(&mut out).unwrap(), 256);
    }

    #[test]
    fn test_crc_mismatch_delivered_but_not_valid() {
        let (mut rx, link, _modem) = rx(fast_config());
        let data = vec![0x33u8; 200];
        let meta = FrameMeta { pack_id: 5, pack_sz: 200, num_frames: 2, mtu: 128 };
        link.inject(encode_frame_vec(&meta, 0, &data[..128]).unwrap());
        let mut second = encode_frame_vec(&meta, 1, &data[128..]).unwrap();
        second[FRAME_HEADER_SIZE + 3] ^= 0x10;
        link.inject(second);

        assert_eq!(rx.receive().unwrap(), 200);
        let mut out = vec![0u8; 200];
        let report = rx.read_report(&mut out).unwrap();
        assert_eq!(report.valid_bytes, 128);
        assert_eq!(report.copied_bytes, 200);
        assert_eq!(report.crc_failures, 1);
        assert_eq!(out[128 + 3], 0x33 ^ 0x10);
    }

    #[test]
    fn test_unverifiable_crc() {
        let (mut rx, link, _modem) = rx(fast_config());
        let meta = FrameMeta { pack_id: 6, pack_sz: 16, num_frames: 1, mtu: 64 };
        let mut frame = encode_frame_vec(&meta, 0, &[1; 16]).unwrap();
        frame[30] ^= 0xff;
        link.inject(frame);

        assert_eq!(rx.receive().unwrap(), 16);
        let mut out = [0u8; 16];
        let report = rx.read_report(&mut out).unwrap();
        assert_eq!(report.valid_bytes, 0);
        assert_eq!(report.crc_unverifiable, 1);
        assert_eq!(out, [1; 16]);
    }

    #[test]
    fn test_small_destination() {
        let (mut rx, link, _modem) = rx(fast_config());
        inject_packet(&link, 7, &[2u8; 200], 128);
        assert_eq!(rx.receive().unwrap(), 200);

        let mut out = [0u8; 150];
        let report = rx.read_report(&mut out).unwrap();
        assert_eq!(report.copied_bytes, 128);
        assert_eq!(report.valid_bytes, 128);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_stale_end_of_burst_skipped() {
        let (mut rx, link, _modem) = rx(fast_config());
        let stale = FrameMeta { pack_id: 1, pack_sz: 1000, num_frames: 8, mtu: 128 };
        let mut eob = vec![0u8; encoded_len(0)];
        encode_with_header(&stale.end_of_burst(), &[], &mut eob).unwrap();
        link.inject(eob);
        inject_packet(&link, 2, b"fresh", 64);

        assert_eq!(rx.receive().unwrap(), 5);
        let mut out = [0u8; 5];
        assert_eq!(rx.read(&mut out).unwrap(), 5);
        assert_eq!(&out, b"fresh");
    }

    #[test]
    fn test_reset_writes_configuration() {
        let (mut rx, _link, modem) = rx(fast_config());
        rx.set_modem_config(RxModemConfig {
            loop_bw: 55,
            bypass_eq: true,
            ext_fr: Some(ExtFrCoefficients { k1: 0x100, k2: 0x20 }),
            ..RxModemConfig::default()
        });
        rx.reset(&rx.modem_config().clone()).unwrap();

        let writes = modem.writes();
        assert_eq!(writes.first(), Some(&(RX_REG_RESET, 1)));
        assert_eq!(writes.last(), Some(&(RX_REG_RESET, 0)));
        assert!(writes.contains(&(RX_REG_RX_ENABLE, 0)));
        assert!(writes.contains(&(RX_REG_FR_LOOP_BW, 55)));
        assert!(writes.contains(&(RX_REG_EQ_MU, 200)));
        assert!(writes.contains(&(RX_REG_PD_THRESHOLD, 10)));
        assert!(writes.contains(&(RX_REG_BYPASS_EQ, 1)));
        assert!(writes.contains(&(RX_REG_EXT_FR_K1, 0x100)));
        assert!(writes.contains(&(RX_REG_EXT_FR_ENABLE, 1)));
    }

    #[test]
    fn test_start_stop() {
        let (rx, _link, modem) = rx(fast_config());
        rx.start().unwrap();
        assert_eq!(modem.register(RX_REG_RX_ENABLE), 1);
        assert!(modem.irq_unmasked());
        rx.stop().unwrap();
        assert_eq!(modem.register(RX_REG_RX_ENABLE), 0);
        assert!(!modem.irq_unmasked());
    }

    #[test]
    fn test_close_idempotent() {
        let (mut rx, _link, _modem) = rx(fast_config());
        rx.close();
        rx.close();
        assert!(matches!(rx.receive(), Err(RxError::Dma(DmaError::Closed))));
    }
}
