//! Link statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one modem direction
#[derive(Debug, Default)]
pub struct ModemStats {
    /// Packets transmitted
    packets_sent: AtomicU64,
    /// Frames transmitted, end-of-burst markers excluded
    frames_sent: AtomicU64,
    /// Payload bytes transmitted
    bytes_sent: AtomicU64,
    /// Packets fully received
    packets_received: AtomicU64,
    /// Frames moved into the DMA buffer by the RX worker
    frames_received: AtomicU64,
    /// Payload bytes read out with a valid CRC
    bytes_received: AtomicU64,
    /// Frames whose CRC did not match the payload
    crc_failures: AtomicU64,
    /// Frames whose CRC copies disagreed
    crc_unverifiable: AtomicU64,
    /// Receive cycles ending in a timeout
    timeouts: AtomicU64,
    /// Invalid frame lengths or malformed headers
    invalid_frames: AtomicU64,
}

impl ModemStats {
    /// Create new statistics tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one transmitted packet
    pub fn record_tx(&self, frames: u64, bytes: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.frames_sent.fetch_add(frames, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record one frame received by the worker
    pub fn record_rx_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one packet read out
    pub fn record_rx_packet(&self, valid_bytes: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(valid_bytes, Ordering::Relaxed);
    }

    /// Record a CRC mismatch
    pub fn record_crc_failure(&self) {
        self.crc_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame with disagreeing CRC copies
    pub fn record_crc_unverifiable(&self) {
        self.crc_unverifiable.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a receive timeout
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an invalid frame
    pub fn record_invalid_frame(&self) {
        self.invalid_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current statistics
    pub fn snapshot(&self) -> ModemStatsSnapshot {
        ModemStatsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            crc_failures: self.crc_failures.load(Ordering::Relaxed),
            crc_unverifiable: self.crc_unverifiable.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            invalid_frames: self.invalid_frames.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ModemStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModemStatsSnapshot {
    /// Packets transmitted
    pub packets_sent: u64,
    /// Frames transmitted
    pub frames_sent: u64,
    /// Payload bytes transmitted
    pub bytes_sent: u64,
    /// Packets fully received
    pub packets_received: u64,
    /// Frames received
    pub frames_received: u64,
    /// Valid payload bytes received
    pub bytes_received: u64,
    /// CRC mismatches
    pub crc_failures: u64,
    /// Unverifiable CRCs
    pub crc_unverifiable: u64,
    /// Receive timeouts
    pub timeouts: u64,
    /// Invalid frames
    pub invalid_frames: u64,
}

impl ModemStatsSnapshot {
    /// Fraction of received frames that failed the CRC check
    pub fn crc_failure_rate(&self) -> f64 {
        if self.frames_received > 0 {
            self.crc_failures as f64 / self.frames_received as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot() {
        let stats = ModemStats::new();
        stats.record_tx(3, 600);
        stats.record_rx_frame();
        stats.record_rx_frame();
        stats.record_crc_failure();
        stats.record_rx_packet(512);
        stats.record_timeout();

        let snap = stats.snapshot();
        assert_eq!(snap.packets_sent, 1);
        assert_eq!(snap.frames_sent, 3);
        assert_eq!(snap.bytes_sent, 600);
        assert_eq!(snap.frames_received, 2);
        assert_eq!(snap.bytes_received, 512);
        assert_eq!(snap.timeouts, 1);
        assert!((snap.crc_failure_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_rate() {
        assert_eq!(ModemStatsSnapshot::default().crc_failure_rate(), 0.0);
    }
}
