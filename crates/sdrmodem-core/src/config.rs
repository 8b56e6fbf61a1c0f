//! Framer, reassembler and RX core configuration.

use std::time::Duration;

use sdrmodem_frame::{MAX_MTU, MIN_MTU};
use sdrmodem_hw::DmaConfig;

use crate::error::{RxError, TxError};

/// Source of the frames transmitted by the TX core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxSource {
    /// Frames pushed through DMA
    #[default]
    Dma,
    /// Internal test packet generator
    InternalGenerator,
}

impl TxSource {
    /// Value of the source select register
    #[must_use]
    pub fn register_value(self) -> u32 {
        match self {
            TxSource::Dma => 0,
            TxSource::InternalGenerator => 1,
        }
    }
}

/// TX framer configuration
#[derive(Debug, Clone)]
pub struct TxConfig {
    /// Payload bytes per frame; 0 selects the default MTU
    pub mtu: usize,
    /// Packets of at most this many frames are staged whole and flushed in one transfer
    pub staged_frame_limit: usize,
    /// When streaming, pause after every this many frames
    pub throttle_every: usize,
    /// Streaming pause
    pub throttle_pause: Duration,
    /// DMA engine settings
    pub dma: DmaConfig,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            mtu: 0,
            staged_frame_limit: 4,
            throttle_every: 4,
            throttle_pause: Duration::from_millis(2),
            dma: DmaConfig {
                confirm_completion: false,
                ..DmaConfig::default()
            },
        }
    }
}

impl TxConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `TxError::InvalidMtu` for a non-zero MTU outside the supported
    /// range and `TxError::InvalidConfig` for other invalid settings.
    pub fn validate(&self) -> Result<(), TxError> {
        validate_mtu(self.mtu)?;
        if self.staged_frame_limit == 0 {
            return Err(TxError::InvalidConfig(
                "staged_frame_limit must be at least 1".to_string(),
            ));
        }
        if self.throttle_every == 0 {
            return Err(TxError::InvalidConfig(
                "throttle_every must be at least 1".to_string(),
            ));
        }
        self.dma.validate()?;
        Ok(())
    }
}

/// Check an explicitly requested MTU; zero means "use the default"
pub(crate) fn validate_mtu(mtu: usize) -> Result<(), TxError> {
    if mtu != 0 && !(MIN_MTU..=MAX_MTU).contains(&mtu) {
        return Err(TxError::InvalidMtu {
            mtu,
            min: MIN_MTU,
            max: MAX_MTU,
        });
    }
    Ok(())
}

/// How the RX worker advances its buffer offset after each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStride {
    /// Advance by the reported frame length
    ReportedLen,
    /// Advance by the reported frame length plus the frame index plus 4
    #[default]
    ReportedLenPlusIndex,
}

impl FrameStride {
    /// Offset advance after frame `index` of `len` bytes
    #[must_use]
    pub fn advance(self, len: usize, index: usize) -> usize {
        match self {
            FrameStride::ReportedLen => len,
            FrameStride::ReportedLenPlusIndex => len + index + 4,
        }
    }
}

/// RX reassembler configuration
#[derive(Debug, Clone)]
pub struct RxConfig {
    /// Deadline for the first frame of a packet
    pub first_frame_timeout: Duration,
    /// Deadline for each following frame, counted from the previous one
    pub frame_timeout: Duration,
    /// Interrupt wait window of the worker; bounds how long it takes to notice cancellation
    pub irq_window: Duration,
    /// Consecutive empty interrupt windows tolerated before the first frame
    pub irq_retries: u32,
    /// Offset advance policy
    pub stride: FrameStride,
    /// Largest first-frame payload size accepted
    pub max_frame_sz: u32,
    /// DMA engine settings
    pub dma: DmaConfig,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            first_frame_timeout: Duration::from_secs(60),
            frame_timeout: Duration::from_secs(60),
            irq_window: Duration::from_secs(1),
            irq_retries: 60,
            stride: FrameStride::default(),
            max_frame_sz: MAX_MTU as u32,
            dma: DmaConfig::default(),
        }
    }
}

impl RxConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `RxError::InvalidConfig` if a timeout or the frame size bound is zero.
    pub fn validate(&self) -> Result<(), RxError> {
        if self.first_frame_timeout.is_zero() || self.frame_timeout.is_zero() {
            return Err(RxError::InvalidConfig(
                "frame timeouts must be non-zero".to_string(),
            ));
        }
        if self.irq_window.is_zero() {
            return Err(RxError::InvalidConfig(
                "irq_window must be non-zero".to_string(),
            ));
        }
        if self.max_frame_sz == 0 {
            return Err(RxError::InvalidConfig(
                "max_frame_sz must be non-zero".to_string(),
            ));
        }
        self.dma.validate()?;
        Ok(())
    }
}

/// External frequency recovery loop coefficients, as raw register values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtFrCoefficients {
    /// Proportional gain
    pub k1: u32,
    /// Integral gain
    pub k2: u32,
}

/// RX core configuration written by `reset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxModemConfig {
    /// Frequency recovery loop bandwidth
    pub loop_bw: u32,
    /// Equalizer step size
    pub eq_mu: u32,
    /// Packet detector threshold
    pub pd_threshold: u32,
    /// Bypass channel coding
    pub bypass_coding: bool,
    /// Bypass the equalizer
    pub bypass_eq: bool,
    /// External frequency recovery coefficients; `None` keeps the core's internal loop
    pub ext_fr: Option<ExtFrCoefficients>,
}

impl Default for RxModemConfig {
    fn default() -> Self {
        Self {
            loop_bw: 40,
            eq_mu: 200,
            pd_threshold: 10,
            bypass_coding: false,
            bypass_eq: false,
            ext_fr: None,
        }
    }
}
