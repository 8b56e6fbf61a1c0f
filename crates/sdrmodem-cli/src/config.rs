//! Configuration file for the `sdrmodem` binary.
//!
//! Timeouts are stored in milliseconds and converted to the library
//! configuration types on use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use sdrmodem_core::regs::{RX_DMA_NAME, RX_MODEM_NAME, TX_DMA_NAME, TX_MODEM_NAME};
use sdrmodem_core::{
    ExtFrCoefficients, FrameStride, RxConfig, RxModemConfig, TxConfig,
};
use sdrmodem_frame::{MAX_MTU, MIN_MTU};
use sdrmodem_hw::DmaConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UIO device names
    pub devices: DevicesConfig,
    /// DMA engine settings shared by both directions
    pub dma: DmaSection,
    /// TX framer settings
    pub tx: TxSection,
    /// RX reassembler settings
    pub rx: RxSection,
    /// RX core settings
    pub modem: ModemSection,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Device tree names of the four UIO devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub tx_modem: String,
    pub tx_dma: String,
    pub rx_modem: String,
    pub rx_dma: String,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            tx_modem: TX_MODEM_NAME.to_string(),
            tx_dma: TX_DMA_NAME.to_string(),
            rx_modem: RX_MODEM_NAME.to_string(),
            rx_dma: RX_DMA_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmaSection {
    /// Interrupt wait per attempt (ms)
    pub irq_timeout_ms: u64,
    /// Upper bound on one transfer (ms)
    pub transfer_timeout_ms: u64,
    /// Poll status registers instead of waiting on interrupts
    pub poll_only: bool,
}

impl Default for DmaSection {
    fn default() -> Self {
        let dma = DmaConfig::default();
        Self {
            irq_timeout_ms: dma.irq_timeout.as_millis() as u64,
            transfer_timeout_ms: dma.transfer_timeout.as_millis() as u64,
            poll_only: dma.poll_only,
        }
    }
}

impl DmaSection {
    fn to_dma_config(&self, confirm_completion: bool) -> DmaConfig {
        DmaConfig {
            irq_timeout: Duration::from_millis(self.irq_timeout_ms),
            transfer_timeout: Duration::from_millis(self.transfer_timeout_ms),
            confirm_completion,
            poll_only: self.poll_only,
            ..DmaConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxSection {
    /// Payload bytes per frame; 0 selects the default
    pub mtu: usize,
    /// Packets with more frames than this are streamed
    pub staged_frame_limit: usize,
    /// Frames between pauses while streaming
    pub throttle_every: usize,
    /// Pause length while streaming (ms)
    pub throttle_pause_ms: u64,
    /// Wait for end-of-transfer on each DMA write
    pub confirm_completion: bool,
}

impl Default for TxSection {
    fn default() -> Self {
        let tx = TxConfig::default();
        Self {
            mtu: tx.mtu,
            staged_frame_limit: tx.staged_frame_limit,
            throttle_every: tx.throttle_every,
            throttle_pause_ms: tx.throttle_pause.as_millis() as u64,
            confirm_completion: tx.dma.confirm_completion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxSection {
    pub first_frame_timeout_ms: u64,
    pub frame_timeout_ms: u64,
    pub irq_window_ms: u64,
    pub irq_retries: u32,
    /// `"index"` (length plus frame index plus 4) or `"plain"` (length only)
    pub stride: String,
    pub max_frame_sz: u32,
}

impl Default for RxSection {
    fn default() -> Self {
        let rx = RxConfig::default();
        Self {
            first_frame_timeout_ms: rx.first_frame_timeout.as_millis() as u64,
            frame_timeout_ms: rx.frame_timeout.as_millis() as u64,
            irq_window_ms: rx.irq_window.as_millis() as u64,
            irq_retries: rx.irq_retries,
            stride: "index".to_string(),
            max_frame_sz: rx.max_frame_sz,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemSection {
    pub loop_bw: u32,
    pub eq_mu: u32,
    pub pd_threshold: u32,
    pub bypass_coding: bool,
    pub bypass_eq: bool,
    /// External frequency recovery gains; both must be set to take effect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_fr_k1: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_fr_k2: Option<u32>,
}

impl Default for ModemSection {
    fn default() -> Self {
        let modem = RxModemConfig::default();
        Self {
            loop_bw: modem.loop_bw,
            eq_mu: modem.eq_mu,
            pd_threshold: modem.pd_threshold,
            bypass_coding: modem.bypass_coding,
            bypass_eq: modem.bypass_eq,
            ext_fr_k1: None,
            ext_fr_k2: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when neither `--verbose`, `--debug` nor `RUST_LOG` is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// `~/.config/sdrmodem/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("sdrmodem")
            .join("config.toml")
    }

    /// Load from `path`
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from the default path, or fall back to defaults when it does not exist
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Check values the library configuration would reject
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tx.mtu != 0 && !(MIN_MTU..=MAX_MTU).contains(&self.tx.mtu) {
            anyhow::bail!(
                "tx.mtu {} out of range [{}, {}] (0 selects the default)",
                self.tx.mtu,
                MIN_MTU,
                MAX_MTU
            );
        }
        let any_gain = self.modem.ext_fr_k1.is_some() || self.modem.ext_fr_k2.is_some();
        if self.ext_fr().is_none() && any_gain {
            anyhow::bail!("modem.ext_fr_k1 and modem.ext_fr_k2 must be set together");
        }
        self.stride()?;
        self.tx_config().validate()?;
        self.rx_config()?.validate()?;
        Ok(())
    }

    fn stride(&self) -> anyhow::Result<FrameStride> {
        match self.rx.stride.as_str() {
            "index" => Ok(FrameStride::ReportedLenPlusIndex),
            "plain" => Ok(FrameStride::ReportedLen),
            other => anyhow::bail!("rx.stride must be \"index\" or \"plain\", got {:?}", other),
        }
    }

    fn ext_fr(&self) -> Option<ExtFrCoefficients> {
        match (self.modem.ext_fr_k1, self.modem.ext_fr_k2) {
            (Some(k1), Some(k2)) => Some(ExtFrCoefficients { k1, k2 }),
            _ => None,
        }
    }

    /// TX framer configuration
    pub fn tx_config(&self) -> TxConfig {
        TxConfig {
            mtu: self.tx.mtu,
            staged_frame_limit: self.tx.staged_frame_limit,
            throttle_every: self.tx.throttle_every,
            throttle_pause: Duration::from_millis(self.tx.throttle_pause_ms),
            dma: self.dma.to_dma_config(self.tx.confirm_completion),
        }
    }

    /// RX reassembler configuration
    pub fn rx_config(&self) -> anyhow::Result<RxConfig> {
        Ok(RxConfig {
            first_frame_timeout: Duration::from_millis(self.rx.first_frame_timeout_ms),
            frame_timeout: Duration::from_millis(self.rx.frame_timeout_ms),
            irq_window: Duration::from_millis(self.rx.irq_window_ms),
            irq_retries: self.rx.irq_retries,
            stride: self.stride()?,
            max_frame_sz: self.rx.max_frame_sz,
            dma: self.dma.to_dma_config(true),
        })
    }

    /// RX core configuration
    pub fn modem_config(&self) -> RxModemConfig {
        RxModemConfig {
            loop_bw: self.modem.loop_bw,
            eq_mu: self.modem.eq_mu,
            pd_threshold: self.modem.pd_threshold,
            bypass_coding: self.modem.bypass_coding,
            bypass_eq: self.modem.bypass_eq,
            ext_fr: self.ext_fr(),
        }
    }
}
