//! sdrmodem CLI
//!
//! Send and receive packets over the FPGA radio modem, poke modem registers
//! and inspect the UIO devices backing the transport.

mod config;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use sdrmodem_core::{RxError, RxModem, TxModem, TxSource};
use sdrmodem_hw::uio::{self, UioPaths};
use sdrmodem_hw::{RegisterBus, UioDevice};

/// sdrmodem - radio frame transport for FPGA modem cores
#[derive(Parser)]
#[command(name = "sdrmodem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/sdrmodem/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transmit a file or a message as one packet
    Tx {
        /// File to transmit
        #[arg(conflicts_with = "message", required_unless_present = "message")]
        file: Option<PathBuf>,

        /// Message to transmit instead of a file
        #[arg(short, long)]
        message: Option<String>,

        /// Payload bytes per frame (overrides the configuration)
        #[arg(long)]
        mtu: Option<usize>,

        /// Number of times to send the packet
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Repeat the packet in hardware until the next reset
        #[arg(long, conflicts_with = "count")]
        cyclic: bool,
    },

    /// Receive packets
    Rx {
        /// Write the payload to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of packets to receive
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },

    /// Read or write a modem register
    Reg {
        #[command(subcommand)]
        action: RegAction,
    },

    /// List UIO devices
    Devices,

    /// View or modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum RegAction {
    /// Read a 32-bit register
    Read {
        /// UIO device id or name
        device: String,
        /// Register offset (decimal or 0x-prefixed hex)
        offset: String,
    },

    /// Write a 32-bit register
    Write {
        /// UIO device id or name
        device: String,
        /// Register offset (decimal or 0x-prefixed hex)
        offset: String,
        /// Value (decimal or 0x-prefixed hex)
        value: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Show a single section
        section: Option<String>,
    },

    /// Set a configuration value
    Set {
        /// Configuration key, e.g. `tx.mtu`
        key: String,
        /// New value
        value: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = expand_path(&cli.config);
    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else if config_path == Config::default_path() {
        Config::load_or_default()?
    } else {
        Config::load(&config_path)?
    };

    let log_level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = if cli.debug || cli.verbose {
        EnvFilter::new(log_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate()?;

    match cli.command {
        Commands::Tx {
            file,
            message,
            mtu,
            count,
            cyclic,
        } => {
            let payload = match (file, message) {
                (Some(path), _) => std::fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, Some(message)) => message.into_bytes(),
                (None, None) => anyhow::bail!("Nothing to send: give a file or --message"),
            };
            transmit(&payload, mtu, count, cyclic, &config)?;
        }
        Commands::Rx { output, count } => {
            receive(output, count, &config)?;
        }
        Commands::Reg { action } => match action {
            RegAction::Read { device, offset } => {
                let bus = open_device(&device)?;
                let offset = parse_u32(&offset)? as usize;
                let value = bus.read(offset)?;
                println!("{:#06x}: {:#010x} ({})", offset, value, value);
            }
            RegAction::Write {
                device,
                offset,
                value,
            } => {
                let bus = open_device(&device)?;
                let offset = parse_u32(&offset)? as usize;
                let value = parse_u32(&value)?;
                bus.write(offset, value)?;
                println!("{:#06x} <- {:#010x}", offset, value);
            }
        },
        Commands::Devices => {
            list_devices()?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { section } => {
                config_show(section.as_deref(), &config)?;
            }
            ConfigAction::Set { key, value } => {
                config_set(&key, &value, &config_path)?;
            }
        },
    }

    Ok(())
}

/// Expand a leading `~/` to the home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(stripped)
    } else {
        PathBuf::from(path)
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal number
fn parse_u32(s: &str) -> anyhow::Result<u32> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|_| anyhow::anyhow!("Invalid number: {}", s))
}

/// Resolve a UIO device id, accepting either a number or a device tree name
fn resolve_device(device: &str) -> anyhow::Result<u32> {
    if let Ok(id) = device.parse::<u32>() {
        return Ok(id);
    }
    uio::find_by_name(device).with_context(|| format!("No UIO device named {}", device))
}

fn open_device(device: &str) -> anyhow::Result<UioDevice> {
    let id = resolve_device(device)?;
    UioDevice::open(id).with_context(|| format!("Failed to open /dev/uio{}", id))
}

/// Format a byte count for display
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn transmit(
    payload: &[u8],
    mtu: Option<usize>,
    count: u32,
    cyclic: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let mut tx_config = config.tx_config();
    if let Some(mtu) = mtu {
        tx_config.mtu = mtu;
    }

    let modem_id = resolve_device(&config.devices.tx_modem)?;
    let dma_id = resolve_device(&config.devices.tx_dma)?;
    let mut tx = TxModem::open(modem_id, dma_id, tx_config).context("Failed to open TX modem")?;
    tx.reset(TxSource::Dma)?;

    let max = tx.max_packet_size()?;
    debug!(mtu = tx.mtu(), max, "TX modem opened");
    if payload.len() > max {
        anyhow::bail!(
            "Packet of {} too large: at most {} fit at MTU {}",
            format_bytes(payload.len() as u64),
            format_bytes(max as u64),
            tx.mtu()
        );
    }

    if cyclic {
        tx.transmit_cyclic(payload)?;
        println!(
            "Cyclic transmission of {} started (MTU {})",
            format_bytes(payload.len() as u64),
            tx.mtu()
        );
    } else {
        for _ in 0..count {
            tx.write(payload)?;
        }
        let stats = tx.stats();
        println!(
            "Sent {} packet(s), {} frames, {} (MTU {})",
            stats.packets_sent,
            stats.frames_sent,
            format_bytes(stats.bytes_sent),
            tx.mtu()
        );
    }

    tx.close();
    Ok(())
}

fn receive(output: Option<PathBuf>, count: u32, config: &Config) -> anyhow::Result<()> {
    let modem_id = resolve_device(&config.devices.rx_modem)?;
    let dma_id = resolve_device(&config.devices.rx_dma)?;
    let mut rx = RxModem::open(modem_id, dma_id, config.rx_config()?)
        .context("Failed to open RX modem")?;
    rx.set_modem_config(config.modem_config());

    let mut received = Vec::new();
    for n in 0..count {
        let (capacity, incomplete) = match rx.receive() {
            Ok(size) => (size, None),
            Err(RxError::Incomplete { received, expected }) => {
                warn!(received, expected, "packet incomplete, reading received frames");
                (expected * config.rx.max_frame_sz as usize, Some((received, expected)))
            }
            Err(e) => {
                let code = e.code();
                return Err(anyhow::Error::new(e)
                    .context(format!("Receive of packet {} failed (code {})", n + 1, code)));
            }
        };

        let mut packet = vec![0u8; capacity];
        let report = rx.read_report(&mut packet)?;
        packet.truncate(report.copied_bytes);

        match incomplete {
            None => println!(
                "Packet {}: {} valid of {} expected, {} CRC failure(s)",
                n + 1,
                report.valid_bytes,
                capacity,
                report.crc_failures
            ),
            Some((frames, expected)) => println!(
                "Packet {}: incomplete, {} of {} frames, {} valid bytes",
                n + 1,
                frames,
                expected,
                report.valid_bytes
            ),
        }
        received.extend_from_slice(&packet);
    }

    rx.close();

    match output {
        Some(path) => {
            std::fs::write(&path, &received)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {} to {}", format_bytes(received.len() as u64), path.display());
        }
        None => println!("{}", String::from_utf8_lossy(&received)),
    }
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let devices = UioPaths::default()
        .list_devices()
        .context("Failed to scan UIO devices")?;
    if devices.is_empty() {
        println!("No UIO devices found");
        return Ok(());
    }

    for device in devices {
        println!("uio{:<3} {}", device.id, device.name);
        for (index, map) in device.maps.iter().enumerate() {
            println!(
                "        map{}: {:#010x} ({})",
                index,
                map.addr,
                format_bytes(map.size as u64)
            );
        }
    }
    Ok(())
}

fn config_show(section: Option<&str>, config: &Config) -> anyhow::Result<()> {
    let text = match section {
        None => toml::to_string_pretty(config)?,
        Some("devices") => toml::to_string_pretty(&config.devices)?,
        Some("dma") => toml::to_string_pretty(&config.dma)?,
        Some("tx") => toml::to_string_pretty(&config.tx)?,
        Some("rx") => toml::to_string_pretty(&config.rx)?,
        Some("modem") => toml::to_string_pretty(&config.modem)?,
        Some("logging") => toml::to_string_pretty(&config.logging)?,
        Some(other) => anyhow::bail!("Unknown configuration section: {}", other),
    };
    print!("{}", text);
    Ok(())
}

fn config_set(key: &str, value: &str, config_path: &std::path::Path) -> anyhow::Result<()> {
    let mut config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    let number = |name: &str| -> anyhow::Result<u64> {
        value
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid number for {}: {}", name, value))
    };
    let boolean = |name: &str| -> anyhow::Result<bool> {
        value
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid boolean value for {}: {}", name, value))
    };

    match key.to_lowercase().as_str() {
        "devices.tx_modem" => config.devices.tx_modem = value.to_string(),
        "devices.tx_dma" => config.devices.tx_dma = value.to_string(),
        "devices.rx_modem" => config.devices.rx_modem = value.to_string(),
        "devices.rx_dma" => config.devices.rx_dma = value.to_string(),
        "dma.irq_timeout_ms" => config.dma.irq_timeout_ms = number(key)?,
        "dma.transfer_timeout_ms" => config.dma.transfer_timeout_ms = number(key)?,
        "dma.poll_only" => config.dma.poll_only = boolean(key)?,
        "tx.mtu" => config.tx.mtu = number(key)? as usize,
        "tx.staged_frame_limit" => config.tx.staged_frame_limit = number(key)? as usize,
        "tx.throttle_every" => config.tx.throttle_every = number(key)? as usize,
        "tx.throttle_pause_ms" => config.tx.throttle_pause_ms = number(key)?,
        "tx.confirm_completion" => config.tx.confirm_completion = boolean(key)?,
        "rx.first_frame_timeout_ms" => config.rx.first_frame_timeout_ms = number(key)?,
        "rx.frame_timeout_ms" => config.rx.frame_timeout_ms = number(key)?,
        "rx.irq_window_ms" => config.rx.irq_window_ms = number(key)?,
        "rx.irq_retries" => config.rx.irq_retries = number(key)? as u32,
        "rx.stride" => config.rx.stride = value.to_string(),
        "rx.max_frame_sz" => config.rx.max_frame_sz = number(key)? as u32,
        "modem.loop_bw" => config.modem.loop_bw = number(key)? as u32,
        "modem.eq_mu" => config.modem.eq_mu = number(key)? as u32,
        "modem.pd_threshold" => config.modem.pd_threshold = number(key)? as u32,
        "modem.bypass_coding" => config.modem.bypass_coding = boolean(key)?,
        "modem.bypass_eq" => config.modem.bypass_eq = boolean(key)?,
        "modem.ext_fr_k1" => config.modem.ext_fr_k1 = Some(number(key)? as u32),
        "modem.ext_fr_k2" => config.modem.ext_fr_k2 = Some(number(key)? as u32),
        "logging.level" => config.logging.level = value.to_string(),
        _ => anyhow::bail!("Unknown configuration key: {}", key),
    }

    config.validate()?;
    config.save(config_path)?;

    println!("Configuration updated: {} = {}", key, value);
    println!("Saved to: {}", config_path.display());
    Ok(())
}
