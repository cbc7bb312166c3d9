//! Radar serial-to-TCP relay.
//!
//! Reads the radar's ASCII point lines from a serial port and forwards each
//! line as one binary target frame to a frame server.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: /dev/ttyUSB0 at 921600 baud, server 127.0.0.1:8899
//! radar-relay
//!
//! # Config file with command-line overrides
//! radar-relay --config relay.toml --server 192.168.1.20:7777 --serial-port COM30
//! ```

use clap::Parser;
use radar_relay::error::{Error, Result};
use radar_relay::sensor::{PointScale, SerialLineSource};
use radar_relay::{AppConfig, FrameCodec, RelayPipeline, RelaySender, RetryPolicy};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Frame server address (overrides relay.server_address)
    #[arg(short, long)]
    server: Option<String>,

    /// Radar serial port (overrides relay.serial_port)
    #[arg(short = 'p', long)]
    serial_port: Option<String>,

    /// Serial baud rate (overrides relay.baud_rate)
    #[arg(short, long)]
    baud_rate: Option<u32>,

    /// Connection attempts per connect cycle (overrides relay.max_retries)
    #[arg(long)]
    max_retries: Option<u32>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(server) = args.server {
        config.relay.server_address = server;
    }
    if let Some(port) = args.serial_port {
        config.relay.serial_port = port;
    }
    if let Some(baud) = args.baud_rate {
        config.relay.baud_rate = baud;
    }
    if let Some(retries) = args.max_retries {
        config.relay.max_retries = retries;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("radar-relay v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        log::info!("Using config: {}", path);
    }

    let variant = config.protocol.variant();
    log::info!(
        "Protocol: {:?} preamble, {:?} records ({} bytes each)",
        variant.preamble,
        variant.layout,
        variant.record_size()
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let source = SerialLineSource::open(
        &config.relay.serial_port,
        config.relay.baud_rate,
        config.relay.serial_timeout(),
    )?;

    let sender = RelaySender::new(
        config.relay.server_address.clone(),
        RetryPolicy::from(&config.relay),
        FrameCodec::new(variant),
    );

    let scale = PointScale {
        position: config.relay.position_scale,
        velocity: config.relay.velocity_scale,
    };

    let mut pipeline = RelayPipeline::new(source, sender, scale).with_running_flag(running);
    let stats = pipeline.run()?;

    log::info!(
        "radar-relay shutdown complete ({} frames relayed)",
        stats.frames_sent
    );
    Ok(())
}
