//! Radar target frame server.
//!
//! Accepts relay connections one at a time, decodes target frames, and logs
//! every frame with the activity state of each target.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 127.0.0.1:8899 until Ctrl-C
//! frame-server
//!
//! # Alternate port, stop after the first relay disconnects
//! frame-server --bind 0.0.0.0:7788 --single-shot
//! ```

use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use radar_relay::error::{Error, Result};
use radar_relay::{AppConfig, DecodedFrame, FrameServer};
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address (overrides server.bind_address)
    #[arg(short, long)]
    bind: Option<String>,

    /// Stop after the first connection closes
    #[arg(long)]
    single_shot: bool,
}

/// Log each frame until the server side of the channel goes away
fn consume(frames: Receiver<DecodedFrame>) -> u64 {
    let mut count = 0u64;
    loop {
        match frames.recv_timeout(Duration::from_millis(200)) {
            Ok(frame) => {
                count += 1;
                log::info!(
                    "Frame {:?}: {} targets",
                    frame.frame_index,
                    frame.targets.len()
                );
                for target in &frame.targets {
                    let state = target.activity();
                    let line = format!(
                        "  target {} [{}] points={} pos=({:.2}, {:.2}, {:.2}) vel=({:.2}, {:.2}, {:.2})",
                        target.id,
                        state,
                        target.point_count,
                        target.position[0],
                        target.position[1],
                        target.position[2],
                        target.velocity[0],
                        target.velocity[1],
                        target.velocity[2],
                    );
                    if state.is_fall() {
                        log::warn!("{}", line);
                    } else {
                        log::info!("{}", line);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return count,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if args.single_shot {
        config.server.single_shot = true;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("frame-server v{} starting...", env!("CARGO_PKG_VERSION"));

    let (server, frames) = FrameServer::listen(&config.server, config.protocol.variant())?;
    let mut server = server.with_max_body_len(config.protocol.max_body_len());
    let handler = server.shutdown_handle();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        handler.stop();
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let server_thread = thread::Builder::new()
        .name("frame-server".to_string())
        .spawn(move || server.run())?;

    let count = consume(frames);

    match server_thread.join() {
        Ok(Ok(stats)) => log::info!(
            "frame-server shutdown complete ({} frames consumed, {} decode errors)",
            count,
            stats.decode_errors
        ),
        Ok(Err(e)) => return Err(e),
        Err(_) => return Err(Error::Other("Server thread panicked".to_string())),
    }
    Ok(())
}
