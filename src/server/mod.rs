//! Receiver side: TCP byte stream in, decoded frames out
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. Relay connects to the bind address (default 127.0.0.1:8899)
//! 2. Server reads chunks into a StreamReassembler
//! 3. Each complete frame is decoded and pushed to the consumer channel
//! 4. On close the server accepts the next relay (or stops if single-shot)
//! ```
//!
//! Connections are served one at a time. Corrupt frames are logged and
//! skipped; the reassembler re-synchronizes at the byte level and the
//! connection stays open.
//!
//! # Shutdown
//!
//! [`ShutdownHandle::stop`] clears the running flag and shuts down the active
//! socket. Reads also time out periodically so the flag is always observed.

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameCodec, ProtocolVariant, StreamReassembler, TargetRecord};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Accept poll interval while no relay is connected
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One frame delivered to the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Frame index (indexed preamble only)
    pub frame_index: Option<u32>,
    /// Targets in transmission order
    pub targets: Vec<TargetRecord>,
}

/// Server counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub connections: u64,
    pub frames_published: u64,
    /// Frames dropped because the consumer queue was full
    pub frames_dropped: u64,
    /// Frames rejected by the reassembler or decoder
    pub decode_errors: u64,
}

/// Stops a running [`FrameServer`] from another thread
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    active: Arc<Mutex<Option<TcpStream>>>,
}

impl ShutdownHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(stream) = self.active.lock().as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// How a connection ended
enum ConnectionEnd {
    /// Peer closed the stream
    Closed,
    /// Running flag cleared
    Stopped,
    /// Consumer dropped its receiver
    ConsumerGone,
}

/// Sequential TCP frame server
pub struct FrameServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    codec: FrameCodec,
    max_body_len: usize,
    config: ServerConfig,
    frames_tx: Sender<DecodedFrame>,
    running: Arc<AtomicBool>,
    active: Arc<Mutex<Option<TcpStream>>>,
    stats: ServerStats,
}

impl FrameServer {
    /// Bind the listening socket and create the consumer channel
    ///
    /// A `queue_capacity` of 0 gives an unbounded channel; otherwise frames
    /// arriving while the queue is full are dropped.
    pub fn listen(
        config: &ServerConfig,
        variant: ProtocolVariant,
    ) -> Result<(Self, Receiver<DecodedFrame>)> {
        let listener = TcpListener::bind(&config.bind_address).map_err(|source| Error::Bind {
            address: config.bind_address.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (frames_tx, frames_rx) = if config.queue_capacity == 0 {
            crossbeam_channel::unbounded()
        } else {
            crossbeam_channel::bounded(config.queue_capacity)
        };

        info!("Frame server listening on {}", local_addr);

        Ok((
            Self {
                listener,
                local_addr,
                codec: FrameCodec::new(variant),
                max_body_len: variant.max_body_len(),
                config: config.clone(),
                frames_tx,
                running: Arc::new(AtomicBool::new(true)),
                active: Arc::new(Mutex::new(None)),
                stats: ServerStats::default(),
            },
            frames_rx,
        ))
    }

    /// Override the largest accepted body length
    pub fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            active: Arc::clone(&self.active),
        }
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Accept and serve connections until stopped
    pub fn run(&mut self) -> Result<ServerStats> {
        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.stats.connections += 1;
                    info!("Relay connected: {}", peer);

                    match self.serve_connection(stream) {
                        Ok(ConnectionEnd::Closed) => info!("Relay disconnected: {}", peer),
                        Ok(ConnectionEnd::Stopped) => debug!("Connection {} closed on shutdown", peer),
                        Ok(ConnectionEnd::ConsumerGone) => {
                            info!("Frame consumer dropped, stopping server");
                            break;
                        }
                        Err(e) => warn!("Connection {} failed: {}", peer, e),
                    }

                    if self.config.single_shot {
                        info!("Single-shot mode, stopping after first connection");
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        info!(
            "Frame server stopped ({} connections, {} frames, {} dropped, {} errors)",
            self.stats.connections,
            self.stats.frames_published,
            self.stats.frames_dropped,
            self.stats.decode_errors
        );
        Ok(self.stats)
    }

    fn serve_connection(&mut self, mut stream: TcpStream) -> Result<ConnectionEnd> {
        stream.set_nonblocking(false)?;
        let timeout = self.config.read_timeout();
        if let Err(e) = stream.set_read_timeout((!timeout.is_zero()).then_some(timeout)) {
            warn!("Failed to set read timeout: {}", e);
        }
        *self.active.lock() = Some(stream.try_clone()?);

        let result = self.read_loop(&mut stream);

        self.active.lock().take();
        let _ = stream.shutdown(Shutdown::Both);
        result
    }

    fn read_loop(&mut self, stream: &mut TcpStream) -> Result<ConnectionEnd> {
        let mut reassembler =
            StreamReassembler::new(self.codec.variant()).with_max_body_len(self.max_body_len);
        let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];

        loop {
            if !self.running.load(Ordering::Relaxed) {
                return Ok(ConnectionEnd::Stopped);
            }

            let n = match stream.read(&mut buf) {
                Ok(0) => return Ok(ConnectionEnd::Closed),
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(_) if !self.running.load(Ordering::Relaxed) => {
                    return Ok(ConnectionEnd::Stopped);
                }
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    return Ok(ConnectionEnd::Closed);
                }
                Err(e) => return Err(e.into()),
            };

            reassembler.feed(&buf[..n]);
            if !self.drain(&mut reassembler) {
                return Ok(ConnectionEnd::ConsumerGone);
            }
        }
    }

    /// Publish every complete frame; false once the consumer is gone
    fn drain(&mut self, reassembler: &mut StreamReassembler) -> bool {
        loop {
            match reassembler.try_extract_frame() {
                Ok(Some(frame)) => {
                    if !self.publish(frame) {
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(e) => {
                    warn!("Discarding frame: {}", e);
                    self.stats.decode_errors += 1;
                }
            }
        }
    }

    fn publish(&mut self, frame: Frame) -> bool {
        let body = match self.codec.decode_body(&frame.body) {
            Ok(body) => body,
            Err(e) => {
                warn!("Skipping frame {:?}: {}", frame.frame_index, e);
                self.stats.decode_errors += 1;
                return true;
            }
        };

        if body.has_trailing_data() {
            warn!(
                "Frame {:?} has {} trailing bytes after {} records",
                frame.frame_index,
                body.trailing_bytes,
                body.records.len()
            );
        }

        let decoded = DecodedFrame {
            frame_index: frame.frame_index,
            targets: body.records,
        };

        match self.frames_tx.try_send(decoded) {
            Ok(()) => {
                self.stats.frames_published += 1;
                true
            }
            Err(TrySendError::Full(dropped)) => {
                self.stats.frames_dropped += 1;
                if self.stats.frames_dropped % 100 == 1 {
                    warn!(
                        "Consumer queue full, dropped frame {:?} ({} total)",
                        dropped.frame_index, self.stats.frames_dropped
                    );
                }
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Preamble, RecordLayout};
    use std::io::Write;
    use std::time::Instant;

    const VARIANT: ProtocolVariant = ProtocolVariant::new(Preamble::Indexed, RecordLayout::Full);

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            single_shot: true,
            read_timeout_ms: 50,
            ..ServerConfig::default()
        }
    }

    fn record(id: u16) -> TargetRecord {
        TargetRecord {
            id,
            state: 1,
            point_count: 3,
            position: [id as f32, 0.5, 1.0],
            ..Default::default()
        }
    }

    #[test]
    fn test_bind_conflict_is_bind_error() {
        let (server, _rx) = FrameServer::listen(&test_config(), VARIANT).unwrap();
        let config = ServerConfig {
            bind_address: server.local_addr().to_string(),
            ..test_config()
        };
        let err = FrameServer::listen(&config, VARIANT).err().unwrap();
        assert!(matches!(err, Error::Bind { .. }));
    }

    #[test]
    fn test_serves_frames_and_skips_corruption() {
        let (mut server, rx) = FrameServer::listen(&test_config(), VARIANT).unwrap();
        let addr = server.local_addr();
        let handle = thread::spawn(move || server.run().unwrap());

        let codec = FrameCodec::new(VARIANT);
        let mut bytes = vec![0x13, 0x37];
        bytes.extend(codec.encode(&[record(1)], Some(5)).unwrap());
        // Declared count exceeds the body: truncated record
        bytes.extend_from_slice(&[0x55, 0xAA, 6, 0, 0, 0, 1, 0, 2]);
        bytes.extend(codec.encode(&[record(2), record(3)], Some(7)).unwrap());

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&bytes).unwrap();
        drop(stream);

        let stats = handle.join().unwrap();
        let frames: Vec<DecodedFrame> = rx.try_iter().collect();
        assert_eq!(
            frames,
            vec![
                DecodedFrame {
                    frame_index: Some(5),
                    targets: vec![record(1)],
                },
                DecodedFrame {
                    frame_index: Some(7),
                    targets: vec![record(2), record(3)],
                },
            ]
        );
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.frames_published, 2);
        assert_eq!(stats.decode_errors, 1);
    }

    #[test]
    fn test_full_queue_drops_frames() {
        let config = ServerConfig {
            queue_capacity: 1,
            ..test_config()
        };
        let (mut server, rx) = FrameServer::listen(&config, VARIANT).unwrap();
        let addr = server.local_addr();
        let handle = thread::spawn(move || server.run().unwrap());

        let codec = FrameCodec::new(VARIANT);
        let mut bytes = Vec::new();
        for i in 0..3 {
            bytes.extend(codec.encode(&[record(i)], Some(i as u32)).unwrap());
        }
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&bytes).unwrap();
        drop(stream);

        let stats = handle.join().unwrap();
        assert_eq!(stats.frames_published, 1);
        assert_eq!(stats.frames_dropped, 2);
        assert_eq!(rx.try_recv().unwrap().frame_index, Some(0));
    }

    #[test]
    fn test_shutdown_idle_server() {
        let config = ServerConfig {
            single_shot: false,
            ..test_config()
        };
        let (mut server, _rx) = FrameServer::listen(&config, VARIANT).unwrap();
        let shutdown = server.shutdown_handle();
        let handle = thread::spawn(move || server.run().unwrap());

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        shutdown.stop();
        let stats = handle.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(stats.connections, 0);
        assert!(!shutdown.is_running());
    }

    #[test]
    fn test_shutdown_unblocks_active_connection() {
        let config = ServerConfig {
            single_shot: false,
            read_timeout_ms: 0,
            ..test_config()
        };
        let (mut server, _rx) = FrameServer::listen(&config, VARIANT).unwrap();
        let addr = server.local_addr();
        let shutdown = server.shutdown_handle();
        let handle = thread::spawn(move || server.run().unwrap());

        let _stream = TcpStream::connect(addr).unwrap();
        // Wait until the server has picked up the connection
        let deadline = Instant::now() + Duration::from_secs(2);
        while shutdown.active.lock().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        shutdown.stop();
        let stats = handle.join().unwrap();
        assert_eq!(stats.connections, 1);
    }

    #[test]
    fn test_dropped_consumer_stops_server() {
        let config = ServerConfig {
            single_shot: false,
            ..test_config()
        };
        let (mut server, rx) = FrameServer::listen(&config, VARIANT).unwrap();
        let addr = server.local_addr();
        drop(rx);
        let handle = thread::spawn(move || server.run().unwrap());

        let frame = FrameCodec::new(VARIANT).encode(&[], Some(1)).unwrap();
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&frame).unwrap();

        let stats = handle.join().unwrap();
        assert_eq!(stats.frames_published, 0);
    }
}
