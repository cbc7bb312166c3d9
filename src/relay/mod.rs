//! Sender side: sensor lines in, target frames out
//!
//! ```text
//! LineSource ──▶ parse_line ──▶ to_target_records ──▶ RelaySender ──▶ TCP
//! ```
//!
//! The whole pipeline runs on one thread. Malformed lines and dropped frames
//! are logged and counted; only the initial connect and source I/O failures
//! end the run.

pub mod sender;

pub use sender::{RelaySender, RetryPolicy};

use crate::error::{Error, Result};
use crate::protocol::MAX_TARGETS;
use crate::sensor::{LineSource, PointScale, ReadLine, parse_line};
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub lines_read: u64,
    pub lines_skipped: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
}

/// Serial-to-TCP relay loop
pub struct RelayPipeline<S> {
    source: S,
    sender: RelaySender,
    scale: PointScale,
    running: Arc<AtomicBool>,
    stats: RelayStats,
}

impl<S: LineSource> RelayPipeline<S> {
    pub fn new(source: S, sender: RelaySender, scale: PointScale) -> Self {
        Self {
            source,
            sender,
            scale,
            running: Arc::new(AtomicBool::new(true)),
            stats: RelayStats::default(),
        }
    }

    /// Share an externally owned running flag (e.g. set by a Ctrl-C handler)
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Connect, then relay lines until the flag clears or the source closes
    pub fn run(&mut self) -> Result<RelayStats> {
        self.sender.connect()?;
        info!("Relaying sensor frames to {}", self.sender.address());

        while self.running.load(Ordering::Relaxed) {
            match self.source.read_line()? {
                ReadLine::Line(line) => self.relay_line(&line),
                ReadLine::Idle => continue,
                ReadLine::Closed => {
                    info!("Sensor input closed");
                    break;
                }
            }
        }

        self.sender.disconnect();
        info!(
            "Relay stopped ({} lines, {} skipped, {} frames sent, {} dropped)",
            self.stats.lines_read,
            self.stats.lines_skipped,
            self.stats.frames_sent,
            self.stats.frames_dropped
        );
        Ok(self.stats)
    }

    fn relay_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        self.stats.lines_read += 1;

        let frame = match parse_line(line) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Skipping sensor line: {}", e);
                self.stats.lines_skipped += 1;
                return;
            }
        };

        if frame.points.len() > MAX_TARGETS {
            warn!(
                "Frame {} has {} points, relaying first {}",
                frame.frame_index,
                frame.points.len(),
                MAX_TARGETS
            );
        }

        let records = frame.to_target_records(self.scale);
        match self.sender.send_indexed(&records, frame.frame_index) {
            Ok(()) => self.stats.frames_sent += 1,
            Err(Error::SendFailed(reason)) => {
                warn!("Frame {} not relayed: {}", frame.frame_index, reason);
                self.stats.frames_dropped += 1;
            }
            Err(e) => {
                warn!("Frame {} not encoded: {}", frame.frame_index, e);
                self.stats.frames_dropped += 1;
            }
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn sender(&self) -> &RelaySender {
        &self.sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        FrameCodec, Preamble, ProtocolVariant, RecordLayout, StreamReassembler,
    };
    use crate::sensor::LineReader;
    use std::io::{Cursor, Read};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    const VARIANT: ProtocolVariant = ProtocolVariant::new(Preamble::Indexed, RecordLayout::Full);

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            retry_delay: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_pipeline_relays_valid_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let reader = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes).unwrap();
            bytes
        });

        let input = "100,1,300,400,0,-50,9\n\
                     garbage line\n\
                     \n\
                     101,2,1,1,1,0,0\n\
                     102,0\n";
        let source = LineReader::new(Cursor::new(input.as_bytes().to_vec()));
        let sender = RelaySender::new(addr.to_string(), policy(), FrameCodec::new(VARIANT));
        let mut pipeline = RelayPipeline::new(source, sender, PointScale::default());

        let stats = pipeline.run().unwrap();
        assert_eq!(
            stats,
            RelayStats {
                lines_read: 4,
                lines_skipped: 2,
                frames_sent: 2,
                frames_dropped: 0,
            }
        );

        let bytes = reader.join().unwrap();
        let mut reassembler = StreamReassembler::new(VARIANT);
        reassembler.feed(&bytes);
        let frames: Vec<_> = reassembler.frames().collect::<Result<_>>().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].frame_index, Some(100));
        assert_eq!(frames[1].frame_index, Some(102));

        let codec = FrameCodec::new(VARIANT);
        let first = codec.decode_body(&frames[0].body).unwrap();
        assert_eq!(first.records.len(), 1);
        assert!((first.records[0].position[1] - 4.0).abs() < 1e-5);
        assert!(codec.decode_body(&frames[1].body).unwrap().records.is_empty());
    }

    #[test]
    fn test_pipeline_fails_without_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = LineReader::new(Cursor::new(b"1,0\n".to_vec()));
        let sender = RelaySender::new(addr.to_string(), policy(), FrameCodec::new(VARIANT));
        let mut pipeline = RelayPipeline::new(source, sender, PointScale::default());

        assert!(matches!(
            pipeline.run(),
            Err(Error::ConnectFailed { attempts: 2, .. })
        ));
    }

    #[test]
    fn test_pipeline_stops_on_flag() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _acceptor = thread::spawn(move || listener.accept().map(|(s, _)| s));

        let source = LineReader::new(Cursor::new(b"1,0\n2,0\n".to_vec()));
        let sender = RelaySender::new(addr.to_string(), policy(), FrameCodec::new(VARIANT));
        let running = Arc::new(AtomicBool::new(false));
        let mut pipeline = RelayPipeline::new(source, sender, PointScale::default())
            .with_running_flag(Arc::clone(&running));

        let stats = pipeline.run().unwrap();
        assert_eq!(stats.lines_read, 0);
        assert!(!pipeline.sender().is_connected());
    }
}
