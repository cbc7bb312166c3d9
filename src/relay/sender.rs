//! Outbound TCP connection to the frame server
//!
//! One sender owns one connection. Frames are written whole with a blocking
//! `write_all`; a failed write triggers a single reconnect cycle and a single
//! resend, after which the frame is dropped.

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::protocol::{FrameCodec, TargetRecord};
use log::{debug, info, warn};
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

/// Connection retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per connect cycle
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
    /// Timeout of a single connect attempt
    pub connect_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&RelayConfig> for RetryPolicy {
    fn from(config: &RelayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// TCP client that relays encoded frames
pub struct RelaySender {
    address: String,
    policy: RetryPolicy,
    codec: FrameCodec,
    stream: Option<TcpStream>,
    frame_buffer: Vec<u8>,
    next_frame_index: u32,
    frames_sent: u64,
    frames_dropped: u64,
    last_attempts: u32,
}

impl RelaySender {
    /// Create a sender; no connection is made until [`connect`](Self::connect)
    /// or the first send.
    pub fn new(address: impl Into<String>, policy: RetryPolicy, codec: FrameCodec) -> Self {
        Self {
            address: address.into(),
            policy,
            codec,
            stream: None,
            frame_buffer: Vec::with_capacity(codec.frame_len(16)),
            next_frame_index: 0,
            frames_sent: 0,
            frames_dropped: 0,
            last_attempts: 0,
        }
    }

    /// Run one connect cycle
    ///
    /// Makes up to `max_retries` attempts (at least one) with `retry_delay`
    /// between consecutive attempts. Any existing connection is replaced.
    pub fn connect(&mut self) -> Result<()> {
        self.disconnect();

        let max_attempts = self.policy.max_retries.max(1);
        self.last_attempts = 0;

        for attempt in 1..=max_attempts {
            self.last_attempts = attempt;
            match self.open_stream() {
                Ok(stream) => {
                    info!(
                        "Connected to {} (attempt {}/{})",
                        self.address, attempt, max_attempts
                    );
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Connection to {} failed (attempt {}/{}): {}",
                        self.address, attempt, max_attempts, e
                    );
                    if attempt < max_attempts {
                        thread::sleep(self.policy.retry_delay);
                    }
                }
            }
        }

        Err(Error::ConnectFailed {
            address: self.address.clone(),
            attempts: max_attempts,
        })
    }

    fn open_stream(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in self.address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.policy.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
        }))
    }

    /// Send one complete frame
    ///
    /// When not connected, or when the write fails, performs one reconnect
    /// cycle and retries the frame once. A frame that still cannot be written
    /// is dropped.
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            match stream.write_all(frame) {
                Ok(()) => {
                    self.frames_sent += 1;
                    return Ok(());
                }
                Err(e) => {
                    warn!("Send to {} failed: {}, reconnecting", self.address, e);
                    self.disconnect();
                }
            }
        }

        if let Err(e) = self.connect() {
            self.frames_dropped += 1;
            return Err(Error::SendFailed(format!("frame dropped: {}", e)));
        }

        let result = match self.stream.as_mut() {
            Some(stream) => stream.write_all(frame),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        };

        match result {
            Ok(()) => {
                self.frames_sent += 1;
                Ok(())
            }
            Err(e) => {
                self.disconnect();
                self.frames_dropped += 1;
                Err(Error::SendFailed(format!(
                    "retry to {} failed, frame dropped: {}",
                    self.address, e
                )))
            }
        }
    }

    /// Encode and send records as the next frame
    ///
    /// The indexed preamble carries a frame index that increases by one per
    /// call, including calls whose frame is dropped.
    pub fn send_records(&mut self, records: &[TargetRecord]) -> Result<()> {
        self.send_indexed(records, self.next_frame_index)
    }

    /// Encode and send records under a caller-supplied frame index
    ///
    /// Used to forward the sensor's own frame numbering. The internal
    /// counter continues from `frame_index + 1`.
    pub fn send_indexed(&mut self, records: &[TargetRecord], frame_index: u32) -> Result<()> {
        self.next_frame_index = frame_index.wrapping_add(1);

        let mut frame = std::mem::take(&mut self.frame_buffer);
        let result = match self.codec.encode_into(&mut frame, records, Some(frame_index)) {
            Ok(()) => {
                debug!(
                    "Sending frame {} ({} targets, {} bytes)",
                    frame_index,
                    records.len(),
                    frame.len()
                );
                self.send(&frame)
            }
            Err(e) => Err(e),
        };

        self.frame_buffer = frame;
        result
    }

    /// Close the connection, if any
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("Disconnected from {}", self.address);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    /// Frame index the next [`send_records`](Self::send_records) will use
    pub fn next_frame_index(&self) -> u32 {
        self.next_frame_index
    }

    /// Attempts made by the most recent connect cycle
    pub fn last_connect_attempts(&self) -> u32 {
        self.last_attempts
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}

impl Drop for RelaySender {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Preamble, ProtocolVariant, RecordLayout};
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::Instant;

    fn codec() -> FrameCodec {
        FrameCodec::new(ProtocolVariant::new(Preamble::Indexed, RecordLayout::Full))
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(50),
            connect_timeout: Duration::from_millis(200),
        }
    }

    /// Address with nothing listening on it
    fn refused_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[test]
    fn test_connect_retry_bound() {
        let mut sender = RelaySender::new(refused_address(), fast_policy(3), codec());

        let start = Instant::now();
        let err = sender.connect().unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, Error::ConnectFailed { attempts: 3, .. }));
        assert_eq!(sender.last_connect_attempts(), 3);
        // Two delays between three attempts, none after the last
        assert!(elapsed >= Duration::from_millis(100));
        assert!(!sender.is_connected());
    }

    #[test]
    fn test_attempt_counter_resets_per_cycle() {
        let mut sender = RelaySender::new(refused_address(), fast_policy(2), codec());
        assert!(sender.connect().is_err());
        assert!(sender.connect().is_err());
        assert_eq!(sender.last_connect_attempts(), 2);
    }

    #[test]
    fn test_send_without_server_drops_frame() {
        let mut sender = RelaySender::new(refused_address(), fast_policy(1), codec());
        let err = sender.send_records(&[TargetRecord::default()]).unwrap_err();

        assert!(matches!(err, Error::SendFailed(_)));
        assert_eq!(sender.frames_dropped(), 1);
        assert_eq!(sender.frames_sent(), 0);
        // Index advances even for a dropped frame
        assert_eq!(sender.next_frame_index(), 1);
    }

    #[test]
    fn test_send_records_writes_indexed_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let reader = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes).unwrap();
            bytes
        });

        let mut sender = RelaySender::new(addr.to_string(), fast_policy(3), codec());
        sender.connect().unwrap();
        assert!(sender.is_connected());

        let record = TargetRecord {
            id: 9,
            state: 4,
            point_count: 12,
            position: [1.0, 2.0, 0.5],
            ..Default::default()
        };
        sender.send_records(&[record]).unwrap();
        sender.send_records(&[]).unwrap();
        assert_eq!(sender.frames_sent(), 2);
        sender.disconnect();

        let bytes = reader.join().unwrap();
        let codec = codec();
        assert_eq!(bytes.len(), codec.frame_len(1) + codec.frame_len(0));
        // First frame carries index 0, second index 1
        assert_eq!(&bytes[2..6], &0u32.to_le_bytes());
        let second = codec.frame_len(1);
        assert_eq!(&bytes[second + 2..second + 6], &1u32.to_le_bytes());

        let decoded = codec.decode_body(&bytes[8..second]).unwrap();
        assert_eq!(decoded.records, vec![record]);
    }

    #[test]
    fn test_send_indexed_moves_counter() {
        let mut sender = RelaySender::new(refused_address(), fast_policy(1), codec());
        assert!(sender.send_indexed(&[], 500).is_err());
        assert_eq!(sender.next_frame_index(), 501);

        let too_many = vec![TargetRecord::default(); 300];
        assert!(matches!(
            sender.send_records(&too_many),
            Err(Error::Encoding { count: 300, .. })
        ));
        // Encoding failures are not counted as dropped sends
        assert_eq!(sender.frames_dropped(), 1);
    }

    #[test]
    fn test_unresolvable_address() {
        let mut sender = RelaySender::new("not-an-address", fast_policy(1), codec());
        assert!(matches!(
            sender.connect(),
            Err(Error::ConnectFailed { attempts: 1, .. })
        ));
    }
}
