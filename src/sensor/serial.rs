//! Line-oriented serial input

use super::{LineSource, ReadLine};
use crate::error::Result;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::time::Duration;

/// Newline-delimited reader over any byte stream
///
/// Partial lines survive read timeouts and are completed by later reads.
/// Non-ASCII bytes are dropped.
pub struct LineReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    closed: bool,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::with_capacity(256),
            closed: false,
        }
    }

    fn take_line(&mut self) -> String {
        let line = self
            .pending
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect::<String>();
        self.pending.clear();
        line.trim().to_string()
    }
}

impl<R: Read + Send> LineSource for LineReader<R> {
    fn read_line(&mut self) -> Result<ReadLine> {
        if self.closed {
            return Ok(ReadLine::Closed);
        }

        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => {
                self.closed = true;
                if self.pending.is_empty() {
                    Ok(ReadLine::Closed)
                } else {
                    Ok(ReadLine::Line(self.take_line()))
                }
            }
            Ok(_) if self.pending.ends_with(b"\n") => Ok(ReadLine::Line(self.take_line())),
            // Stream ended mid-line; next call reports the tail
            Ok(_) => Ok(ReadLine::Idle),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadLine::Idle)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Radar serial port as a line source
pub type SerialLineSource = LineReader<Box<dyn SerialPort>>;

impl LineReader<Box<dyn SerialPort>> {
    /// Open the radar serial port (8N1, no flow control)
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0", "COM30")
    /// * `baud_rate` - Baud rate (the radar runs at 921600)
    /// * `timeout` - Read timeout; an idle port yields [`ReadLine::Idle`]
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()?;

        log::info!("Opened serial port: {} at {} baud", path, baud_rate);
        Ok(Self::new(port))
    }
}
