//! Radar sensor input
//!
//! The radar writes one ASCII line per frame:
//!
//! ```text
//! frameIndex,pointCount,x1,y1,z1,vel1,snr1,x2,y2,z2,vel2,snr2,...\n
//! ```
//!
//! Every point value is a signed 16-bit integer in the radar's raw units.
//! Lines that do not match this shape are skipped by the relay, never fatal.

pub mod serial;

pub use serial::{LineReader, SerialLineSource};

use crate::error::Result;
use crate::protocol::{MAX_TARGETS, TargetRecord, TargetState};
use thiserror::Error;

/// Tokens per point: x, y, z, velocity, snr
const POINT_FIELDS: usize = 5;

/// Outcome of one line read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    /// One complete line, trimmed
    Line(String),
    /// No complete line yet (read timeout)
    Idle,
    /// Source reached end of stream
    Closed,
}

/// Source of newline-delimited sensor output
pub trait LineSource: Send {
    /// Read the next line, or report that none is ready
    fn read_line(&mut self) -> Result<ReadLine>;
}

/// Reason a sensor line was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("line has {0} tokens, need at least 2")]
    TooFewTokens(usize),

    #[error("invalid frame header field: {0:?}")]
    InvalidHeader(String),

    #[error("point data too short: got {actual} tokens, expected {expected}")]
    MissingPoints { expected: usize, actual: usize },

    #[error("invalid value {value:?} in point {point}")]
    InvalidPoint { point: usize, value: String },
}

/// One raw radar point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadarPoint {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    /// Radial (Doppler) velocity
    pub velocity: i16,
    pub snr: i16,
}

/// One parsed sensor line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorFrame {
    pub frame_index: u32,
    pub points: Vec<RadarPoint>,
}

/// Parse one ASCII sensor line
///
/// Empty tokens (e.g. from a trailing comma) are ignored. Tokens beyond
/// `5 * pointCount` are ignored.
pub fn parse_line(line: &str) -> std::result::Result<SensorFrame, LineError> {
    let tokens: Vec<&str> = line
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.len() < 2 {
        return Err(LineError::TooFewTokens(tokens.len()));
    }

    let frame_index: u32 = tokens[0]
        .parse()
        .map_err(|_| LineError::InvalidHeader(tokens[0].to_string()))?;
    let point_count: usize = tokens[1]
        .parse()
        .map_err(|_| LineError::InvalidHeader(tokens[1].to_string()))?;

    let data = &tokens[2..];
    let expected = point_count.saturating_mul(POINT_FIELDS);
    if data.len() < expected {
        return Err(LineError::MissingPoints {
            expected,
            actual: data.len(),
        });
    }

    let mut points = Vec::with_capacity(point_count);
    for (point, fields) in data[..expected].chunks_exact(POINT_FIELDS).enumerate() {
        let mut values = [0i16; POINT_FIELDS];
        for (slot, token) in values.iter_mut().zip(fields) {
            *slot = token.parse().map_err(|_| LineError::InvalidPoint {
                point,
                value: token.to_string(),
            })?;
        }
        points.push(RadarPoint {
            x: values[0],
            y: values[1],
            z: values[2],
            velocity: values[3],
            snr: values[4],
        });
    }

    Ok(SensorFrame {
        frame_index,
        points,
    })
}

/// Scale factors from raw sensor units to SI units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointScale {
    /// Meters per raw position unit
    pub position: f32,
    /// Meters/second per raw velocity unit
    pub velocity: f32,
}

impl Default for PointScale {
    fn default() -> Self {
        Self {
            position: 0.01,
            velocity: 0.01,
        }
    }
}

impl SensorFrame {
    /// Convert points into target records for relaying
    ///
    /// Each point becomes one record: `id` is its index in the frame and the
    /// radial velocity is projected along the point's bearing. At most
    /// [`MAX_TARGETS`] points are converted.
    pub fn to_target_records(&self, scale: PointScale) -> Vec<TargetRecord> {
        self.points
            .iter()
            .take(MAX_TARGETS)
            .enumerate()
            .map(|(i, p)| {
                let position = [
                    p.x as f32 * scale.position,
                    p.y as f32 * scale.position,
                    p.z as f32 * scale.position,
                ];
                let speed = p.velocity as f32 * scale.velocity;
                let range = position.iter().map(|v| v * v).sum::<f32>().sqrt();
                let velocity = if range > f32::EPSILON {
                    position.map(|v| v / range * speed)
                } else {
                    [0.0; 3]
                };

                TargetRecord {
                    id: i as u16,
                    state: TargetState::Normal.code(),
                    point_count: 1,
                    position,
                    velocity,
                    acceleration: [0.0; 3],
                }
            })
            .collect()
    }
}
