//! Target record and activity state
//!
//! A [`TargetRecord`] is one tracked object in one frame. Its lifetime is
//! exactly one frame; `id` may be used by consumers to follow a track across
//! frames but carries no stronger identity guarantee.

use super::RecordLayout;
use std::fmt;

/// One tracked object in one frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetRecord {
    /// Track identifier
    pub id: u16,
    /// Raw activity code (see [`TargetState`])
    pub state: u16,
    /// Radar points supporting this track
    pub point_count: u32,
    /// Position in meters (x, y, z)
    pub position: [f32; 3],
    /// Velocity in m/s (vx, vy, vz)
    pub velocity: [f32; 3],
    /// Acceleration in m/s² (ax, ay, az); zero in the kinematic layout
    pub acceleration: [f32; 3],
}

impl TargetRecord {
    /// Decoded activity state
    #[inline]
    pub fn activity(&self) -> TargetState {
        TargetState::from(self.state)
    }

    /// Append the little-endian encoding for `layout` to `out`
    pub fn write_to(&self, layout: RecordLayout, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.state.to_le_bytes());
        out.extend_from_slice(&self.point_count.to_le_bytes());
        for v in self.position.iter().chain(self.velocity.iter()) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        if layout == RecordLayout::Full {
            for v in &self.acceleration {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }

    /// Decode one record from exactly `layout.record_size()` bytes
    ///
    /// Callers check the slice length; this only indexes within it.
    pub fn read_from(layout: RecordLayout, bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), layout.record_size());

        let acceleration = match layout {
            RecordLayout::Full => read_vec3(bytes, 32),
            RecordLayout::Kinematic => [0.0; 3],
        };

        Self {
            id: u16::from_le_bytes([bytes[0], bytes[1]]),
            state: u16::from_le_bytes([bytes[2], bytes[3]]),
            point_count: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            position: read_vec3(bytes, 8),
            velocity: read_vec3(bytes, 20),
            acceleration,
        }
    }
}

#[inline]
fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline]
fn read_vec3(bytes: &[u8], offset: usize) -> [f32; 3] {
    [
        read_f32(bytes, offset),
        read_f32(bytes, offset + 4),
        read_f32(bytes, offset + 8),
    ]
}

/// Activity code reported by the radar tracker
///
/// Codes outside 0–6 are kept as [`TargetState::Unknown`] so the raw value
/// survives a decode/encode cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Empty,
    Normal,
    Walking,
    Sitting,
    FallTransition,
    ConfirmedFall,
    OutOfBounds,
    Unknown(u16),
}

impl TargetState {
    /// Wire code for this state
    pub const fn code(self) -> u16 {
        match self {
            TargetState::Empty => 0,
            TargetState::Normal => 1,
            TargetState::Walking => 2,
            TargetState::Sitting => 3,
            TargetState::FallTransition => 4,
            TargetState::ConfirmedFall => 5,
            TargetState::OutOfBounds => 6,
            TargetState::Unknown(code) => code,
        }
    }

    /// Human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            TargetState::Empty => "empty",
            TargetState::Normal => "normal",
            TargetState::Walking => "walking",
            TargetState::Sitting => "sitting",
            TargetState::FallTransition => "fall-transition",
            TargetState::ConfirmedFall => "confirmed-fall",
            TargetState::OutOfBounds => "out-of-bounds",
            TargetState::Unknown(_) => "unknown",
        }
    }

    /// Whether this state signals a fall (transition or confirmed)
    pub const fn is_fall(self) -> bool {
        matches!(
            self,
            TargetState::FallTransition | TargetState::ConfirmedFall
        )
    }
}

impl From<u16> for TargetState {
    fn from(code: u16) -> Self {
        match code {
            0 => TargetState::Empty,
            1 => TargetState::Normal,
            2 => TargetState::Walking,
            3 => TargetState::Sitting,
            4 => TargetState::FallTransition,
            5 => TargetState::ConfirmedFall,
            6 => TargetState::OutOfBounds,
            other => TargetState::Unknown(other),
        }
    }
}

impl From<TargetState> for u16 {
    fn from(state: TargetState) -> Self {
        state.code()
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
