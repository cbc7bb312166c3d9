//! Target relay wire protocol
//!
//! # Frame Layout
//!
//! All fields are little-endian:
//!
//! ```text
//! Plain (variant A):
//! ┌──────────────┬────────────────┬─────────────┬──────────────────────┐
//! │ Header (2)   │ BodyLength (2) │ Count (1)   │ Record × Count       │
//! │ 0xAA55       │ u16            │ u8          │ 32 or 44 bytes each  │
//! └──────────────┴────────────────┴─────────────┴──────────────────────┘
//!
//! Indexed (variant B):
//! ┌──────────────┬────────────────┬────────────────┬───────────┬────────────────┐
//! │ Header (2)   │ FrameIndex (4) │ BodyLength (2) │ Count (1) │ Record × Count │
//! └──────────────┴────────────────┴────────────────┴───────────┴────────────────┘
//! ```
//!
//! `BodyLength` counts the bytes after the length field: the target count
//! byte plus every record, so `BodyLength == 1 + Count * RecordSize`.
//!
//! # Record Layouts
//!
//! | Layout      | Fields                                              | Size |
//! |-------------|-----------------------------------------------------|------|
//! | `Kinematic` | id u16, state u16, points u32, pos 3×f32, vel 3×f32 | 32   |
//! | `Full`      | kinematic fields + acc 3×f32                        | 44   |
//!
//! Neither the preamble variant nor the record layout is self-describing.
//! Both ends must be configured with the same [`ProtocolVariant`].

pub mod codec;
pub mod reassembler;
pub mod record;

pub use codec::{DecodedBody, FrameCodec};
pub use reassembler::{Frame, ReassemblerState, StreamReassembler};
pub use record::{TargetRecord, TargetState};

use serde::{Deserialize, Serialize};

/// Frame header magic (serialized little-endian as `55 AA`)
pub const FRAME_HEADER: u16 = 0xAA55;

/// Maximum number of targets in one frame (u8 count field)
pub const MAX_TARGETS: usize = u8::MAX as usize;

/// Preamble size without frame index: header(2) + length(2)
pub const PLAIN_PREAMBLE_SIZE: usize = 4;

/// Preamble size with frame index: header(2) + index(4) + length(2)
pub const INDEXED_PREAMBLE_SIZE: usize = 8;

/// Record size for the 9-field layout
pub const KINEMATIC_RECORD_SIZE: usize = 32;

/// Record size for the 12-field layout
pub const FULL_RECORD_SIZE: usize = 44;

/// Frame preamble variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preamble {
    /// Header and body length only
    Plain,
    /// Header, u32 frame index, body length
    #[default]
    Indexed,
}

/// Target record struct layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordLayout {
    /// Position and velocity (9 fields)
    Kinematic,
    /// Position, velocity and acceleration (12 fields)
    #[default]
    Full,
}

impl RecordLayout {
    /// Encoded size of one record in bytes
    pub const fn record_size(self) -> usize {
        match self {
            RecordLayout::Kinematic => KINEMATIC_RECORD_SIZE,
            RecordLayout::Full => FULL_RECORD_SIZE,
        }
    }
}

/// Protocol variant descriptor selected at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolVariant {
    /// Preamble shape
    pub preamble: Preamble,
    /// Record struct layout
    pub layout: RecordLayout,
}

impl ProtocolVariant {
    pub const fn new(preamble: Preamble, layout: RecordLayout) -> Self {
        Self { preamble, layout }
    }

    /// Whether frames carry a u32 frame index
    #[inline]
    pub const fn has_index(&self) -> bool {
        matches!(self.preamble, Preamble::Indexed)
    }

    /// Bytes before the body (header, optional index, length)
    #[inline]
    pub const fn preamble_size(&self) -> usize {
        match self.preamble {
            Preamble::Plain => PLAIN_PREAMBLE_SIZE,
            Preamble::Indexed => INDEXED_PREAMBLE_SIZE,
        }
    }

    /// Offset of the body length field within the preamble
    #[inline]
    pub const fn length_offset(&self) -> usize {
        self.preamble_size() - 2
    }

    #[inline]
    pub const fn record_size(&self) -> usize {
        self.layout.record_size()
    }

    /// Body length for `count` records
    #[inline]
    pub const fn body_len(&self, count: usize) -> usize {
        1 + count * self.record_size()
    }

    /// Largest body a well-formed frame can declare
    #[inline]
    pub const fn max_body_len(&self) -> usize {
        self.body_len(MAX_TARGETS)
    }
}
