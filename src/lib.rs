//! radar-relay - Radar target relay over TCP
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ASCII lines   ┌───────────────┐   frames   ┌─────────────┐
//! │ radar UART │ ──────────────▶ │ RelayPipeline │ ─────────▶ │ FrameServer │ ──▶ consumer
//! └────────────┘                 │  RelaySender  │    TCP     │ Reassembler │   channel
//!                                └───────────────┘            └─────────────┘
//! ```
//!
//! - [`sensor`]: sensor line parsing and the serial line source
//! - [`protocol`]: frame codec, target records, stream reassembly
//! - [`relay`]: outbound connection with bounded reconnect
//! - [`server`]: sequential accept loop feeding a crossbeam channel
//!
//! Two binaries wrap these: `radar-relay` (serial to TCP) and `frame-server`
//! (TCP to log).

pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod sensor;
pub mod server;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use protocol::{
    DecodedBody, Frame, FrameCodec, Preamble, ProtocolVariant, RecordLayout, StreamReassembler,
    TargetRecord, TargetState,
};
pub use relay::{RelayPipeline, RelaySender, RetryPolicy};
pub use server::{DecodedFrame, FrameServer, ShutdownHandle};
