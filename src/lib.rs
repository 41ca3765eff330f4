//! Parallel parsing engine for IRIG 106 Chapter 10 telemetry
//! recordings: header/dispatcher decode, the 1553-F1 and PCM-F1
//! component parsers, TDP-anchored time correlation, and a
//! thread-per-chunk worker/manager pool.
//!
//! See `DESIGN.md` for the grounding of each module.

pub mod components;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod element;
pub mod error;
pub mod header;
pub mod manager;
pub mod sink;
pub mod time;
pub mod worker;

pub use config::{Ch10PacketType, ParseConfig, WorkerConfig};
pub use context::Ch10Context;
pub use error::{Ch10Error, Ch10Status, Result};
pub use manager::{ParseManager, RunMetadata};
pub use sink::{Column, Row, RowSink};
pub use worker::{ParseWorker, WorkerResult};
