//! Crate-wide error taxonomy.
//!
//! Mirrors the teacher's flat `ErrorDetails<D>` enum: no `thiserror`
//! derive, `Display`/[`std::error::Error`] implemented by hand, and every
//! error carries the byte offset at which it was raised.

use std::fmt::{self, Display, Formatter};

/// Byte offset, relative to the start of the worker's chunk, at which an
/// error was raised.
pub type Location = u64;

/// All recoverable and fatal conditions the parsing engine can encounter.
#[derive(Debug)]
pub enum Ch10Error {
    /// Bad config map, missing append-suffix, unresolved sink, or a
    /// channel with zero/multiple PCM TMATS entries.
    ConfigError(String),
    /// Input not a regular file, or a read failed.
    InputError(String),
    /// Sync not found, checksum mismatch, or body-length mismatch.
    HeaderError(HeaderErrorKind),
    /// A 1553 message ran past the end of the packet body; only that
    /// message is discarded.
    TruncatedMessage { location: Location },
    /// A PCM minor frame ran past the end of the packet body; only that
    /// frame is discarded.
    TruncatedFrame { location: Location },
    /// Major-frame inconsistency, unknown mode combination, non-integer
    /// minor-frame count, or throughput length mismatch.
    PcmF1Error(String),
    /// Message count or word count exceeds the configured guard.
    CorruptPacket(String),
    /// Unknown `(src, fmt)` combination for an intra-packet timestamp.
    InvalidIntrapktTsSrc { src: u8, fmt: u8 },
    /// Too many consecutive resyncs within one chunk; the worker stops
    /// early and returns partial results.
    ParseAborted { location: Location },
    /// Cooperative cancellation observed at a packet boundary.
    Cancelled,
}

/// Sub-kinds of [`Ch10Error::HeaderError`].
#[derive(Debug)]
pub enum HeaderErrorKind {
    /// The 16-bit sync value `0xEB25` was not found before the chunk end
    /// (or the resync budget was exhausted).
    SyncNotFound { location: Location },
    /// Header or secondary-header checksum verification failed.
    ChecksumMismatch { location: Location, data_type: u8 },
    /// The dispatcher consumed a different byte count than
    /// `header.data_length` declared.
    BodyLengthMismatch {
        location: Location,
        expected: u32,
        actual: u32,
    },
}

impl Display for Ch10Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Ch10Error::ConfigError(msg) => write!(f, "configuration error: {msg}"),
            Ch10Error::InputError(msg) => write!(f, "input error: {msg}"),
            Ch10Error::HeaderError(kind) => write!(f, "header error: {kind}"),
            Ch10Error::TruncatedMessage { location } => {
                write!(f, "truncated 1553 message at offset {location}")
            }
            Ch10Error::TruncatedFrame { location } => {
                write!(f, "truncated PCM minor frame at offset {location}")
            }
            Ch10Error::PcmF1Error(msg) => write!(f, "PCM-F1 error: {msg}"),
            Ch10Error::CorruptPacket(msg) => write!(f, "corrupt packet: {msg}"),
            Ch10Error::InvalidIntrapktTsSrc { src, fmt } => {
                write!(f, "invalid intra-packet timestamp source/format: {src}/{fmt}")
            }
            Ch10Error::ParseAborted { location } => {
                write!(f, "parse aborted at offset {location} after repeated resync failures")
            }
            Ch10Error::Cancelled => write!(f, "parse cancelled"),
        }
    }
}

impl Display for HeaderErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HeaderErrorKind::SyncNotFound { location } => {
                write!(f, "sync pattern not found from offset {location}")
            }
            HeaderErrorKind::ChecksumMismatch { location, data_type } => {
                write!(f, "checksum mismatch at offset {location} (data_type {data_type:#x})")
            }
            HeaderErrorKind::BodyLengthMismatch {
                location,
                expected,
                actual,
            } => write!(
                f,
                "body length mismatch at offset {location}: expected {expected}, consumed {actual}"
            ),
        }
    }
}

impl std::error::Error for Ch10Error {}

/// [`std::result::Result`] alias that uses [`Ch10Error`].
pub type Result<T> = std::result::Result<T, Ch10Error>;

/// Outcome of parsing one packet: either fully handled, or a signal that
/// the manager's append pass must revisit it once the TDP anchor is known.
#[derive(Debug)]
pub enum Ch10Status {
    /// Packet (or message/frame within it) handled; body bytes consumed.
    Ok,
    /// A recoverable error was encountered and recorded; the remainder of
    /// the packet (or just the offending message/frame) was skipped.
    Recovered(Ch10Error),
    /// The packet could not be timestamped because the TDP anchor is not
    /// yet settled; the worker must defer it to the append pass.
    NeedsAppendPass,
}
