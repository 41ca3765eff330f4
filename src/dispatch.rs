//! The packet header/body state machine:
//! `SeekSync → HeaderRead → SecondaryHeaderRead? → ChecksumCheck →
//! Dispatch → BodyConsumed`, generalized from the teacher's
//! `MpegTsParser::parse_internal` resync loop
//! (`examples/CirrusNeptune-mpegts-io/src/lib.rs`) to Ch10's
//! variable-length, checksum-guarded packets.

use std::collections::HashMap;

use log::warn;

use crate::components::{parser_for_data_type, ComponentParser};
use crate::config::Ch10PacketType;
use crate::context::Ch10Context;
use crate::element::ByteCursor;
use crate::error::{Ch10Error, Ch10Status, HeaderErrorKind, Result};
use crate::header::{self, HEADER_SIZE, SECONDARY_HEADER_SIZE};
use crate::sink::RowSink;
use crate::time::combine_rtc;

/// Upper bound on consecutive failed resync attempts within one call
/// before giving up on the rest of the chunk.
const MAX_RESYNC_SCANS: usize = 1_000_000;

/// What happened when [`Dispatcher::dispatch_one`] was asked to process
/// the next packet.
pub enum DispatchOutcome {
    /// A packet was fully consumed; `location` is its header start.
    Processed { status: Ch10Status, location: u64 },
    /// Fewer than [`HEADER_SIZE`] bytes remain; `tail_start` is where the
    /// next worker (or the append pass) should resume.
    EndOfChunk { tail_start: u64 },
}

/// Per-worker resync bookkeeping: the last accepted sequence number per
/// channel, used by `SeekSync`'s consistency heuristic.
#[derive(Default)]
pub struct Dispatcher {
    last_sequence: HashMap<u16, u8>,
    deviation_streak: HashMap<u16, u8>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single deviation from the expected next sequence number (mod
    /// 256) is tolerated with a warning; two consecutive deviations on
    /// the same channel force a resync.
    fn sequence_is_plausible(&mut self, channel_id: u16, seq: u8) -> bool {
        let streak = self.deviation_streak.entry(channel_id).or_insert(0);
        match self.last_sequence.get(&channel_id) {
            None => {
                *streak = 0;
                true
            }
            Some(&prev) => {
                if seq == prev.wrapping_add(1) {
                    *streak = 0;
                    true
                } else {
                    *streak += 1;
                    if *streak >= 2 {
                        false
                    } else {
                        warn!("channel {channel_id}: sequence number jumped from {prev} to {seq}");
                        true
                    }
                }
            }
        }
    }

    fn accept_sequence(&mut self, channel_id: u16, seq: u8) {
        self.last_sequence.insert(channel_id, seq);
    }

    /// Process exactly one packet starting at the cursor's current
    /// position, resyncing past corrupt bytes as needed.
    pub fn dispatch_one(
        &mut self,
        cursor: &mut ByteCursor<'_>,
        ctx: &mut Ch10Context,
        sinks: &mut HashMap<Ch10PacketType, Box<dyn RowSink>>,
    ) -> Result<DispatchOutcome> {
        let mut scans = 0usize;
        loop {
            if cursor.remaining() < HEADER_SIZE {
                return Ok(DispatchOutcome::EndOfChunk {
                    tail_start: cursor.position(),
                });
            }
            let header_start = cursor.position();
            let candidate: [u8; HEADER_SIZE] = cursor.peek(HEADER_SIZE)?.try_into().unwrap();

            let decoded = match header::try_decode_header(&candidate, header_start) {
                Ok(Some(h)) => Some(h),
                Ok(None) => None,
                Err(Ch10Error::HeaderError(HeaderErrorKind::ChecksumMismatch { .. })) => None,
                Err(e) => return Err(e),
            };

            let header = match decoded {
                Some(h) if header::is_internally_consistent(&h) => h,
                _ => {
                    scans += 1;
                    if scans > MAX_RESYNC_SCANS {
                        return Err(Ch10Error::ParseAborted { location: header_start });
                    }
                    cursor.skip(1)?;
                    continue;
                }
            };

            if !self.sequence_is_plausible(header.channel_id, header.sequence_number) {
                scans += 1;
                if scans > MAX_RESYNC_SCANS {
                    return Err(Ch10Error::ParseAborted { location: header_start });
                }
                cursor.skip(1)?;
                continue;
            }
            self.accept_sequence(header.channel_id, header.sequence_number);

            cursor.skip(HEADER_SIZE)?;
            if header.secondary_header_present {
                let bytes: [u8; SECONDARY_HEADER_SIZE] = cursor.read_array::<SECONDARY_HEADER_SIZE>()?;
                if let Err(e) =
                    header::try_decode_secondary_header(&bytes, header.checksum_mode, header_start)
                {
                    warn!("secondary header checksum failed at {header_start}: {e}");
                }
            }

            let body_start = cursor.position();
            ctx.update_from_header(
                header.channel_id,
                header.data_length,
                combine_rtc(header.rtc_low, header.rtc_high as u32),
            );

            let status = match parser_for_data_type(header.data_type) {
                None => {
                    warn!(
                        "no parser registered for data_type {:#x} on channel {}",
                        header.data_type, header.channel_id
                    );
                    cursor.skip(header.data_length as usize)?;
                    Ch10Status::Ok
                }
                Some(parser) => {
                    let ty = Ch10PacketType::from_data_type_or_none(header.data_type);
                    let enabled = ty.map(|t| ctx.is_type_enabled(t)).unwrap_or(false);
                    if !enabled {
                        cursor.skip(header.data_length as usize)?;
                        Ch10Status::Ok
                    } else {
                        let mut body_cursor = cursor.sub_cursor(header.data_length as usize)?;
                        let sink = ty.and_then(|t| sinks.get_mut(&t));
                        match sink {
                            Some(sink) => {
                                parser.parse(&mut body_cursor, ctx, sink.as_mut(), header_start)?
                            }
                            None => {
                                warn!(
                                    "channel {} data_type {:#x} enabled but has no open sink",
                                    header.channel_id, header.data_type
                                );
                                Ch10Status::Ok
                            }
                        }
                    }
                }
            };

            let consumed = (cursor.position() - body_start) as u32;
            if consumed != header.data_length {
                warn!(
                    "body length mismatch at {header_start}: declared {}, consumed {consumed}",
                    header.data_length
                );
            }

            return Ok(DispatchOutcome::Processed {
                status,
                location: header_start,
            });
        }
    }
}

impl Ch10PacketType {
    fn from_data_type_or_none(data_type: u8) -> Option<Ch10PacketType> {
        [
            Ch10PacketType::ComputerGeneratedF1,
            Ch10PacketType::TimeF1,
            Ch10PacketType::MilStd1553F1,
            Ch10PacketType::PcmF1,
            Ch10PacketType::VideoF0,
            Ch10PacketType::EthernetF0,
        ]
        .into_iter()
        .find(|t| t.data_type_byte() == data_type)
    }
}
