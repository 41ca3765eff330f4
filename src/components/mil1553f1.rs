//! MIL-STD-1553 Format-1 packet body: `CSDW(4B) ‖ { IPH(14B) ‖
//! payload } × message_count`.
//!
//! Grounded on `examples/original_source/cpp/parser_rewrite/include/ch10_1553f1_component.h`'s
//! `MilStd1553F1CSDWFmt`/`MilStd1553F1DataRTCTimeStampFmt` field layout
//! and `max_message_count_`/`max_byte_count_` guards.

use smallvec::SmallVec;

use crate::context::{Ch10Context, CommandWordPair};
use crate::element::ByteCursor;
use crate::error::{Ch10Error, Ch10Status, Result};
use crate::sink::{Column, RowSink};
use crate::time::combine_rtc;

/// Guard against a corrupt CSDW claiming an implausible message count.
const MAX_MESSAGE_COUNT: u32 = 10_000;

/// 32 payload words + 1 command word + up to 1 status word, two bytes
/// each.
const MAX_BYTE_COUNT: u32 = (32 + 1 + 1) * 2;

pub struct MilStd1553F1Parser;

struct CommandWord {
    remote_terminal_addr: u8,
    transmit: bool,
    subaddress: u8,
    word_count_or_mode_code: u8,
}

fn decode_command_word(word: u16) -> CommandWord {
    CommandWord {
        remote_terminal_addr: ((word >> 11) & 0x1F) as u8,
        transmit: (word >> 10) & 1 == 1,
        subaddress: ((word >> 5) & 0x1F) as u8,
        word_count_or_mode_code: (word & 0x1F) as u8,
    }
}

fn is_mode_code(cmd: &CommandWord) -> bool {
    cmd.subaddress == 0 || cmd.subaddress == 31
}

/// Mode codes 16-31 carry one data word; 0-15 carry none.
fn expected_payload_word_count(cmd: &CommandWord) -> u32 {
    if is_mode_code(cmd) {
        if cmd.word_count_or_mode_code >= 16 {
            1
        } else {
            0
        }
    } else if cmd.word_count_or_mode_code == 0 {
        32
    } else {
        cmd.word_count_or_mode_code as u32
    }
}

impl super::ComponentParser for MilStd1553F1Parser {
    fn parse(
        &self,
        cursor: &mut ByteCursor<'_>,
        ctx: &mut Ch10Context,
        sink: &mut dyn RowSink,
        packet_location: u64,
    ) -> Result<Ch10Status> {
        let message_count_and_ttb = cursor.read_le_u32()?;
        let message_count = message_count_and_ttb & 0x00FF_FFFF;
        let ttb = ((message_count_and_ttb >> 24) & 0b11) as u8;
        if message_count > MAX_MESSAGE_COUNT {
            return Err(Ch10Error::CorruptPacket(format!(
                "1553-F1 message_count {message_count} exceeds guard {MAX_MESSAGE_COUNT}"
            )));
        }

        let channel_id = ctx.current_channel_id;
        for msg_index in 0..message_count {
            let ts1 = cursor.read_le_u32()?;
            let ts2 = cursor.read_le_u32()?;
            let block_status = cursor.read_le_u16()?;
            let gap1 = cursor.read_u8()?;
            let gap2 = cursor.read_u8()?;
            let length = cursor.read_le_u16()? as u32;

            if !ctx.tdp_state().is_settled() {
                ctx.defer_packet(packet_location);
                return Ok(Ch10Status::NeedsAppendPass);
            }
            let abs_time_ns = ctx
                .tdp_state()
                .ipts_to_abs_ns(combine_rtc(ts1, ts2 & 0xFFFF) * 100)?;

            if length < 2 || (length as usize) > cursor.remaining() {
                ctx.defer_packet(packet_location);
                return Ok(Ch10Status::Recovered(Ch10Error::TruncatedMessage {
                    location: cursor.position(),
                }));
            }

            let mut message_cursor = cursor.sub_cursor(length as usize)?;
            let command_raw = message_cursor.read_le_u16()?;
            let cmd = decode_command_word(command_raw);
            let expected_words = expected_payload_word_count(&cmd)
                .min((MAX_BYTE_COUNT / 2).saturating_sub(2));

            let remaining_words = (message_cursor.remaining() / 2).saturating_sub(1) as u32;
            let calc_payload_word_count = remaining_words;
            let is_payload_incomplete = expected_words > calc_payload_word_count;
            let words_to_read = expected_words.min(calc_payload_word_count);

            // Every message's payload is capped at exactly 32 words by the
            // standard, so a stack-allocated buffer avoids a heap
            // allocation for the overwhelmingly common case.
            let mut payload: SmallVec<[u16; 32]> = SmallVec::with_capacity(32);
            for _ in 0..words_to_read {
                payload.push(message_cursor.read_le_u16()?);
            }
            let status_word = if message_cursor.remaining() >= 2 {
                message_cursor.read_le_u16().ok()
            } else {
                None
            };
            while payload.len() < 32 {
                payload.push(0);
            }
            let payload: Vec<u16> = payload.into_vec();

            ctx.record_lru_addr(channel_id, cmd.remote_terminal_addr);
            ctx.record_command_word(
                channel_id,
                CommandWordPair {
                    remote_terminal_addr: cmd.remote_terminal_addr,
                    subaddress: cmd.subaddress,
                },
            );

            sink.append_row(vec![
                ("channel_id", Column::U16(channel_id)),
                ("abs_time_ns", Column::U64(abs_time_ns)),
                ("ttb", Column::U8(ttb)),
                ("command_word", Column::U16(command_raw)),
                ("status_word", Column::U16(status_word.unwrap_or(0))),
                ("block_status", Column::U16(block_status)),
                ("gap1", Column::U8(gap1)),
                ("gap2", Column::U8(gap2)),
                ("payload", Column::U16Vec(payload)),
                ("payload_word_count", Column::U32(calc_payload_word_count)),
                ("is_incomplete", Column::Bool(is_payload_incomplete)),
                ("worker_index", Column::U32(ctx.worker_index() as u32)),
                ("msg_index", Column::U32(msg_index)),
            ])?;
        }

        Ok(Ch10Status::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_code_without_data_has_zero_expected_words() {
        let cmd = decode_command_word(0b00001_0_00000_00101);
        assert!(is_mode_code(&cmd));
        assert_eq!(expected_payload_word_count(&cmd), 0);
    }

    #[test]
    fn mode_code_with_data_has_one_expected_word() {
        let cmd = decode_command_word(0b00001_0_00000_10001);
        assert!(is_mode_code(&cmd));
        assert_eq!(expected_payload_word_count(&cmd), 1);
    }

    #[test]
    fn zero_word_count_field_means_32_words() {
        let cmd = decode_command_word(0b00001_0_00011_00000);
        assert!(!is_mode_code(&cmd));
        assert_eq!(expected_payload_word_count(&cmd), 32);
    }

    #[test]
    fn zero_message_count_produces_no_rows_and_no_error() {
        use crate::config::Ch10PacketType;
        use crate::sink::MemorySink;
        use std::collections::HashMap;

        let body = 0u32.to_le_bytes();
        let mut cursor = ByteCursor::new(&body);
        let mut ctx = Ch10Context::new(
            0,
            HashMap::from([(Ch10PacketType::MilStd1553F1, true)]),
        );
        ctx.update_from_header(1, 4, 0);
        let mut sink = MemorySink::new();

        use super::super::ComponentParser;
        let status = MilStd1553F1Parser.parse(&mut cursor, &mut ctx, &mut sink, 0).unwrap();
        assert!(matches!(status, Ch10Status::Ok));
        assert!(sink.rows().is_empty());
    }
}
