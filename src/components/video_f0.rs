//! Video Format-0: `CSDW(4B)` declaring an MPEG-TS packet count,
//! followed by that many fixed 188-byte TS packets. Grounded on the
//! teacher's own 188-byte TS packet framing
//! (`examples/CirrusNeptune-mpegts-io/src/lib.rs`'s `TS_PACKET_SIZE`),
//! reused here for the container's payload rather than its own stream.

use crate::context::Ch10Context;
use crate::element::ByteCursor;
use crate::error::{Ch10Error, Ch10Status, Result};
use crate::sink::{Column, RowSink};

const TS_PACKET_SIZE: usize = 188;

pub struct VideoF0Parser;

impl super::ComponentParser for VideoF0Parser {
    fn parse(
        &self,
        cursor: &mut ByteCursor<'_>,
        ctx: &mut Ch10Context,
        sink: &mut dyn RowSink,
        packet_location: u64,
    ) -> Result<Ch10Status> {
        let csdw = cursor.read_le_u32()?;
        let ts_packet_count = csdw & 0x00FF_FFFF;

        if !ctx.tdp_state().is_settled() {
            ctx.defer_packet(packet_location);
            return Ok(Ch10Status::NeedsAppendPass);
        }
        let abs_time_ns = ctx
            .tdp_state()
            .ipts_to_abs_ns(ctx.current_header_rtc_ticks() * 100)?;

        let channel_id = ctx.current_channel_id;
        for ts_index in 0..ts_packet_count {
            if cursor.remaining() < TS_PACKET_SIZE {
                return Ok(Ch10Status::Recovered(Ch10Error::TruncatedFrame {
                    location: cursor.position(),
                }));
            }
            let ts_packet = cursor.read(TS_PACKET_SIZE)?;
            sink.append_row(vec![
                ("channel_id", Column::U16(channel_id)),
                ("ts_index", Column::U32(ts_index)),
                ("abs_time_ns", Column::U64(abs_time_ns)),
                ("ts_packet", Column::Bytes(ts_packet.to_vec())),
            ])?;
        }
        ctx.record_video_timestamp(channel_id, abs_time_ns);

        Ok(Ch10Status::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Ch10PacketType;
    use crate::sink::MemorySink;
    use std::collections::HashMap;

    #[test]
    fn emits_one_row_per_ts_packet_and_tracks_min_timestamp() {
        use super::super::ComponentParser;

        let mut body = Vec::new();
        body.extend_from_slice(&2u32.to_le_bytes());
        body.extend_from_slice(&[0xAAu8; TS_PACKET_SIZE]);
        body.extend_from_slice(&[0xBBu8; TS_PACKET_SIZE]);
        let mut cursor = ByteCursor::new(&body);

        let mut ctx = Ch10Context::new(0, HashMap::from([(Ch10PacketType::VideoF0, true)]));
        ctx.seed_tdp(0, 1_000);
        ctx.update_from_header(2, body.len() as u32, 0);
        let mut sink = MemorySink::new();

        let status = VideoF0Parser.parse(&mut cursor, &mut ctx, &mut sink, 0).unwrap();
        assert!(matches!(status, Ch10Status::Ok));
        assert_eq!(sink.rows().len(), 2);
        assert_eq!(ctx.min_video_timestamps()[&2], 1_000);
    }

    #[test]
    fn defers_when_tdp_not_settled() {
        use super::super::ComponentParser;

        let body = 0u32.to_le_bytes();
        let mut cursor = ByteCursor::new(&body);
        let mut ctx = Ch10Context::new(0, HashMap::from([(Ch10PacketType::VideoF0, true)]));
        let mut sink = MemorySink::new();

        let status = VideoF0Parser.parse(&mut cursor, &mut ctx, &mut sink, 42).unwrap();
        assert!(matches!(status, Ch10Status::NeedsAppendPass));
        assert_eq!(ctx.deferred_packet_offsets(), &[42]);
    }
}
