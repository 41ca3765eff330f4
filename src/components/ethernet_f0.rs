//! Ethernet Format-0: `CSDW(4B)` followed by a list of intra-packet
//! entries, each a 2-byte length prefix plus that many frame bytes.

use crate::context::Ch10Context;
use crate::element::ByteCursor;
use crate::error::{Ch10Error, Ch10Status, Result};
use crate::sink::{Column, RowSink};

pub struct EthernetF0Parser;

impl super::ComponentParser for EthernetF0Parser {
    fn parse(
        &self,
        cursor: &mut ByteCursor<'_>,
        ctx: &mut Ch10Context,
        sink: &mut dyn RowSink,
        packet_location: u64,
    ) -> Result<Ch10Status> {
        let _csdw = cursor.read_le_u32()?;

        if !ctx.tdp_state().is_settled() {
            ctx.defer_packet(packet_location);
            return Ok(Ch10Status::NeedsAppendPass);
        }

        let channel_id = ctx.current_channel_id;
        let mut frame_index = 0u32;
        while cursor.remaining() >= 2 {
            let len = cursor.read_le_u16()? as usize;
            if len > cursor.remaining() {
                return Ok(Ch10Status::Recovered(Ch10Error::TruncatedFrame {
                    location: cursor.position(),
                }));
            }
            let frame = cursor.read(len)?;
            let abs_time_ns = ctx
                .tdp_state()
                .ipts_to_abs_ns(ctx.current_header_rtc_ticks() * 100)?;

            sink.append_row(vec![
                ("channel_id", Column::U16(channel_id)),
                ("frame_index", Column::U32(frame_index)),
                ("abs_time_ns", Column::U64(abs_time_ns)),
                ("frame", Column::Bytes(frame.to_vec())),
            ])?;
            frame_index += 1;
        }

        Ok(Ch10Status::Ok)
    }
}
