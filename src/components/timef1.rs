//! Time Data Packet (Time-F1): `CSDW(4B) ‖ packed-BCD time(8B)`. The
//! first successfully decoded Time-F1 packet in a worker seeds
//! [`crate::time::TdpState`]; later ones simply replace the anchor
//! (drift correction is out of scope, per `SPEC_FULL.md` §9).

use crate::context::Ch10Context;
use crate::element::ByteCursor;
use crate::error::{Ch10Status, Result};
use crate::sink::RowSink;
use crate::time::parse_irigb_day_of_year;

pub struct TimeF1Parser;

impl super::ComponentParser for TimeF1Parser {
    fn parse(
        &self,
        cursor: &mut ByteCursor<'_>,
        ctx: &mut Ch10Context,
        _sink: &mut dyn RowSink,
        _packet_location: u64,
    ) -> Result<Ch10Status> {
        let _csdw = cursor.read_le_u32()?;
        let bytes = cursor.read_array::<8>()?;
        let abs_ns = parse_irigb_day_of_year(&bytes);

        // Time-F1 carries no RTC pair of its own; the packet header's RTC
        // (already known to the dispatcher before this parser is invoked)
        // is the anchor tick count. Re-derive it from the header fields
        // recorded on the context by the dispatcher.
        ctx.seed_tdp(ctx.current_header_rtc_ticks(), abs_ns);

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
    fn seeds_tdp_state_from_packed_bcd() {
        use super::super::ComponentParser;

        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes());
        // day=1, hour=0, minute=0, second=0, millis=0
        body.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let mut cursor = ByteCursor::new(&body);

        let mut ctx = Ch10Context::new(0, HashMap::from([(Ch10PacketType::TimeF1, true)]));
        ctx.set_current_header_rtc_ticks(500);
        let mut sink = MemorySink::new();

        assert!(!ctx.tdp_state().is_settled());
        TimeF1Parser.parse(&mut cursor, &mut ctx, &mut sink, 0).unwrap();
        assert!(ctx.tdp_state().is_settled());
    }
}
