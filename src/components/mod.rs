//! One module per supported Ch10 `data_type`, dispatched by
//! [`crate::dispatch`].
//!
//! The dispatch surface is a small `enum_dispatch`-based trait object,
//! mirroring the teacher's `SpanObject`/`PayloadUnitObject` fan-out
//! (`examples/CirrusNeptune-mpegts-io/src/span.rs`,
//! `examples/CirrusNeptune-mpegts-io/src/payload_unit.rs`) generalized
//! from MPEG-TS payload kinds to Ch10 packet data types.

pub mod ethernet_f0;
pub mod mil1553f1;
pub mod pcmf1;
pub mod timef1;
pub mod tmats;
pub mod video_f0;

use enum_dispatch::enum_dispatch;

use crate::context::Ch10Context;
use crate::element::ByteCursor;
use crate::error::{Ch10Status, Result};
use crate::sink::RowSink;

/// Common shape every component parser implements: consume exactly the
/// packet body from `cursor`, mutate `ctx`'s metadata maps, and emit
/// rows to `sink`.
#[enum_dispatch]
pub trait ComponentParser {
    fn parse(
        &self,
        cursor: &mut ByteCursor<'_>,
        ctx: &mut Ch10Context,
        sink: &mut dyn RowSink,
        packet_location: u64,
    ) -> Result<Ch10Status>;
}

#[enum_dispatch(ComponentParser)]
pub enum ComponentParserImpl {
    MilStd1553F1(mil1553f1::MilStd1553F1Parser),
    PcmF1(pcmf1::PcmF1Parser),
    Tmats(tmats::TmatsParser),
    TimeF1(timef1::TimeF1Parser),
    VideoF0(video_f0::VideoF0Parser),
    EthernetF0(ethernet_f0::EthernetF0Parser),
}

/// Select the parser implementation for a Ch10 `data_type` byte, or
/// `None` if no parser is registered for it (the dispatcher then skips
/// the packet body with a warning, per the distilled spec's `Dispatch`
/// transition).
pub fn parser_for_data_type(data_type: u8) -> Option<ComponentParserImpl> {
    use crate::config::Ch10PacketType::*;
    let ty = [
        MilStd1553F1,
        PcmF1,
        ComputerGeneratedF1,
        TimeF1,
        VideoF0,
        EthernetF0,
    ]
    .into_iter()
    .find(|t| t.data_type_byte() == data_type)?;

    Some(match ty {
        MilStd1553F1 => ComponentParserImpl::MilStd1553F1(mil1553f1::MilStd1553F1Parser),
        PcmF1 => ComponentParserImpl::PcmF1(pcmf1::PcmF1Parser),
        ComputerGeneratedF1 => ComponentParserImpl::Tmats(tmats::TmatsParser),
        TimeF1 => ComponentParserImpl::TimeF1(timef1::TimeF1Parser),
        VideoF0 => ComponentParserImpl::VideoF0(video_f0::VideoF0Parser),
        EthernetF0 => ComponentParserImpl::EthernetF0(ethernet_f0::EthernetF0Parser),
    })
}
