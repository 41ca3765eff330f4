//! `Ch10Context`: per-worker mutable state shared by every component
//! parser — current channel/packet framing, TDP time anchor, the
//! enabled-type map, and the metadata maps accumulated along the way.
//!
//! Grounded on `examples/original_source/cpp/tests/src/parse_worker_u.cpp`'s
//! `ConfigureContext`/`Initialize`/`SetSearchingForTDP` triad and on the
//! teacher's habit of keeping one mutable "current object" struct that
//! every `SpanObject` impl mutates in place.

use std::collections::{HashMap, HashSet};

use crate::config::Ch10PacketType;
use crate::error::{Ch10Error, Result};
use crate::time::TdpState;

/// Per-channel PCM geometry extracted from TMATS, used only by the
/// PCM-F1 component. Declared here (rather than in `components::pcmf1`)
/// because `Ch10Context` owns the channel-id-keyed map of these.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmTmatsData {
    pub bits_in_min_frame: u32,
    pub words_in_min_frame: u32,
    pub min_frames_in_maj_frame: u32,
    pub common_word_length: u32,
    pub min_frame_sync_pattern_len: u32,
}

/// A 1553 command word's addressing fields, retained per channel so a
/// later message on the same channel can be cross-checked or reported
/// alongside its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandWordPair {
    pub remote_terminal_addr: u8,
    pub subaddress: u8,
}

/// Per-worker mutable state threaded through header decode, dispatch,
/// and every component parser.
pub struct Ch10Context {
    worker_index: usize,
    searching_for_tdp: bool,

    /// Channel id of the packet currently being dispatched.
    pub current_channel_id: u16,
    /// Declared body-byte count of the current packet, decremented as
    /// component parsers consume it.
    pub packet_bytes_remaining: u32,
    /// RTC tick count from the current packet's header, combined from
    /// `rtc_low`/`rtc_high`. Time-F1 packets have no RTC pair of their
    /// own in the body, so they read this to seed the TDP anchor.
    current_header_rtc_ticks: u64,

    enabled_types: HashMap<Ch10PacketType, bool>,
    tdp_state: TdpState,

    chanid_to_lru_addrs: HashMap<u16, HashSet<u8>>,
    chanid_to_command_words: HashMap<u16, HashSet<CommandWordPair>>,
    chanid_to_min_video_ts: HashMap<u16, u64>,
    chanid_to_pcm_tmats: HashMap<u16, PcmTmatsData>,
    tmats_text: String,

    /// Packets observed while `searching_for_tdp` was true and which
    /// required `AbsTime`; their start offsets are handed back to the
    /// manager so the append pass can revisit them.
    deferred_packet_offsets: Vec<u64>,
}

impl Ch10Context {
    /// Build a context for `worker_index`, with a declared enabled-type
    /// map (the worker's copy of `ParseConfig::enabled_types()`).
    pub fn new(worker_index: usize, enabled_types: HashMap<Ch10PacketType, bool>) -> Self {
        Self {
            worker_index,
            searching_for_tdp: true,
            current_channel_id: 0,
            packet_bytes_remaining: 0,
            current_header_rtc_ticks: 0,
            enabled_types,
            tdp_state: TdpState::default(),
            chanid_to_lru_addrs: HashMap::new(),
            chanid_to_command_words: HashMap::new(),
            chanid_to_min_video_ts: HashMap::new(),
            chanid_to_pcm_tmats: HashMap::new(),
            tmats_text: String::new(),
            deferred_packet_offsets: Vec::new(),
        }
    }

    /// Reset per-chunk cursors and TDP state ahead of a (re-)run at
    /// `start_pos`. Accumulated metadata maps survive a re-initialize
    /// within the same worker; only framing/time state resets.
    pub fn initialize(&mut self, start_pos: u64, worker_index: usize) {
        self.worker_index = worker_index;
        self.current_channel_id = 0;
        self.packet_bytes_remaining = 0;
        self.tdp_state = TdpState::default();
        self.searching_for_tdp = true;
        self.deferred_packet_offsets.clear();
        let _ = start_pos; // recorded by the caller's WorkerConfig, not held here
    }

    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    /// When true, packets that need `AbsTime` and arrive before the TDP
    /// anchor settles are recorded as deferred rather than processed.
    pub fn set_searching_for_tdp(&mut self, searching: bool) {
        self.searching_for_tdp = searching;
    }

    pub fn is_searching_for_tdp(&self) -> bool {
        self.searching_for_tdp && !self.tdp_state.is_settled()
    }

    /// Record the current packet's channel id, body length, and header
    /// RTC tick count, ahead of dispatch.
    pub fn update_from_header(&mut self, channel_id: u16, data_length: u32, header_rtc_ticks: u64) {
        self.current_channel_id = channel_id;
        self.packet_bytes_remaining = data_length;
        self.current_header_rtc_ticks = header_rtc_ticks;
    }

    pub fn current_header_rtc_ticks(&self) -> u64 {
        self.current_header_rtc_ticks
    }

    #[cfg(test)]
    pub fn set_current_header_rtc_ticks(&mut self, ticks: u64) {
        self.current_header_rtc_ticks = ticks;
    }

    pub fn tdp_state(&self) -> &TdpState {
        &self.tdp_state
    }

    pub fn seed_tdp(&mut self, rtc_ticks: u64, abs_ns: u64) {
        self.tdp_state.seed(rtc_ticks, abs_ns);
    }

    /// Record that the packet starting at `offset` could not be
    /// timestamped yet and must be revisited in the append pass.
    pub fn defer_packet(&mut self, offset: u64) {
        self.deferred_packet_offsets.push(offset);
    }

    pub fn deferred_packet_offsets(&self) -> &[u64] {
        &self.deferred_packet_offsets
    }

    pub fn is_type_enabled(&self, ty: Ch10PacketType) -> bool {
        self.enabled_types.get(&ty).copied().unwrap_or(false)
    }

    /// Every enabled type must have a configured output sink (modeled
    /// here as the caller's `output_paths` map, since `Ch10Context`
    /// itself does not own sinks). Returns the list of enabled types
    /// missing a sink, empty when configuration is consistent.
    pub fn check_configuration<S>(&self, sinks: &HashMap<Ch10PacketType, S>) -> Result<()> {
        let missing: Vec<_> = self
            .enabled_types
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(ty, _)| *ty)
            .filter(|ty| !sinks.contains_key(ty))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Ch10Error::ConfigError(format!(
                "enabled packet types missing an output sink: {missing:?}"
            )))
        }
    }

    pub fn record_lru_addr(&mut self, channel_id: u16, lru_addr: u8) {
        self.chanid_to_lru_addrs
            .entry(channel_id)
            .or_default()
            .insert(lru_addr);
    }

    pub fn record_command_word(&mut self, channel_id: u16, pair: CommandWordPair) {
        self.chanid_to_command_words
            .entry(channel_id)
            .or_default()
            .insert(pair);
    }

    pub fn record_video_timestamp(&mut self, channel_id: u16, abs_ns: u64) {
        self.chanid_to_min_video_ts
            .entry(channel_id)
            .and_modify(|existing| *existing = (*existing).min(abs_ns))
            .or_insert(abs_ns);
    }

    pub fn set_pcm_tmats(&mut self, channel_id: u16, data: PcmTmatsData) {
        self.chanid_to_pcm_tmats.insert(channel_id, data);
    }

    pub fn pcm_tmats(&self, channel_id: u16) -> Option<&PcmTmatsData> {
        self.chanid_to_pcm_tmats.get(&channel_id)
    }

    /// Append raw TMATS/CDF-1 text observed on this worker. Survives a
    /// re-initialize, like the other accumulated metadata.
    pub fn append_tmats_text(&mut self, text: &str) {
        self.tmats_text.push_str(text);
    }

    pub fn tmats_text(&self) -> &str {
        &self.tmats_text
    }

    pub fn lru_addrs(&self) -> &HashMap<u16, HashSet<u8>> {
        &self.chanid_to_lru_addrs
    }

    pub fn command_words(&self) -> &HashMap<u16, HashSet<CommandWordPair>> {
        &self.chanid_to_command_words
    }

    pub fn min_video_timestamps(&self) -> &HashMap<u16, u64> {
        &self.chanid_to_min_video_ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_map() -> HashMap<Ch10PacketType, bool> {
        HashMap::from([
            (Ch10PacketType::MilStd1553F1, true),
            (Ch10PacketType::VideoF0, false),
        ])
    }

    #[test]
    fn is_searching_for_tdp_until_seeded() {
        let mut ctx = Ch10Context::new(0, enabled_map());
        assert!(ctx.is_searching_for_tdp());
        ctx.seed_tdp(1000, 2000);
        assert!(!ctx.is_searching_for_tdp());
    }

    #[test]
    fn check_configuration_flags_missing_sink() {
        let ctx = Ch10Context::new(0, enabled_map());
        let sinks: HashMap<Ch10PacketType, ()> = HashMap::new();
        assert!(ctx.check_configuration(&sinks).is_err());

        let sinks = HashMap::from([(Ch10PacketType::MilStd1553F1, ())]);
        assert!(ctx.check_configuration(&sinks).is_ok());
    }

    #[test]
    fn deferred_offsets_accumulate_and_clear_on_reinitialize() {
        let mut ctx = Ch10Context::new(0, enabled_map());
        ctx.defer_packet(100);
        ctx.defer_packet(250);
        assert_eq!(ctx.deferred_packet_offsets(), &[100, 250]);
        ctx.initialize(0, 0);
        assert!(ctx.deferred_packet_offsets().is_empty());
    }

    #[test]
    fn min_video_timestamp_tracks_minimum_per_channel() {
        let mut ctx = Ch10Context::new(0, enabled_map());
        ctx.record_video_timestamp(5, 2_000);
        ctx.record_video_timestamp(5, 500);
        ctx.record_video_timestamp(5, 1_500);
        assert_eq!(ctx.min_video_timestamps()[&5], 500);
    }

    #[test]
    fn lru_and_command_word_sets_dedupe() {
        let mut ctx = Ch10Context::new(0, enabled_map());
        ctx.record_lru_addr(3, 7);
        ctx.record_lru_addr(3, 7);
        ctx.record_lru_addr(3, 12);
        assert_eq!(ctx.lru_addrs()[&3].len(), 2);

        let pair = CommandWordPair {
            remote_terminal_addr: 7,
            subaddress: 1,
        };
        ctx.record_command_word(3, pair);
        ctx.record_command_word(3, pair);
        assert_eq!(ctx.command_words()[&3].len(), 1);
    }
}
