//! Integration tests for `ParseWorker`, grounded on the configuration
//! and sink-checking behavior exercised by `ParseWorkerTest` in
//! `examples/original_source/cpp/tests/src/parse_worker_u.cpp`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use ch10_parse::{Ch10PacketType, ParseWorker, RowSink, WorkerConfig};
use ch10_parse::header::{build_header_bytes, ChecksumMode};

fn memory_sink_factory(_ty: Ch10PacketType, _path: &Path) -> Box<dyn RowSink> {
    Box::new(ch10_parse::sink::MemorySink::new())
}

fn base_worker_config() -> WorkerConfig {
    let mut enabled_types = HashMap::new();
    enabled_types.insert(Ch10PacketType::MilStd1553F1, true);
    enabled_types.insert(Ch10PacketType::VideoF0, false);
    enabled_types.insert(Ch10PacketType::ComputerGeneratedF1, true);
    enabled_types.insert(Ch10PacketType::TimeF1, true);

    let mut output_paths = HashMap::new();
    output_paths.insert(Ch10PacketType::MilStd1553F1, PathBuf::from("/data/1553"));
    output_paths.insert(Ch10PacketType::ComputerGeneratedF1, PathBuf::from("/data/tmats"));
    output_paths.insert(Ch10PacketType::TimeF1, PathBuf::from("/data/time"));

    WorkerConfig {
        worker_index: 0,
        start_position: 0,
        read_size: 0,
        final_worker: false,
        append_mode: false,
        output_paths,
        enabled_types,
    }
}

fn time_f1_packet(channel_id: u16, day_bcd: u64) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_le_bytes()); // CSDW, discarded
    body.extend_from_slice(&day_bcd.to_le_bytes());

    let header = build_header_bytes(
        channel_id,
        (ch10_parse::header::HEADER_SIZE + body.len()) as u32,
        body.len() as u32,
        0,
        ChecksumMode::None,
        Ch10PacketType::TimeF1.data_type_byte(),
        0,
        0,
    );
    let mut bytes = header.to_vec();
    bytes.extend_from_slice(&body);
    bytes
}

#[test]
fn run_over_a_lone_time_f1_packet_seeds_tdp_and_reports_no_append_pass() {
    let mut cfg = base_worker_config();
    cfg.read_size = 0;
    let packet = time_f1_packet(3, 0x0000_0000_0000_0001);
    let cancel = Arc::new(AtomicBool::new(false));

    let mut worker = ParseWorker::new(cfg);
    let result = worker.run(&packet, &memory_sink_factory, None, &cancel);

    assert!(result.error.is_none());
    assert!(!result.cancelled);
    assert!(result.tdp_seed.is_some());
    assert!(!result.needs_append_pass);
    assert_eq!(result.last_position, packet.len() as u64);
}

#[test]
fn run_with_missing_sink_for_enabled_type_reports_error() {
    let mut cfg = base_worker_config();
    cfg.output_paths.remove(&Ch10PacketType::MilStd1553F1);
    let cancel = Arc::new(AtomicBool::new(false));

    let mut worker = ParseWorker::new(cfg);
    let result = worker.run(&[], &memory_sink_factory, None, &cancel);

    assert!(result.error.is_some());
}

#[test]
fn run_respects_cooperative_cancellation() {
    let cfg = base_worker_config();
    let cancel = Arc::new(AtomicBool::new(true));

    let mut worker = ParseWorker::new(cfg);
    let result = worker.run(&[], &memory_sink_factory, None, &cancel);

    assert!(result.cancelled);
}
