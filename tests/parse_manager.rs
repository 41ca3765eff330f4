//! Integration tests for `ParseManager`, grounded on `ParseManagerTest`
//! in `examples/original_source/cpp/tests/src/parse_manager_u.cpp`
//! (TMATS extraction, channel-to-source/type maps) plus an end-to-end
//! run over synthetic packet bytes built with `header::build_header_bytes`.

use std::path::PathBuf;

use ch10_parse::header::{build_header_bytes, ChecksumMode, HEADER_SIZE};
use ch10_parse::{Ch10PacketType, ParseConfig, ParseManager};

fn time_f1_packet(channel_id: u16, day_bcd: u64) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&day_bcd.to_le_bytes());
    packet_bytes(channel_id, Ch10PacketType::TimeF1, &body)
}

fn tmats_packet(channel_id: u16, text: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(text.as_bytes());
    packet_bytes(channel_id, Ch10PacketType::ComputerGeneratedF1, &body)
}

fn packet_bytes(channel_id: u16, ty: Ch10PacketType, body: &[u8]) -> Vec<u8> {
    let header = build_header_bytes(
        channel_id,
        (HEADER_SIZE + body.len()) as u32,
        body.len() as u32,
        0,
        ChecksumMode::None,
        ty.data_type_byte(),
        0,
        0,
    );
    let mut bytes = header.to_vec();
    bytes.extend_from_slice(body);
    bytes
}

fn tmp_output_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ch10_parse_manager_test_{name}_{}", std::process::id()))
}

#[test]
fn start_workers_over_a_single_time_f1_packet_settles_tdp_with_no_pending_append() {
    let packet = time_f1_packet(5, 1);
    let config = ParseConfig::default();
    let out_dir = tmp_output_dir("time_only");
    let manager = ParseManager::new(config, out_dir, "run".to_string());

    let metadata = manager.start_workers(&packet).expect("parse should succeed");
    assert!(metadata.chanid_to_lru_addrs.is_empty());
    assert!(metadata.chanid_to_command_words.is_empty());
}

#[test]
fn process_tmats_with_no_text_does_not_write_a_file() {
    let config = ParseConfig::default();
    let out_dir = tmp_output_dir("no_tmats");
    let _ = std::fs::remove_dir_all(&out_dir);
    let manager = ParseManager::new(config, out_dir.clone(), "run".to_string());

    let mut metadata = manager
        .start_workers(&time_f1_packet(1, 1))
        .expect("parse should succeed");
    manager.process_tmats("", &mut metadata).unwrap();

    assert!(!out_dir.join("_TMATS.txt").exists());
}

#[test]
fn process_tmats_writes_file_and_parses_channel_maps() {
    let config = ParseConfig::default();
    let out_dir = tmp_output_dir("tmats_parsed");
    let _ = std::fs::remove_dir_all(&out_dir);
    let manager = ParseManager::new(config, out_dir.clone(), "run".to_string());

    let mut metadata = manager
        .start_workers(&time_f1_packet(1, 1))
        .expect("parse should succeed");

    let tmats_text = "R-1\\TK1-1:1;\nR-1\\DSI-1:Bus1;\nR-1\\CDT-1:type1;\n\
                       R-2\\TK1-2:2;\nR-2\\DSI-2:Bus2;\nR-2\\CDT-2:type2;\n";
    manager.process_tmats(tmats_text, &mut metadata).unwrap();

    assert!(out_dir.join("_TMATS.txt").exists());
    assert_eq!(std::fs::read_to_string(out_dir.join("_TMATS.txt")).unwrap(), tmats_text);
    assert_eq!(metadata.chanid_to_source.get(&1), Some(&"Bus1".to_string()));
    assert_eq!(metadata.chanid_to_source.get(&2), Some(&"Bus2".to_string()));
    assert_eq!(metadata.chanid_to_type.get(&1), Some(&"type1".to_string()));
    assert_eq!(metadata.chanid_to_type.get(&2), Some(&"type2".to_string()));

    let _ = std::fs::remove_dir_all(&out_dir);
}

#[test]
fn start_workers_parses_tmats_packet_captured_in_the_initial_pass() {
    let mut input = tmats_packet(9, "R-1\\TK1-1:1;\nR-1\\DSI-1:BusA;\nR-1\\CDT-1:typeA;\n");
    input.extend_from_slice(&time_f1_packet(1, 1));

    let config = ParseConfig::default();
    let out_dir = tmp_output_dir("tmats_in_stream");
    let manager = ParseManager::new(config, out_dir, "run".to_string());

    let metadata = manager.start_workers(&input).expect("parse should succeed");
    assert_eq!(metadata.chanid_to_source.get(&1), Some(&"BusA".to_string()));
    assert_eq!(metadata.chanid_to_type.get(&1), Some(&"typeA".to_string()));
}
