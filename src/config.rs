//! Configuration types: the "recognized options set" of the external
//! interface, plus the per-worker parameters the manager derives from it.
//!
//! Loading these from a YAML file is explicitly out of scope (see
//! `SPEC_FULL.md` §1); callers build a [`ParseConfig`] however they like
//! and hand it to [`crate::manager::ParseManager`].

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Ch10Error, Result};

/// Ch10 packet data types the engine knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ch10PacketType {
    ComputerGeneratedF1,
    TimeF1,
    MilStd1553F1,
    PcmF1,
    VideoF0,
    EthernetF0,
}

impl Ch10PacketType {
    /// Canonical config-file name, matching the distilled spec's
    /// `convert_ch10_packet_type_map` examples (`MILSTD1553_FORMAT1`,
    /// `VIDEO_FORMAT0`, ...).
    pub fn config_name(&self) -> &'static str {
        match self {
            Ch10PacketType::ComputerGeneratedF1 => "COMPUTER_GENERATED_FORMAT1",
            Ch10PacketType::TimeF1 => "TIME_FORMAT1",
            Ch10PacketType::MilStd1553F1 => "MILSTD1553_FORMAT1",
            Ch10PacketType::PcmF1 => "PCM_FORMAT1",
            Ch10PacketType::VideoF0 => "VIDEO_FORMAT0",
            Ch10PacketType::EthernetF0 => "ETHERNET_FORMAT0",
        }
    }

    fn from_config_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COMPUTER_GENERATED_FORMAT1" => Some(Ch10PacketType::ComputerGeneratedF1),
            "TIME_FORMAT1" => Some(Ch10PacketType::TimeF1),
            "MILSTD1553_FORMAT1" => Some(Ch10PacketType::MilStd1553F1),
            "PCM_FORMAT1" => Some(Ch10PacketType::PcmF1),
            "VIDEO_FORMAT0" => Some(Ch10PacketType::VideoF0),
            "ETHERNET_FORMAT0" => Some(Ch10PacketType::EthernetF0),
            _ => None,
        }
    }

    /// Raw Ch10 `data_type` byte this logical type dispatches on.
    pub fn data_type_byte(&self) -> u8 {
        match self {
            Ch10PacketType::ComputerGeneratedF1 => 0x01,
            Ch10PacketType::TimeF1 => 0x11,
            Ch10PacketType::MilStd1553F1 => 0x19,
            Ch10PacketType::PcmF1 => 0x09,
            Ch10PacketType::VideoF0 => 0x40,
            Ch10PacketType::EthernetF0 => 0x68,
        }
    }

    /// Per-type on-disk directory/file suffix, used by
    /// `create_ch10_packet_output_dirs`/`create_ch10_packet_worker_file_names`.
    pub fn dir_suffix(&self) -> &'static str {
        match self {
            Ch10PacketType::ComputerGeneratedF1 => "_TMATS",
            Ch10PacketType::TimeF1 => "_time",
            Ch10PacketType::MilStd1553F1 => "_1553",
            Ch10PacketType::PcmF1 => "_pcm",
            Ch10PacketType::VideoF0 => "_video",
            Ch10PacketType::EthernetF0 => "_ethernet",
        }
    }

    /// The four types enabled by default per
    /// `Ch10Context::CreateDefaultPacketTypeConfig` in the original
    /// implementation: TMATS and Time-F1 are always needed to seed TDP
    /// state and are not user-configurable.
    pub fn always_enabled() -> &'static [Ch10PacketType] {
        &[Ch10PacketType::ComputerGeneratedF1, Ch10PacketType::TimeF1]
    }
}

/// Parse a `{string: string}` map into `{Ch10PacketType: bool}`.
///
/// Any unrecognized type name or non-boolean value fails the whole
/// conversion and returns an empty map, matching scenario 6 of the
/// distilled spec's testable properties.
pub fn convert_ch10_packet_type_map(
    raw: &HashMap<String, String>,
) -> Result<HashMap<Ch10PacketType, bool>> {
    let mut out = HashMap::with_capacity(raw.len());
    for (name, value) in raw {
        let ty = Ch10PacketType::from_config_name(name)
            .ok_or_else(|| Ch10Error::ConfigError(format!("unrecognized packet type: {name}")))?;
        let enabled = match value.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            other => {
                return Err(Ch10Error::ConfigError(format!(
                    "unrecognized boolean value for {name}: {other}"
                )))
            }
        };
        out.insert(ty, enabled);
    }
    Ok(out)
}

/// The recognized options set consumed by [`crate::manager::ParseManager`].
#[derive(Debug, Clone)]
pub struct ParseConfig {
    pub ch10_packet_type: HashMap<Ch10PacketType, bool>,
    pub parse_chunk_bytes: u64,
    pub parse_thread_count: u16,
    pub max_chunk_read_count: u32,
    pub worker_offset_wait_ms: u16,
    pub worker_shift_wait_ms: u16,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            ch10_packet_type: HashMap::new(),
            parse_chunk_bytes: 500,
            parse_thread_count: 4,
            max_chunk_read_count: 1000,
            worker_offset_wait_ms: 10,
            worker_shift_wait_ms: 50,
        }
    }
}

impl ParseConfig {
    /// Fully-resolved enabled-type map: user configuration plus the
    /// always-enabled TMATS/Time-F1 types.
    pub fn enabled_types(&self) -> HashMap<Ch10PacketType, bool> {
        let mut map = self.ch10_packet_type.clone();
        for ty in Ch10PacketType::always_enabled() {
            map.insert(*ty, true);
        }
        map
    }

    /// Worker chunk size in bytes (`parse_chunk_bytes` is specified in MB).
    pub fn worker_chunk_size_bytes(&self) -> u64 {
        self.parse_chunk_bytes * 1_000_000
    }
}

/// Compose per-type output directory paths:
/// `<base_dir>/<base_name><suffix>/`.
///
/// Every enabled type must have a suffix entry (all do, statically, via
/// [`Ch10PacketType::dir_suffix`]); an empty `base_dir` fails.
pub fn create_ch10_packet_output_dirs(
    base_dir: &std::path::Path,
    base_name: &str,
    enabled: &HashMap<Ch10PacketType, bool>,
) -> Result<HashMap<Ch10PacketType, PathBuf>> {
    if base_dir.as_os_str().is_empty() {
        return Err(Ch10Error::ConfigError("empty output base_dir".into()));
    }
    let mut out = HashMap::new();
    for (ty, is_enabled) in enabled {
        if !*is_enabled {
            continue;
        }
        let dir_name = format!("{base_name}{}", ty.dir_suffix());
        out.insert(*ty, base_dir.join(dir_name));
    }
    Ok(out)
}

/// Compose per-worker, per-type output file paths:
/// `<type_dir>/<type_dir_name>__NNN[.ext]`, with `NNN` a zero-padded
/// 3-digit worker index. An empty `ext` omits the leading dot.
pub fn create_ch10_packet_worker_file_names(
    worker_count: usize,
    dir_map: &HashMap<Ch10PacketType, PathBuf>,
    ext: &str,
) -> HashMap<Ch10PacketType, Vec<PathBuf>> {
    let mut out = HashMap::with_capacity(dir_map.len());
    for (ty, dir) in dir_map {
        let dir_name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let mut paths = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            let suffix = if ext.is_empty() {
                String::new()
            } else {
                format!(".{ext}")
            };
            paths.push(dir.join(format!("{dir_name}__{worker_index:03}{suffix}")));
        }
        out.insert(*ty, paths);
    }
    out
}

/// Immutable per-worker parameters, assigned by
/// [`crate::manager::ParseManager`] during the initial pass (or the
/// append pass, where `append_mode` is true and `start_position` is the
/// initial pass's `last_position`).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_index: usize,
    pub start_position: u64,
    pub read_size: u64,
    pub final_worker: bool,
    pub append_mode: bool,
    pub output_paths: HashMap<Ch10PacketType, PathBuf>,
    pub enabled_types: HashMap<Ch10PacketType, bool>,
}
