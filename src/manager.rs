//! `ParseManager`: partitions the input into chunks, spawns workers
//! under `parse_thread_count`, coordinates the initial/append two-phase
//! protocol, merges per-worker metadata, and extracts TMATS.
//!
//! Concurrency grounded in `SPEC_FULL.md` §5: `std::thread::JoinHandle`
//! + `std::sync::mpsc`, not rayon/crossbeam, because the manager needs
//! direct control over stagger/shift timing that a data-parallel
//! combinator would hide.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use log::warn;
use serde::Serialize;

use crate::components::tmats::parse_tmats_text;
use crate::config::{
    create_ch10_packet_output_dirs, create_ch10_packet_worker_file_names, Ch10PacketType,
    ParseConfig, WorkerConfig,
};
use crate::context::{CommandWordPair, PcmTmatsData};
use crate::error::{Ch10Error, Result};
use crate::sink::JsonlSink;
use crate::worker::{ParseWorker, SinkFactory, WorkerResult};

/// Final merged metadata document. Serialization to `_metadata.json` is
/// ambient (the `ch10parse` binary's job, via `serde_json`); the core
/// only builds the value.
#[derive(Debug, Serialize)]
pub struct RunMetadata {
    pub chanid_to_lru_addrs: HashMap<u16, Vec<u8>>,
    pub chanid_to_command_words: HashMap<u16, Vec<(u8, u8)>>,
    pub chanid_to_min_video_ts: HashMap<u16, u64>,
    pub tmats_text: String,
    pub chanid_to_source: HashMap<u16, String>,
    pub chanid_to_type: HashMap<u16, String>,
}

pub struct ParseManager {
    config: ParseConfig,
    base_dir: std::path::PathBuf,
    base_name: String,
    cancel: Arc<AtomicBool>,
}

impl ParseManager {
    pub fn new(config: ParseConfig, base_dir: std::path::PathBuf, base_name: String) -> Self {
        Self {
            config,
            base_dir,
            base_name,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// `worker_chunk_size = parse_chunk_bytes_MB * 1e6`;
    /// `worker_count = ceil(file_size / worker_chunk_size)`.
    fn allocate_resources(&self, file_size: u64) -> (u64, usize) {
        let chunk = self.config.worker_chunk_size_bytes().max(1);
        let count = file_size.div_ceil(chunk).max(1) as usize;
        (chunk, count)
    }

    fn build_worker_configs(&self, file_size: u64) -> Result<Vec<WorkerConfig>> {
        let (chunk_size, worker_count) = self.allocate_resources(file_size);
        let enabled = self.config.enabled_types();
        let dir_map = create_ch10_packet_output_dirs(&self.base_dir, &self.base_name, &enabled)?;
        let file_names = create_ch10_packet_worker_file_names(worker_count, &dir_map, "");

        let mut configs = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            let start_position = worker_index as u64 * chunk_size;
            let final_worker = worker_index + 1 == worker_count;
            let read_size = if final_worker {
                file_size - start_position
            } else {
                chunk_size
            };
            let output_paths = file_names
                .iter()
                .map(|(ty, paths)| (*ty, paths[worker_index].clone()))
                .collect();

            configs.push(WorkerConfig {
                worker_index,
                start_position,
                read_size,
                final_worker,
                append_mode: false,
                output_paths,
                enabled_types: enabled.clone(),
            });
        }
        Ok(configs)
    }

    /// Run a batch of workers, staggering starts by
    /// `worker_offset_wait_ms` and capping concurrency at
    /// `parse_thread_count`, joining with periodic polls every
    /// `worker_shift_wait_ms`.
    fn run_workers(
        &self,
        configs: Vec<WorkerConfig>,
        input: &[u8],
        sink_factory: &'static SinkFactory,
        tdp_seed: Option<(u64, u64)>,
    ) -> Vec<WorkerResult> {
        let (tx, rx) = mpsc::channel();
        let thread_count = self.config.parse_thread_count.max(1) as usize;
        let mut results = Vec::with_capacity(configs.len());

        for batch in configs.chunks(thread_count) {
            let mut handles = Vec::with_capacity(batch.len());
            for cfg in batch {
                let start = cfg.start_position as usize;
                let end = (start + cfg.read_size as usize).min(input.len());
                let chunk: Vec<u8> = input[start..end].to_vec();
                let cfg = WorkerConfig {
                    worker_index: cfg.worker_index,
                    start_position: cfg.start_position,
                    read_size: cfg.read_size,
                    final_worker: cfg.final_worker,
                    append_mode: cfg.append_mode,
                    output_paths: cfg.output_paths.clone(),
                    enabled_types: cfg.enabled_types.clone(),
                };
                let tx = tx.clone();
                let cancel = Arc::clone(&self.cancel);
                let handle = thread::spawn(move || {
                    let mut worker = ParseWorker::new(cfg);
                    let result = worker.run(&chunk, sink_factory, tdp_seed, &cancel);
                    let _ = tx.send(result);
                });
                handles.push(handle);
                thread::sleep(Duration::from_millis(self.config.worker_offset_wait_ms as u64));
            }

            while !handles.iter().all(|h| h.is_finished()) {
                thread::sleep(Duration::from_millis(self.config.worker_shift_wait_ms as u64));
            }
            for handle in handles {
                let _ = handle.join();
            }
        }
        drop(tx);
        while let Ok(result) = rx.try_recv() {
            results.push(result);
        }
        results.sort_by_key(|r| r.worker_index);
        results
    }

    /// Run both phases over `input` and return the merged metadata.
    pub fn start_workers(&self, input: &[u8]) -> Result<RunMetadata> {
        fn sink_factory(_ty: Ch10PacketType, _path: &std::path::Path) -> Box<dyn crate::sink::RowSink> {
            Box::new(JsonlSink::new())
        }
        static SINK_FACTORY: &SinkFactory = &sink_factory;

        let file_size = input.len() as u64;
        let configs = self.build_worker_configs(file_size)?;
        let initial_results = self.run_workers(configs.clone(), input, SINK_FACTORY, None);

        let tdp_seed = initial_results.iter().find_map(|r| r.tdp_seed);
        let needs_append: Vec<_> = initial_results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.needs_append_pass)
            .map(|(i, _)| i)
            .collect();

        let mut append_results = Vec::new();
        if !needs_append.is_empty() && tdp_seed.is_some() {
            let append_configs: Vec<_> = needs_append
                .iter()
                .map(|&i| {
                    let mut cfg = configs[i].clone_for_append();
                    cfg.start_position = initial_results[i].last_position;
                    cfg
                })
                .collect();
            append_results = self.run_workers(append_configs, input, SINK_FACTORY, tdp_seed);
        } else if !needs_append.is_empty() {
            warn!("packets deferred for append pass but no TDP anchor was ever found");
        }

        let tmats_text: String = initial_results
            .iter()
            .map(|r| r.tmats_text.as_str())
            .collect();

        let mut metadata =
            self.merge_metadata(&initial_results, &append_results, configs.len(), needs_append.len())?;
        self.process_tmats(&tmats_text, &mut metadata)?;
        Ok(metadata)
    }

    /// Merge per-worker metadata from both phases. `expected_initial`/
    /// `expected_append` are the worker counts each phase was launched
    /// with; a short result vector (a worker panicked without reporting
    /// back) fails the merge rather than silently under-counting.
    fn merge_metadata(
        &self,
        initial_results: &[WorkerResult],
        append_results: &[WorkerResult],
        expected_initial: usize,
        expected_append: usize,
    ) -> Result<RunMetadata> {
        if initial_results.len() != expected_initial {
            return Err(Ch10Error::ConfigError(format!(
                "initial pass launched {expected_initial} workers but only {} reported back",
                initial_results.len()
            )));
        }
        if append_results.len() != expected_append {
            return Err(Ch10Error::ConfigError(format!(
                "append pass launched {expected_append} workers but only {} reported back",
                append_results.len()
            )));
        }

        let mut lru: HashMap<u16, std::collections::HashSet<u8>> = HashMap::new();
        let mut cmd_words: HashMap<u16, std::collections::HashSet<CommandWordPair>> = HashMap::new();
        let mut min_video: HashMap<u16, u64> = HashMap::new();

        for r in initial_results.iter().chain(append_results.iter()) {
            for (chan, addrs) in &r.lru_addrs {
                lru.entry(*chan).or_default().extend(addrs.iter().copied());
            }
            for (chan, pairs) in &r.command_words {
                cmd_words.entry(*chan).or_default().extend(pairs.iter().copied());
            }
            for (chan, ts) in &r.min_video_timestamps {
                min_video
                    .entry(*chan)
                    .and_modify(|existing| *existing = (*existing).min(*ts))
                    .or_insert(*ts);
            }
        }

        Ok(RunMetadata {
            chanid_to_lru_addrs: lru.into_iter().map(|(k, v)| (k, v.into_iter().collect())).collect(),
            chanid_to_command_words: cmd_words
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().map(|p| (p.remote_terminal_addr, p.subaddress)).collect()))
                .collect(),
            chanid_to_min_video_ts: min_video,
            tmats_text: String::new(),
            chanid_to_source: HashMap::new(),
            chanid_to_type: HashMap::new(),
        })
    }

    /// Parse previously-captured TMATS text (the worker only captures
    /// raw bytes; this is where the field families and PCM geometry get
    /// extracted) and fold the results into `metadata`. Writes
    /// `<base>/_TMATS.txt` when `tmats_text` is non-empty.
    pub fn process_tmats(
        &self,
        tmats_text: &str,
        metadata: &mut RunMetadata,
    ) -> Result<HashMap<u16, PcmTmatsData>> {
        if !tmats_text.is_empty() {
            let path = self.base_dir.join("_TMATS.txt");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Ch10Error::InputError(e.to_string()))?;
            }
            std::fs::write(&path, tmats_text).map_err(|e| Ch10Error::InputError(e.to_string()))?;
        }
        let (fields, pcm) = parse_tmats_text(tmats_text);
        metadata.tmats_text = tmats_text.to_string();
        metadata.chanid_to_source = fields.chanid_to_source;
        metadata.chanid_to_type = fields.chanid_to_type;
        Ok(pcm)
    }
}

impl WorkerConfig {
    fn clone_for_append(&self) -> WorkerConfig {
        WorkerConfig {
            worker_index: self.worker_index,
            start_position: self.start_position,
            read_size: self.read_size,
            final_worker: self.final_worker,
            append_mode: true,
            output_paths: self.output_paths.clone(),
            enabled_types: self.enabled_types.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_resources_rounds_up_worker_count() {
        let mut cfg = ParseConfig::default();
        cfg.parse_chunk_bytes = 1; // 1 MB chunks
        let manager = ParseManager::new(cfg, std::path::PathBuf::from("/tmp/out"), "run".into());
        let (chunk, count) = manager.allocate_resources(2_500_000);
        assert_eq!(chunk, 1_000_000);
        assert_eq!(count, 3);
    }

    #[test]
    fn merge_metadata_unions_lru_addrs_across_workers() {
        let cfg = ParseConfig::default();
        let manager = ParseManager::new(cfg, std::path::PathBuf::from("/tmp/out"), "run".into());

        let mut r1 = make_result(0);
        r1.lru_addrs.insert(5, std::collections::HashSet::from([1, 2]));
        let mut r2 = make_result(1);
        r2.lru_addrs.insert(5, std::collections::HashSet::from([2, 3]));

        let merged = manager.merge_metadata(&[r1, r2], &[], 2, 0).unwrap();
        let mut addrs = merged.chanid_to_lru_addrs[&5].clone();
        addrs.sort();
        assert_eq!(addrs, vec![1, 2, 3]);
    }

    #[test]
    fn merge_metadata_rejects_short_result_vectors() {
        let cfg = ParseConfig::default();
        let manager = ParseManager::new(cfg, std::path::PathBuf::from("/tmp/out"), "run".into());

        let r1 = make_result(0);
        assert!(manager.merge_metadata(&[r1], &[], 2, 0).is_err());

        let r2 = make_result(0);
        let append = make_result(1);
        assert!(manager.merge_metadata(&[r2], &[append], 1, 2).is_err());
    }

    fn make_result(worker_index: usize) -> WorkerResult {
        WorkerResult {
            worker_index,
            last_position: 0,
            needs_append_pass: false,
            deferred_offsets: Vec::new(),
            lru_addrs: HashMap::new(),
            command_words: HashMap::new(),
            min_video_timestamps: HashMap::new(),
            tmats_text: String::new(),
            tdp_seed: None,
            error: None,
            cancelled: false,
        }
    }
}
