//! `ParseWorker`: drives one contiguous byte chunk through the
//! header/dispatcher loop, owns its [`Ch10Context`], and reports a
//! [`WorkerResult`] summary on completion. Grounded on
//! `examples/original_source/cpp/tests/src/parse_worker_u.cpp`'s
//! `ConfigureContext`/`ParseChunk` shape.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::config::{Ch10PacketType, WorkerConfig};
use crate::context::Ch10Context;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::element::ByteCursor;
use crate::error::{Ch10Error, Ch10Status, Result};
use crate::sink::RowSink;

/// Summary a worker reports back to the manager on completion.
pub struct WorkerResult {
    pub worker_index: usize,
    pub last_position: u64,
    pub needs_append_pass: bool,
    pub deferred_offsets: Vec<u64>,
    pub lru_addrs: HashMap<u16, std::collections::HashSet<u8>>,
    pub command_words: HashMap<u16, std::collections::HashSet<crate::context::CommandWordPair>>,
    pub min_video_timestamps: HashMap<u16, u64>,
    pub tmats_text: String,
    pub tdp_seed: Option<(u64, u64)>,
    pub error: Option<String>,
    pub cancelled: bool,
}

/// A function building one `RowSink` per enabled type for this worker,
/// supplied by the manager (which knows the output paths). Kept as a
/// trait object rather than a concrete sink type so the core never
/// depends on a storage backend.
pub type SinkFactory = dyn Fn(Ch10PacketType, &std::path::Path) -> Box<dyn RowSink> + Send + Sync;

pub struct ParseWorker {
    cfg: WorkerConfig,
}

impl ParseWorker {
    pub fn new(cfg: WorkerConfig) -> Self {
        Self { cfg }
    }

    /// Open one sink per enabled type at `cfg.output_paths`, failing if
    /// an enabled type has no configured path.
    fn open_sinks(
        &self,
        sink_factory: &SinkFactory,
    ) -> Result<HashMap<Ch10PacketType, Box<dyn RowSink>>> {
        let mut sinks = HashMap::new();
        for (ty, enabled) in &self.cfg.enabled_types {
            if !*enabled {
                continue;
            }
            let path = self.cfg.output_paths.get(ty).ok_or_else(|| {
                Ch10Error::ConfigError(format!("no output path configured for {ty:?}"))
            })?;
            let mut sink = sink_factory(*ty, path);
            sink.open(path)?;
            sinks.insert(*ty, sink);
        }
        Ok(sinks)
    }

    /// Run this worker over `chunk_bytes`, an immutable slice covering
    /// exactly this worker's assigned byte range of the input file.
    ///
    /// `initial_tdp` seeds the TDP anchor directly for append-pass
    /// workers, which already know it from the manager's Phase A merge.
    pub fn run(
        &mut self,
        chunk_bytes: &[u8],
        sink_factory: &SinkFactory,
        initial_tdp: Option<(u64, u64)>,
        cancel: &Arc<AtomicBool>,
    ) -> WorkerResult {
        let mut ctx = Ch10Context::new(self.cfg.worker_index, self.cfg.enabled_types.clone());
        ctx.initialize(self.cfg.start_position, self.cfg.worker_index);
        ctx.set_searching_for_tdp(!self.cfg.append_mode);
        if let Some((rtc, abs_ns)) = initial_tdp {
            ctx.seed_tdp(rtc, abs_ns);
        }

        let mut sinks = match self.open_sinks(sink_factory) {
            Ok(s) => s,
            Err(e) => {
                return WorkerResult {
                    worker_index: self.cfg.worker_index,
                    last_position: 0,
                    needs_append_pass: false,
                    deferred_offsets: Vec::new(),
                    lru_addrs: HashMap::new(),
                    command_words: HashMap::new(),
                    min_video_timestamps: HashMap::new(),
                    tmats_text: String::new(),
                    tdp_seed: None,
                    error: Some(e.to_string()),
                    cancelled: false,
                };
            }
        };

        if let Err(e) = ctx.check_configuration(&sinks) {
            return WorkerResult {
                worker_index: self.cfg.worker_index,
                last_position: 0,
                needs_append_pass: false,
                deferred_offsets: Vec::new(),
                lru_addrs: HashMap::new(),
                command_words: HashMap::new(),
                min_video_timestamps: HashMap::new(),
                tmats_text: String::new(),
                tdp_seed: None,
                error: Some(e.to_string()),
                cancelled: false,
            };
        }

        let mut cursor = ByteCursor::new(chunk_bytes);
        let mut dispatcher = Dispatcher::new();
        let mut last_position = 0u64;
        let mut needs_append_pass = false;
        let mut error_message = None;
        let mut cancelled = false;

        loop {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            match dispatcher.dispatch_one(&mut cursor, &mut ctx, &mut sinks) {
                Ok(DispatchOutcome::Processed { status, location }) => {
                    last_position = cursor.position();
                    match status {
                        Ch10Status::Ok => {}
                        Ch10Status::Recovered(err) => {
                            warn!("worker {}: recovered from {err} at {location}", self.cfg.worker_index);
                        }
                        Ch10Status::NeedsAppendPass => {
                            needs_append_pass = true;
                        }
                    }
                }
                Ok(DispatchOutcome::EndOfChunk { tail_start }) => {
                    last_position = tail_start;
                    break;
                }
                Err(e) => {
                    warn!("worker {}: aborting: {e}", self.cfg.worker_index);
                    error_message = Some(e.to_string());
                    break;
                }
            }
        }

        let mut teardown_error = None;
        for sink in sinks.values_mut() {
            if let Err(e) = sink.flush() {
                warn!("worker {}: sink flush failed: {e}", self.cfg.worker_index);
                teardown_error.get_or_insert(e.to_string());
            }
            if let Err(e) = sink.close() {
                warn!("worker {}: sink close failed: {e}", self.cfg.worker_index);
                teardown_error.get_or_insert(e.to_string());
            }
        }
        if error_message.is_none() {
            error_message = teardown_error;
        }

        info!(
            "worker {} finished at offset {last_position} (needs_append_pass={needs_append_pass})",
            self.cfg.worker_index
        );

        WorkerResult {
            worker_index: self.cfg.worker_index,
            last_position,
            needs_append_pass,
            deferred_offsets: ctx.deferred_packet_offsets().to_vec(),
            lru_addrs: ctx.lru_addrs().clone(),
            command_words: ctx.command_words().clone(),
            min_video_timestamps: ctx.min_video_timestamps().clone(),
            tmats_text: ctx.tmats_text().to_string(),
            tdp_seed: ctx.tdp_state().anchor(),
            error: error_message,
            cancelled,
        }
    }
}
