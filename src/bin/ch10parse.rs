//! Minimal smoke-test entry point: `ch10parse <input.ch10> <output_dir>`.
//!
//! Mirrors the teacher's `examples/dump.rs` role -- open a file, run
//! the parser, print a summary -- generalized from one MPEG-TS file to
//! a full two-phase Ch10 parse run. No CLI-parsing crate and no YAML
//! config loading: both are named Non-goals, so this binary builds a
//! `ParseConfig` with defaults and takes its two paths positionally.

use std::time::Instant;

use ch10_parse::{Ch10Error, ParseConfig, ParseManager};

fn main() {
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let input_path = match args.next() {
        Some(p) => p,
        None => {
            eprintln!("usage: ch10parse <input.ch10> <output_dir>");
            std::process::exit(1);
        }
    };
    let output_dir = match args.next() {
        Some(p) => p,
        None => {
            eprintln!("usage: ch10parse <input.ch10> <output_dir>");
            std::process::exit(1);
        }
    };

    let file = match std::fs::File::open(&input_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("cannot open {input_path}: {e}");
            std::process::exit(1);
        }
    };
    let mmap = match unsafe { memmap2::Mmap::map(&file) } {
        Ok(m) => m,
        Err(e) => {
            eprintln!("cannot memory-map {input_path}: {e}");
            std::process::exit(1);
        }
    };

    let base_name = std::path::Path::new(&input_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("run")
        .to_string();

    let config = ParseConfig::default();
    let manager = ParseManager::new(config, std::path::PathBuf::from(&output_dir), base_name);

    let start = Instant::now();
    let metadata = match manager.start_workers(&mmap) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("parse failed: {e}");
            let code = match e {
                Ch10Error::ConfigError(_) | Ch10Error::InputError(_) => 1,
                _ => 2,
            };
            std::process::exit(code);
        }
    };
    let elapsed = start.elapsed();

    let metadata_path = std::path::Path::new(&output_dir).join("_metadata.json");
    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        eprintln!("cannot create output dir {output_dir}: {e}");
        std::process::exit(1);
    }
    match serde_json::to_string_pretty(&metadata) {
        Ok(json) => {
            if let Err(e) = std::fs::write(&metadata_path, json) {
                eprintln!("cannot write {}: {e}", metadata_path.display());
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("cannot serialize metadata: {e}");
            std::process::exit(2);
        }
    }

    println!(
        "parsed {input_path} in {:.3}s, metadata written to {}",
        elapsed.as_secs_f64(),
        metadata_path.display()
    );
}
