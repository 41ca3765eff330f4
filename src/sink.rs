//! The abstract row-output contract. A column-store file writer
//! (Parquet, CSV) is a named Non-goal and lives outside this crate, but
//! `start_workers`' default sink still has to land rows on disk at the
//! paths `create_ch10_packet_worker_file_names` computes -- [`JsonlSink`]
//! is that default: one JSON object per row, newline-delimited, using
//! the `serde_json` this crate already carries for `_metadata.json`.

use std::io::Write;

use crate::error::{Ch10Error, Result};

/// One emitted row's columns, type-erased the way the distilled spec's
/// `append_row(columns)` describes it. Component parsers build these;
/// concrete `RowSink` implementations decide how to encode them.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bool(bool),
    Bytes(Vec<u8>),
    U16Vec(Vec<u16>),
    U32Vec(Vec<u32>),
}

/// A named row: the column list in emission order, paired with the
/// field names a concrete sink needs to write a schema once.
pub type Row = Vec<(&'static str, Column)>;

/// Abstract output interface a [`crate::worker::ParseWorker`] writes
/// through. A worker calls `open` at most once per (type, worker
/// index); `append_row` is always single-threaded per handle;
/// `close` must be safe to call more than once.
pub trait RowSink {
    fn open(&mut self, path: &std::path::Path) -> Result<()>;
    fn append_row(&mut self, row: Row) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// An in-memory `RowSink` used by tests and by the `ch10parse` binary's
/// smoke-test mode. Rows are kept verbatim rather than encoded.
#[derive(Debug, Default)]
pub struct MemorySink {
    opened_path: Option<std::path::PathBuf>,
    rows: Vec<Row>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl RowSink for MemorySink {
    fn open(&mut self, path: &std::path::Path) -> Result<()> {
        self.opened_path = Some(path.to_path_buf());
        self.closed = false;
        Ok(())
    }

    fn append_row(&mut self, row: Row) -> Result<()> {
        self.rows.push(row);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

fn column_to_json(column: &Column) -> serde_json::Value {
    match column {
        Column::U8(v) => (*v).into(),
        Column::U16(v) => (*v).into(),
        Column::U32(v) => (*v).into(),
        Column::U64(v) => (*v).into(),
        Column::Bool(v) => (*v).into(),
        Column::Bytes(v) => serde_json::Value::String(String::from_utf8_lossy(v).into_owned()),
        Column::U16Vec(v) => v.iter().copied().collect(),
        Column::U32Vec(v) => v.iter().copied().collect(),
    }
}

/// The default `RowSink`: one row per line, each column keyed by name,
/// written as it arrives rather than buffered in memory.
#[derive(Debug, Default)]
pub struct JsonlSink {
    file: Option<std::fs::File>,
}

impl JsonlSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowSink for JsonlSink {
    fn open(&mut self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Ch10Error::InputError(e.to_string()))?;
        }
        let file = std::fs::File::create(path).map_err(|e| Ch10Error::InputError(e.to_string()))?;
        self.file = Some(file);
        Ok(())
    }

    fn append_row(&mut self, row: Row) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Ch10Error::ConfigError("append_row called before open".into()))?;
        let map: serde_json::Map<String, serde_json::Value> = row
            .into_iter()
            .map(|(name, value)| (name.to_string(), column_to_json(&value)))
            .collect();
        let line = serde_json::to_string(&map).map_err(|e| Ch10Error::InputError(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| Ch10Error::InputError(e.to_string()))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().map_err(|e| Ch10Error::InputError(e.to_string()))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_sink_writes_one_json_line_per_row() {
        let dir = std::env::temp_dir().join(format!("ch10_parse_jsonl_sink_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("rows.jsonl");

        let mut sink = JsonlSink::new();
        sink.open(&path).unwrap();
        sink.append_row(vec![("channel_id", Column::U16(3)), ("ok", Column::Bool(true))])
            .unwrap();
        sink.append_row(vec![("channel_id", Column::U16(4))]).unwrap();
        sink.flush().unwrap();
        sink.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["channel_id"], 3);
        assert_eq!(first["ok"], true);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn memory_sink_accumulates_rows_in_order() {
        let mut sink = MemorySink::new();
        sink.open(std::path::Path::new("/tmp/out")).unwrap();
        sink.append_row(vec![("channel_id", Column::U16(3))]).unwrap();
        sink.append_row(vec![("channel_id", Column::U16(4))]).unwrap();
        assert_eq!(sink.rows().len(), 2);
        sink.close().unwrap();
        sink.close().unwrap();
    }
}
