//! Memory-mapped JSON-lines datasets.
//!
//! A dataset is a directory of per-rank shard files, `shard-NNNNN.jsonl`,
//! each holding one JSON object per line. Reads map the shard into memory
//! and parse rows on demand; writable modes keep rows in memory and write
//! the whole shard back on [`JsonLines::flush`]. A rank only ever touches
//! its own shard.

pub mod filter;
pub mod handle;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use memmap2::Mmap;

use crate::meshlines::error::{MeshError, MeshResult};
use crate::meshlines::json::JsonValue;
use self::filter::{row_selected, RowPredicate};

#[derive(Debug)]
enum Backing {
    /// Read-only view over the mapped shard file; `None` when the shard
    /// file does not exist (the shard is empty)
    Mapped {
        map: Option<Mmap>,
        spans: Vec<(usize, usize)>,
    },
    /// Writable row storage, flushed back to the shard file on demand
    Memory(Vec<JsonValue>),
}

/// One rank's view of a distributed JSON-lines dataset
#[derive(Debug)]
pub struct JsonLines {
    location: PathBuf,
    rank: usize,
    backing: Backing,
    selection: Vec<RowPredicate>,
}

impl JsonLines {
    /// Shard file path for `rank` under a dataset directory
    pub fn shard_path(location: &Path, rank: usize) -> PathBuf {
        location.join(format!("shard-{:05}.jsonl", rank))
    }

    /// Open an existing dataset for reading
    ///
    /// The dataset directory must exist; a missing shard file for this
    /// rank opens as an empty shard, so a world may be wider than the
    /// dataset.
    pub fn open_read_only(location: &Path, rank: usize) -> MeshResult<Self> {
        if !location.is_dir() {
            return Err(MeshError::storage(
                location.display().to_string(),
                "dataset directory does not exist",
            ));
        }

        let shard = Self::shard_path(location, rank);
        let (map, spans) = if shard.is_file() {
            let file = File::open(&shard).map_err(|error| {
                MeshError::storage(shard.display().to_string(), error.to_string())
            })?;
            let length = file
                .metadata()
                .map_err(|error| MeshError::storage(shard.display().to_string(), error.to_string()))?
                .len();

            if length == 0 {
                (None, Vec::new())
            } else {
                let map = unsafe { Mmap::map(&file) }.map_err(|error| {
                    MeshError::storage(shard.display().to_string(), error.to_string())
                })?;
                let spans = scan_spans(&map);
                (Some(map), spans)
            }
        } else {
            (None, Vec::new())
        };

        Ok(JsonLines {
            location: location.to_path_buf(),
            rank,
            backing: Backing::Mapped { map, spans },
            selection: Vec::new(),
        })
    }

    /// Open an existing dataset with all rows loaded for modification
    pub fn open_read_write(location: &Path, rank: usize) -> MeshResult<Self> {
        let reader = Self::open_read_only(location, rank)?;
        let mut rows = Vec::with_capacity(reader.local_len());
        for index in 0..reader.local_len() {
            rows.push(reader.at(index)?);
        }

        Ok(JsonLines {
            location: reader.location,
            rank,
            backing: Backing::Memory(rows),
            selection: Vec::new(),
        })
    }

    /// Create an empty shard, truncating any previous content
    pub fn create_overwrite(location: &Path, rank: usize) -> MeshResult<Self> {
        fs::create_dir_all(location).map_err(|error| {
            MeshError::storage(location.display().to_string(), error.to_string())
        })?;

        let shard = Self::shard_path(location, rank);
        File::create(&shard)
            .map_err(|error| MeshError::storage(shard.display().to_string(), error.to_string()))?;

        Ok(JsonLines {
            location: location.to_path_buf(),
            rank,
            backing: Backing::Memory(Vec::new()),
            selection: Vec::new(),
        })
    }

    /// Remove every shard file under a dataset directory, creating the
    /// directory if needed. Called once (by rank 0) before a world
    /// recreates a dataset, so shards of a previously wider world cannot
    /// linger.
    pub fn clean_location(location: &Path) -> MeshResult<()> {
        fs::create_dir_all(location).map_err(|error| {
            MeshError::storage(location.display().to_string(), error.to_string())
        })?;

        let entries = fs::read_dir(location).map_err(|error| {
            MeshError::storage(location.display().to_string(), error.to_string())
        })?;
        for entry in entries {
            let entry = entry.map_err(|error| {
                MeshError::storage(location.display().to_string(), error.to_string())
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("shard-") && name.ends_with(".jsonl") {
                fs::remove_file(entry.path()).map_err(|error| {
                    MeshError::storage(location.display().to_string(), error.to_string())
                })?;
            }
        }
        Ok(())
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of rows in this rank's shard
    pub fn local_len(&self) -> usize {
        match &self.backing {
            Backing::Mapped { spans, .. } => spans.len(),
            Backing::Memory(rows) => rows.len(),
        }
    }

    /// Fetch one row by local index
    pub fn at(&self, index: usize) -> MeshResult<JsonValue> {
        match &self.backing {
            Backing::Mapped { map, spans } => {
                let (start, end) = *spans.get(index).ok_or_else(|| {
                    MeshError::internal(format!(
                        "row index {} out of range for shard of {} rows",
                        index,
                        spans.len()
                    ))
                })?;
                let map = map
                    .as_ref()
                    .ok_or_else(|| MeshError::internal("shard has spans but no mapping"))?;
                parse_row(&map[start..end], index)
            }
            Backing::Memory(rows) => rows.get(index).cloned().ok_or_else(|| {
                MeshError::internal(format!(
                    "row index {} out of range for shard of {} rows",
                    index,
                    rows.len()
                ))
            }),
        }
    }

    /// Append one row to this rank's shard
    pub fn append_local(&mut self, value: JsonValue) -> MeshResult<()> {
        match &mut self.backing {
            Backing::Memory(rows) => {
                rows.push(value);
                Ok(())
            }
            Backing::Mapped { .. } => Err(MeshError::storage(
                self.location.display().to_string(),
                "dataset is open read-only",
            )),
        }
    }

    /// Restrict subsequent scans to rows matching `predicates`
    pub fn select(&mut self, predicates: Vec<RowPredicate>) -> &mut Self {
        self.selection = predicates;
        self
    }

    /// Call `visit(rownum, fields)` for every selected row, in row order
    ///
    /// Every visited row must be a JSON object; anything else is a data
    /// shape error. Returns the number of rows visited.
    pub fn for_each_selected<F>(&self, mut visit: F) -> MeshResult<usize>
    where
        F: FnMut(usize, &IndexMap<String, JsonValue>) -> MeshResult<()>,
    {
        let mut visited = 0;
        for rownum in 0..self.local_len() {
            match &self.backing {
                Backing::Mapped { .. } => {
                    let row = self.at(rownum)?;
                    visited += self.visit_row(&row, rownum, &mut visit)?;
                }
                Backing::Memory(rows) => {
                    visited += self.visit_row(&rows[rownum], rownum, &mut visit)?;
                }
            }
        }
        Ok(visited)
    }

    fn visit_row<F>(&self, row: &JsonValue, rownum: usize, visit: &mut F) -> MeshResult<usize>
    where
        F: FnMut(usize, &IndexMap<String, JsonValue>) -> MeshResult<()>,
    {
        let fields = row.as_object().ok_or_else(|| {
            MeshError::data_shape(
                format!("expected a JSON object, found {}", row.type_name()),
                Some(rownum),
            )
        })?;

        if !row_selected(&self.selection, fields, rownum, self.rank) {
            return Ok(0);
        }

        visit(rownum, fields)?;
        Ok(1)
    }

    /// Number of selected rows in this rank's shard
    pub fn count_selected(&self) -> MeshResult<usize> {
        self.for_each_selected(|_, _| Ok(()))
    }

    /// Assign `value` to `column` of every selected row
    ///
    /// Requires a writable backing; returns how many rows were updated.
    pub fn set_field(&mut self, column: &str, value: &JsonValue) -> MeshResult<usize> {
        let selection = self.selection.clone();
        let rank = self.rank;

        let rows = match &mut self.backing {
            Backing::Memory(rows) => rows,
            Backing::Mapped { .. } => {
                return Err(MeshError::storage(
                    self.location.display().to_string(),
                    "dataset is open read-only",
                ))
            }
        };

        let mut updated = 0;
        for (rownum, row) in rows.iter_mut().enumerate() {
            let fields = row.as_object_mut().ok_or_else(|| {
                MeshError::data_shape("expected a JSON object".to_string(), Some(rownum))
            })?;

            if row_selected(&selection, fields, rownum, rank) {
                fields.insert(column.to_string(), value.clone());
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Write the shard back to its file and sync it
    ///
    /// A no-op for read-only datasets.
    pub fn flush(&self) -> MeshResult<()> {
        let rows = match &self.backing {
            Backing::Memory(rows) => rows,
            Backing::Mapped { .. } => return Ok(()),
        };

        let shard = Self::shard_path(&self.location, self.rank);
        let file = File::create(&shard)
            .map_err(|error| MeshError::storage(shard.display().to_string(), error.to_string()))?;
        let mut writer = BufWriter::new(&file);
        for row in rows {
            serde_json::to_writer(&mut writer, row).map_err(|error| {
                MeshError::storage(shard.display().to_string(), error.to_string())
            })?;
            writer.write_all(b"\n").map_err(|error| {
                MeshError::storage(shard.display().to_string(), error.to_string())
            })?;
        }
        writer
            .flush()
            .map_err(|error| MeshError::storage(shard.display().to_string(), error.to_string()))?;
        file.sync_all()
            .map_err(|error| MeshError::storage(shard.display().to_string(), error.to_string()))
    }
}

/// Byte ranges of the non-blank lines of a shard
fn scan_spans(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (position, byte) in bytes.iter().enumerate() {
        if *byte == b'\n' {
            push_span(&mut spans, bytes, start, position);
            start = position + 1;
        }
    }
    push_span(&mut spans, bytes, start, bytes.len());
    spans
}

fn push_span(spans: &mut Vec<(usize, usize)>, bytes: &[u8], start: usize, end: usize) {
    if bytes[start..end].iter().any(|byte| !byte.is_ascii_whitespace()) {
        spans.push((start, end));
    }
}

fn parse_row(bytes: &[u8], rownum: usize) -> MeshResult<JsonValue> {
    let text = std::str::from_utf8(bytes)
        .map_err(|error| MeshError::data_shape(error.to_string(), Some(rownum)))?;
    JsonValue::parse(text).map_err(|error| MeshError::data_shape(error.to_string(), Some(rownum)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_skip_blank_lines_and_trailing_newline() {
        let bytes = b"{\"a\":1}\n\n  \n{\"b\":2}\n";
        let spans = scan_spans(bytes);
        assert_eq!(spans.len(), 2);
        assert_eq!(&bytes[spans[0].0..spans[0].1], b"{\"a\":1}");
        assert_eq!(&bytes[spans[1].0..spans[1].1], b"{\"b\":2}");
    }

    #[test]
    fn spans_cover_a_file_without_final_newline() {
        let bytes = b"{\"a\":1}\n{\"b\":2}";
        let spans = scan_spans(bytes);
        assert_eq!(spans.len(), 2);
        assert_eq!(&bytes[spans[1].0..spans[1].1], b"{\"b\":2}");
    }
}
