//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use meshlines::meshlines::json::JsonValue;
use meshlines::meshlines::lines::JsonLines;

/// Write one shard per entry of `shards`, each line one JSON record
pub fn write_dataset(location: &Path, shards: &[&[&str]]) {
    fs::create_dir_all(location).unwrap();
    for (rank, rows) in shards.iter().enumerate() {
        let mut content = String::new();
        for row in *rows {
            content.push_str(row);
            content.push('\n');
        }
        fs::write(JsonLines::shard_path(location, rank), content).unwrap();
    }
}

/// Collect every row of every shard under `location`
pub fn read_all_rows(location: &Path, ranks: usize) -> Vec<JsonValue> {
    let mut rows = Vec::new();
    for rank in 0..ranks {
        let lines = JsonLines::open_read_only(location, rank).unwrap();
        for index in 0..lines.local_len() {
            rows.push(lines.at(index).unwrap());
        }
    }
    rows
}

/// Canonical-text multiset of a row collection, for order-free comparison
pub fn row_multiset(rows: &[JsonValue]) -> Vec<String> {
    let mut texts: Vec<String> = rows.iter().map(JsonValue::to_text).collect();
    texts.sort();
    texts
}
