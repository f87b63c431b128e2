//! Raw-record JSONL writer (spec §4.7, §6 "Raw records (JSONL)"), grounded
//! on `services/record_processor/raw_writer.py`'s append-only, per-processor
//! file convention: one writer per processor, no cross-processor locking,
//! file IO errors logged but never fatal.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use aiperf_core::error::Result;

/// Sanitizes a processor id into a filesystem-safe suffix: everything but
/// alphanumerics, `-`, and `_` becomes `_`.
pub fn safe_file_name(processor_id: &str) -> String {
    processor_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

pub struct RawRecordWriter {
    path: PathBuf,
}

impl RawRecordWriter {
    pub fn new(artifact_dir: &Path, processor_id: &str) -> Self {
        let path = artifact_dir.join(format!("raw_records_{}.jsonl", safe_file_name(processor_id)));
        Self { path }
    }

    /// Appends one `{ worker_id, processor_id, parsed_record, metrics }` line.
    /// Failures are logged and swallowed: raw-record persistence is a
    /// diagnostic convenience, not part of the aggregation critical path.
    pub async fn append(&self, entry: &Value) {
        if let Err(err) = self.try_append(entry).await {
            warn!(path = %self.path.display(), error = %err, "failed to append raw record");
        }
    }

    async fn try_append(&self, entry: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        file.write_all(&line).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_file_name_replaces_unsafe_characters() {
        assert_eq!(safe_file_name("proc/1:a"), "proc_1_a");
        assert_eq!(safe_file_name("proc-1_a"), "proc-1_a");
    }

    #[tokio::test]
    async fn append_writes_newline_terminated_json() {
        let dir = std::env::temp_dir().join(format!("aiperf-writer-test-{}", uuid_like()));
        let writer = RawRecordWriter::new(&dir, "proc-1");
        writer.append(&serde_json::json!({"a": 1})).await;
        writer.append(&serde_json::json!({"a": 2})).await;
        let contents = tokio::fs::read_to_string(&writer.path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"a":1}"#);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    fn uuid_like() -> u64 {
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos() as u64
    }
}
