//! Custom-file dataset construction (spec §4.4, §6 file formats), grounded
//! on `services/dataset/custom/file_input_retriever.py` and
//! `composer/custom.py`.
//!
//! A JSONL row becomes one [`Turn`]; rows are grouped into conversations by
//! `session_id` for `multi_turn`/`mooncake_trace` custom dataset types, or
//! treated as one conversation per row for `single_turn`. Directories are
//! read as the sorted union of their `*.jsonl` files, matching the
//! original's directory-glob ordering (`Path.glob` returns filesystem
//! order; sorting here makes iteration order config-reproducible across
//! platforms, spec §8: "identical configuration and seed must reproduce
//! the same order").

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use aiperf_core::config::CustomDatasetType;
use aiperf_core::error::{AiPerfError, Result};
use aiperf_core::model::{Conversation, Turn};

use crate::dataset::ScheduleEntry;
use crate::media;

/// One parsed JSONL line, prior to being folded into a `Turn`. Field names
/// match spec §6's "Recognized keys" table.
#[derive(Debug, Clone, Deserialize, Default)]
struct RawRow {
    text: Option<String>,
    text_input: Option<String>,
    image: Option<String>,
    #[serde(default)]
    hash_ids: Vec<u64>,
    input_length: Option<u32>,
    output_length: Option<u32>,
    timestamp: Option<f64>,
    delay: Option<f64>,
    session_id: Option<String>,
}

impl RawRow {
    fn into_turn(self, prefix_pool: &[String]) -> Result<Turn> {
        if self.text.is_some() && self.text_input.is_some() {
            return Err(AiPerfError::configuration(
                "each data entry must have only one of 'text_input' or 'text'",
            ));
        }
        let mut texts = Vec::new();
        if let Some(text) = self.text.or(self.text_input) {
            texts.push(text);
        }

        let mut images = Vec::new();
        if let Some(image) = self.image {
            images.push(media::embed_or_pass_through(&image)?);
        }

        // `hash_ids` selects a prefix-pool entry deterministically instead
        // of resampling (spec §4.4 supplemental detail).
        if let Some(hash_id) = self.hash_ids.first() {
            if let Some(prompt) = prefix_pool.get(*hash_id as usize % prefix_pool.len().max(1)) {
                if let Some(first) = texts.first_mut() {
                    *first = format!("{prompt} {first}");
                } else {
                    texts.push(prompt.clone());
                }
            }
        }

        Ok(Turn {
            texts,
            images,
            audios: Vec::new(),
            timestamp: self.timestamp,
            delay_ms: self.delay.unwrap_or(0.0),
            max_tokens: self.output_length,
            optional_data: HashMap::new(),
        })
    }
}

/// One line read from a custom JSONL dataset, grouped by the optional
/// `session_id` key into a `Conversation`.
pub struct CustomDataset {
    pub conversations: Vec<Conversation>,
}

impl CustomDataset {
    /// Reads `path` (a single `.jsonl` file or a directory of them) into
    /// conversations, grouping rows that share a `session_id` into turns of
    /// the same conversation when `dataset_type` is `multi_turn` or
    /// `mooncake_trace`. `single_turn` always produces one conversation per
    /// row, ignoring `session_id` grouping.
    pub fn load(path: &Path, dataset_type: CustomDatasetType, prefix_pool: &[String]) -> Result<Self> {
        let files = Self::collect_files(path)?;
        let mut rows: Vec<RawRow> = Vec::new();
        for file in files {
            rows.extend(Self::read_jsonl(&file)?);
        }

        let conversations = match dataset_type {
            CustomDatasetType::SingleTurn => rows
                .into_iter()
                .map(|row| {
                    let turn = row.into_turn(prefix_pool)?;
                    Ok(Conversation::new(vec![turn]))
                })
                .collect::<Result<Vec<_>>>()?,
            CustomDatasetType::MultiTurn | CustomDatasetType::MooncakeTrace => {
                Self::group_by_session(rows, prefix_pool)?
            }
        };

        if conversations.is_empty() {
            return Err(AiPerfError::configuration(format!(
                "no usable rows found in {}",
                path.display()
            )));
        }
        Ok(Self { conversations })
    }

    fn collect_files(path: &Path) -> Result<Vec<std::path::PathBuf>> {
        if path.is_dir() {
            let mut files: Vec<_> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("jsonl"))
                .collect();
            if files.is_empty() {
                return Err(AiPerfError::configuration(format!(
                    "no JSONL files found in directory '{}'",
                    path.display()
                )));
            }
            files.sort();
            Ok(files)
        } else {
            Ok(vec![path.to_path_buf()])
        }
    }

    fn read_jsonl(path: &Path) -> Result<Vec<RawRow>> {
        let contents = std::fs::read_to_string(path)?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<RawRow>(line).map_err(AiPerfError::from))
            .collect()
    }

    /// Groups rows sharing a `session_id` in first-seen order, preserving
    /// within-session row order as turn order; rows without a `session_id`
    /// each become a single-turn conversation of their own.
    fn group_by_session(rows: Vec<RawRow>, prefix_pool: &[String]) -> Result<Vec<Conversation>> {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<Turn>> = HashMap::new();
        let mut ungrouped: Vec<Conversation> = Vec::new();

        for row in rows {
            match row.session_id.clone() {
                Some(session_id) => {
                    let turn = row.into_turn(prefix_pool)?;
                    if !grouped.contains_key(&session_id) {
                        order.push(session_id.clone());
                    }
                    grouped.entry(session_id).or_default().push(turn);
                }
                None => {
                    let turn = row.into_turn(prefix_pool)?;
                    ungrouped.push(Conversation::new(vec![turn]));
                }
            }
        }

        let mut conversations: Vec<Conversation> = order
            .into_iter()
            .map(|session_id| {
                let turns = grouped.remove(&session_id).unwrap_or_default();
                Conversation::with_session_id(session_id, turns)
            })
            .collect();
        conversations.extend(ungrouped);
        Ok(conversations)
    }
}

/// Reads `(timestamp_ms, conversation_id)` pairs from a custom JSONL file
/// in ascending timestamp order for the timing manager's fixed-schedule
/// mode (spec §4.5). Rows without a `timestamp` are rejected: a
/// fixed-schedule trace is defined by having one.
pub fn load_fixed_schedule(path: &Path) -> Result<Vec<ScheduleEntry>> {
    let files = CustomDataset::collect_files(path)?;
    let mut entries = Vec::new();
    for file in files {
        for row in CustomDataset::read_jsonl(&file)? {
            let timestamp_ms = row.timestamp.ok_or_else(|| {
                AiPerfError::configuration(format!(
                    "fixed-schedule row in {} is missing a 'timestamp' field",
                    file.display()
                ))
            })?;
            entries.push(ScheduleEntry {
                timestamp_ms,
                delay_ms: row.delay.unwrap_or(0.0),
                session_id: row.session_id,
                should_cancel: false,
                cancel_after_ns: None,
            });
        }
    }
    entries.sort_by(|a, b| a.timestamp_ms.partial_cmp(&b.timestamp_ms).unwrap());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_jsonl(dir: &Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn single_turn_rows_become_independent_conversations() {
        let dir = std::env::temp_dir().join(format!("aiperf-custom-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = write_jsonl(
            &dir,
            "a.jsonl",
            &[r#"{"text": "hello"}"#, r#"{"text": "world"}"#],
        );
        let dataset = CustomDataset::load(&file, CustomDatasetType::SingleTurn, &[]).unwrap();
        assert_eq!(dataset.conversations.len(), 2);
        assert_eq!(dataset.conversations[0].turns[0].texts, vec!["hello".to_string()]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn text_and_text_input_together_is_rejected() {
        let row = RawRow {
            text: Some("a".into()),
            text_input: Some("b".into()),
            ..Default::default()
        };
        assert!(row.into_turn(&[]).is_err());
    }

    #[test]
    fn multi_turn_groups_by_session_id_in_order() {
        let dir = std::env::temp_dir().join(format!("aiperf-custom-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = write_jsonl(
            &dir,
            "b.jsonl",
            &[
                r#"{"text": "turn one", "session_id": "s1"}"#,
                r#"{"text": "turn one", "session_id": "s2"}"#,
                r#"{"text": "turn two", "session_id": "s1"}"#,
            ],
        );
        let dataset = CustomDataset::load(&file, CustomDatasetType::MultiTurn, &[]).unwrap();
        assert_eq!(dataset.conversations.len(), 2);
        assert_eq!(dataset.conversations[0].session_id, "s1");
        assert_eq!(dataset.conversations[0].turns.len(), 2);
        assert_eq!(dataset.conversations[1].turns.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn directory_reads_all_jsonl_files_in_sorted_order() {
        let dir = std::env::temp_dir().join(format!("aiperf-custom-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        write_jsonl(&dir, "z.jsonl", &[r#"{"text": "second file"}"#]);
        write_jsonl(&dir, "a.jsonl", &[r#"{"text": "first file"}"#]);
        let dataset = CustomDataset::load(&dir, CustomDatasetType::SingleTurn, &[]).unwrap();
        assert_eq!(dataset.conversations[0].turns[0].texts, vec!["first file".to_string()]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn fixed_schedule_sorts_by_timestamp_ascending() {
        let dir = std::env::temp_dir().join(format!("aiperf-custom-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = write_jsonl(
            &dir,
            "sched.jsonl",
            &[
                r#"{"timestamp": 200, "session_id": "late"}"#,
                r#"{"timestamp": 50, "session_id": "early"}"#,
            ],
        );
        let entries = load_fixed_schedule(&file).unwrap();
        assert_eq!(entries[0].session_id.as_deref(), Some("early"));
        assert_eq!(entries[1].session_id.as_deref(), Some("late"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
