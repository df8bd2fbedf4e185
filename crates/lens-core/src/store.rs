use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::StoreError;
use crate::types::TaskRecord;

/// Persistence seam for finished analysis runs.
pub trait TaskStore: Send + Sync {
    fn save(&self, record: &TaskRecord) -> Result<(), StoreError>;
    fn load(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;
}

/// One pretty-printed JSON file per task under a data directory.
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    data_dir: PathBuf,
}

impl JsonTaskStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn record_path(&self, task_id: &str) -> Option<PathBuf> {
        // Task IDs are opaque tokens, never path fragments.
        if task_id.is_empty() || task_id.contains(['/', '\\', '.']) {
            return None;
        }
        Some(self.data_dir.join(format!("{task_id}.json")))
    }
}

impl TaskStore for JsonTaskStore {
    fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let Some(path) = self.record_path(&record.task_id) else {
            return Err(StoreError::Io {
                reason: format!("invalid task id: {}", record.task_id),
            });
        };
        fs::create_dir_all(&self.data_dir).map_err(|err| StoreError::Io {
            reason: err.to_string(),
        })?;
        let body = serde_json::to_vec_pretty(record).map_err(|err| StoreError::Encode {
            reason: err.to_string(),
        })?;
        fs::write(path, body).map_err(|err| StoreError::Io {
            reason: err.to_string(),
        })
    }

    fn load(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let Some(path) = self.record_path(task_id) else {
            return Ok(None);
        };
        let body = match fs::read(path) {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::Io {
                    reason: err.to_string(),
                })
            }
        };
        let record = serde_json::from_slice(&body).map_err(|err| StoreError::Decode {
            reason: err.to_string(),
        })?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StageResult, StageResults};
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_record(task_id: &str) -> TaskRecord {
        TaskRecord {
            task_id: task_id.to_string(),
            repo_path: "/tmp/repo".to_string(),
            feature_scope: "login flow".to_string(),
            main_branch: "main".to_string(),
            feature_branch: "feature/login".to_string(),
            bundle_file: "repo_2026.txt".to_string(),
            uploaded_document: Some("files/abc".to_string()),
            results: StageResults::from_parts(
                StageResult::Parsed(json!({"summary": "ok"})),
                StageResult::Parsed(json!({"changes": []})),
                StageResult::Parsed(json!({"verdict": "ship"})),
                StageResult::Degraded {
                    error: "Failed to parse AI response as JSON".to_string(),
                    raw_response: "plain text".to_string(),
                },
            ),
            created_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path());
        let record = sample_record("task_01ABC");
        store.save(&record).unwrap();
        let loaded = store.load("task_01ABC").unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn unknown_task_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path());
        assert!(store.load("task_missing").unwrap().is_none());
    }

    #[test]
    fn path_like_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path());
        assert!(store.load("../escape").unwrap().is_none());
        assert!(store.load("a/b").unwrap().is_none());
    }
}
