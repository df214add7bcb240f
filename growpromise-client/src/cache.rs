use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::AppError;

/// Keyed store of last-known entity snapshots. Always possibly stale;
/// the authoritative state lives on the server.
#[derive(Debug)]
pub struct SnapshotCache {
    path: PathBuf,
    map: HashMap<String, Value>,
}

impl SnapshotCache {
    pub fn open(path: PathBuf) -> Result<Self, AppError> {
        let map = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| AppError::Cache(format!("parse {} failed: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(AppError::Cache(format!(
                    "read {} failed: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self { path, map })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn put(&mut self, key: &str, value: Value) -> Result<(), AppError> {
        self.map.insert(key.to_string(), value);
        self.persist()
    }

    fn persist(&self) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let data = serde_json::to_string_pretty(&self.map)
            .map_err(|e| AppError::Cache(format!("serialize cache failed: {e}")))?;
        std::fs::write(&self.path, data)
            .map_err(|e| AppError::Cache(format!("write {} failed: {e}", self.path.display())))
    }
}
