//! Whole-file JSON persistence shared by the client-side stores.

use crate::error_handling::types::StorageError;
use log::error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Reads and decodes `path`. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            return Err(StorageError::ReadFailed);
        }
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&raw).map(Some).map_err(|e| {
        error!("Failed to decode {}: {}", path.display(), e);
        StorageError::ReadFailed
    })
}

/// Pretty-prints `value` into `path`, creating parent directories as needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            error!("Failed to create dir {}: {}", parent.display(), e);
            StorageError::WriteFailed
        })?;
    }
    let encoded = serde_json::to_string_pretty(value).map_err(|e| {
        error!("Failed to encode {}: {}", path.display(), e);
        StorageError::WriteFailed
    })?;
    fs::write(path, encoded).map_err(|e| {
        error!("Failed to write {}: {}", path.display(), e);
        StorageError::WriteFailed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[test]
    fn test_missing_and_empty_files_read_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        assert!(read_json::<Value>(&path).unwrap().is_none());

        fs::write(&path, "  \n").unwrap();
        assert!(read_json::<Value>(&path).unwrap().is_none());
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("data.json");
        write_json(&path, &json!({"a": 1})).unwrap();
        assert_eq!(read_json::<Value>(&path).unwrap(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_garbage_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_json::<Value>(&path), Err(StorageError::ReadFailed)));
    }
}
