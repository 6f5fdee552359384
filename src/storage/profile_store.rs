use super::json_file::{read_json, write_json};
use crate::error_handling::types::StorageError;
use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A locally stored user profile. Fields the client does not know about survive a load/save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn new(name: &str, age: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            age,
            city: None,
            extra: Map::new(),
        }
    }
}

/// File name for a profile: lower-cased, only alphanumerics, spaces and underscores kept,
/// spaces turned into underscores.
pub fn safe_filename(name: &str) -> String {
    let stem: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();

    if stem.is_empty() {
        format!("unnamed_profile_{}.json", Utc::now().timestamp())
    } else {
        format!("{}.json", stem)
    }
}

/// One JSON file per user in a directory.
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(safe_filename(name))
    }

    pub fn save(&self, profile: &UserProfile) -> Result<PathBuf, StorageError> {
        if profile.name.trim().is_empty() {
            return Err(StorageError::InvalidName(String::from("profile has no name")));
        }
        let path = self.path_for(&profile.name);
        write_json(&path, profile)?;
        info!("Saved profile '{}' to {}", profile.name, path.display());
        Ok(path)
    }

    /// Every readable profile with a non-empty name. Bad files are skipped with a warning.
    pub fn load_all(&self) -> Vec<UserProfile> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!("Failed to read users dir {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        let mut profiles: Vec<UserProfile> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            })
            .filter_map(|path| match read_json::<UserProfile>(&path) {
                Ok(Some(profile)) if !profile.name.trim().is_empty() => Some(profile),
                Ok(_) => None,
                Err(_) => {
                    warn!("Skipping unreadable profile {}", path.display());
                    None
                }
            })
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }

    /// Removes the profile file. A missing file counts as removed.
    pub fn delete(&self, name: &str) -> Result<(), StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidName(String::from("empty profile name")));
        }
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted profile {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Failed to delete {}: {}", path.display(), e);
                Err(StorageError::WriteFailed)
            }
        }
    }
}
