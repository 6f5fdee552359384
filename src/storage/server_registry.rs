use super::json_file::{read_json, write_json};
use crate::configuration::ServerEndpoint;
use crate::error_handling::types::StorageError;
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_NAME: &str = "default";

/// Named server endpoints known to the client, persisted as one JSON object.
#[derive(Debug)]
pub struct ServerRegistry {
    path: PathBuf,
    servers: BTreeMap<String, ServerEndpoint>,
}

impl ServerRegistry {
    /// Loads the registry. A missing, empty or unreadable file yields a single
    /// [`DEFAULT_SERVER_NAME`] entry, written back when possible.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let servers = match read_json::<BTreeMap<String, ServerEndpoint>>(&path) {
            Ok(Some(servers)) if !servers.is_empty() => servers,
            Ok(_) => {
                info!("No servers in {}, using the default entry", path.display());
                Self::default_servers()
            }
            Err(_) => {
                warn!("Unreadable servers file {}, using the default entry", path.display());
                Self::default_servers()
            }
        };

        let registry = Self { path, servers };
        if registry.servers.len() == 1 && registry.servers.contains_key(DEFAULT_SERVER_NAME) {
            // Best effort: the registry stays usable in memory
            let _ = registry.save();
        }
        registry
    }

    fn default_servers() -> BTreeMap<String, ServerEndpoint> {
        BTreeMap::from([(String::from(DEFAULT_SERVER_NAME), ServerEndpoint::default())])
    }

    pub fn save(&self) -> Result<(), StorageError> {
        write_json(&self.path, &self.servers)
    }

    /// Writes `servers` and only then adopts them, so a failed write leaves memory untouched.
    fn commit(&mut self, servers: BTreeMap<String, ServerEndpoint>) -> Result<(), StorageError> {
        write_json(&self.path, &servers)?;
        self.servers = servers;
        Ok(())
    }

    /// Adds a server and persists the registry. Existing names are not overwritten.
    pub fn add(&mut self, name: &str, endpoint: ServerEndpoint) -> Result<(), StorageError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StorageError::InvalidName(String::from("empty server name")));
        }
        if self.servers.contains_key(name) {
            return Err(StorageError::InvalidName(format!("server '{}' already exists", name)));
        }
        let mut servers = self.servers.clone();
        servers.insert(name.to_string(), endpoint);
        self.commit(servers)
    }

    /// Removes a server and persists the registry. Returns the removed endpoint.
    pub fn remove(&mut self, name: &str) -> Result<Option<ServerEndpoint>, StorageError> {
        let mut servers = self.servers.clone();
        let removed = servers.remove(name);
        if removed.is_some() {
            self.commit(servers)?;
        }
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Option<&ServerEndpoint> {
        self.servers.get(name)
    }

    pub fn first_name(&self) -> Option<&str> {
        self.servers.keys().next().map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_default_and_is_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servers_config.json");
        let registry = ServerRegistry::load(&path);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(DEFAULT_SERVER_NAME), Some(&ServerEndpoint::default()));
        assert!(path.exists());
    }

    #[test]
    fn test_garbage_and_empty_object_fall_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servers_config.json");
        fs::write(&path, "[oops").unwrap();
        assert_eq!(ServerRegistry::load(&path).first_name(), Some(DEFAULT_SERVER_NAME));

        fs::write(&path, "{}").unwrap();
        assert_eq!(ServerRegistry::load(&path).len(), 1);
    }

    #[test]
    fn test_add_remove_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servers_config.json");
        let mut registry = ServerRegistry::load(&path);
        registry
            .add("lab", ServerEndpoint::with_defaults("10.0.0.5", 6000, None, None))
            .unwrap();
        assert!(registry.add("lab", ServerEndpoint::default()).is_err());

        let reloaded = ServerRegistry::load(&path);
        assert_eq!(reloaded.get("lab").map(|e| e.ws_port), Some(9765));

        assert!(registry.remove("lab").unwrap().is_some());
        assert!(registry.remove("lab").unwrap().is_none());
        assert!(ServerRegistry::load(&path).get("lab").is_none());
    }

    #[test]
    fn test_failed_write_leaves_registry_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut registry = ServerRegistry::load(dir.path().join("servers_config.json"));
        // A regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        registry.path = blocker.join("servers_config.json");

        assert!(registry.add("lab", ServerEndpoint::default()).is_err());
        assert!(registry.get("lab").is_none());

        assert!(registry.remove(DEFAULT_SERVER_NAME).is_err());
        assert_eq!(registry.get(DEFAULT_SERVER_NAME), Some(&ServerEndpoint::default()));
        assert_eq!(registry.len(), 1);
    }
}
