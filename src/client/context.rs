use super::commands::{print_menu, Command};
use super::transport::{tcp_request, udp_request, TCP_TIMEOUT, UDP_TIMEOUT};
use super::ws_listener::{StartOutcome, StopOutcome, WsListener};
use crate::configuration::{ClientPaths, ServerEndpoint};
use crate::error_handling::types::ClientError;
use crate::network::types::{HintResponse, LocationUpdate, ProfileRequest, ProfileResponse};
use crate::storage::{EventCache, ProfileStore, ServerRegistry, UserProfile};
use log::{error, info, warn};
use serde_json::Value;
use std::sync::Arc;

/// Everything the interactive client holds between commands.
///
/// Network and storage failures are logged here and surface to the caller as `None`; only
/// usage errors (unknown server, nothing selected) are returned as [`ClientError`].
pub struct ClientContext {
    servers: ServerRegistry,
    current: Option<String>,
    session_id: Option<String>,
    listener: WsListener,
    cache: Arc<EventCache>,
    profiles: ProfileStore,
}

impl ClientContext {
    pub fn new(paths: &ClientPaths, preferred_server: Option<&str>) -> Self {
        let servers = ServerRegistry::load(&paths.servers_file);
        let current = preferred_server
            .filter(|name| {
                let known = servers.get(name).is_some();
                if !known {
                    warn!("Unknown server '{}', falling back to the first one", name);
                }
                known
            })
            .or_else(|| servers.first_name())
            .map(str::to_string);

        Self {
            servers,
            current,
            session_id: None,
            listener: WsListener::new(),
            cache: Arc::new(EventCache::open(&paths.cache_file)),
            profiles: ProfileStore::new(&paths.users_dir),
        }
    }

    pub fn current_server(&self) -> Option<(&str, &ServerEndpoint)> {
        let name = self.current.as_deref()?;
        self.servers.get(name).map(|endpoint| (name, endpoint))
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn cache(&self) -> Arc<EventCache> {
        Arc::clone(&self.cache)
    }

    pub fn listener(&self) -> &WsListener {
        &self.listener
    }

    fn require_server(&self) -> Result<ServerEndpoint, ClientError> {
        self.current_server()
            .map(|(_, endpoint)| endpoint.clone())
            .ok_or(ClientError::NoServerSelected)
    }

    /// Switching to a different server stops the listener and forgets the session.
    pub fn select_server(&mut self, name: &str) -> Result<(), ClientError> {
        if self.servers.get(name).is_none() {
            return Err(ClientError::UnknownServer(name.to_string()));
        }
        if self.current.as_deref() != Some(name) {
            self.leave_current_server();
            self.current = Some(name.to_string());
        }
        info!("Current server: {}", name);
        Ok(())
    }

    pub fn add_server(&mut self, name: &str, endpoint: ServerEndpoint) -> Result<(), ClientError> {
        self.servers.add(name, endpoint)?;
        if self.current.is_none() {
            self.current = Some(name.to_string());
        }
        Ok(())
    }

    pub fn remove_server(&mut self, name: &str) -> Result<(), ClientError> {
        if self.servers.remove(name)?.is_none() {
            return Err(ClientError::UnknownServer(name.to_string()));
        }
        if self.current.as_deref() == Some(name) {
            self.leave_current_server();
            self.current = self.servers.first_name().map(str::to_string);
        }
        Ok(())
    }

    fn leave_current_server(&mut self) {
        if self.listener.is_active() {
            let outcome = self.listener.stop();
            self.report_stop(outcome);
        }
        self.session_id = None;
    }

    /// Saves the profile locally, then sends it. A successful reply binds the session.
    pub fn send_profile(&mut self, name: &str, age: Option<u32>) -> Option<ProfileResponse> {
        if let Err(e) = self.profiles.save(&UserProfile::new(name, age)) {
            warn!("Profile '{}' not saved locally: {}", name, e);
        }

        let endpoint = self.log_failure(self.require_server())?;
        let mut request = ProfileRequest::update_profile(name, self.session_id.clone());
        if let Some(age) = age {
            request = request.with_field("age", age);
        }

        let addr = endpoint.tcp_addr();
        let response = self.log_failure(tcp_request(&addr, &request, TCP_TIMEOUT))?;
        if response.is_success() {
            if let Some(ref sid) = response.session_id {
                self.session_id = Some(sid.clone());
            }
            self.record("tcp_response", &response, &format!("TCP_to:{}", addr));
        } else {
            warn!("Server rejected the profile: {}", response.message);
        }
        Some(response)
    }

    pub fn send_location(&mut self, latitude: f64, longitude: f64) -> Option<HintResponse> {
        let endpoint = self.log_failure(self.require_server())?;
        let update = LocationUpdate::new(latitude, longitude, self.session_id.clone());
        let addr = endpoint.udp_addr();
        let hint = self.log_failure(udp_request(&addr, &update, UDP_TIMEOUT))?;
        self.record("udp_response", &hint, &format!("UDP_to:{}", addr));
        Some(hint)
    }

    pub fn start_listener(&mut self) -> Result<StartOutcome, ClientError> {
        let endpoint = self.require_server()?;
        Ok(self
            .listener
            .start(&endpoint.ws_uri(), self.session_id.clone(), self.cache()))
    }

    pub fn stop_listener(&mut self) -> StopOutcome {
        self.listener.stop()
    }

    pub fn show_server(&self) {
        match self.current_server() {
            Some((name, endpoint)) => println!(
                "Current server: {} (IP: {}, TCP: {}, WS: {}, UDP: {}), session: {}",
                name,
                endpoint.ip,
                endpoint.tcp_port,
                endpoint.ws_port,
                endpoint.udp_port,
                self.session_id.as_deref().unwrap_or("none")
            ),
            None => println!("No server selected."),
        }
        let known: Vec<&str> = self.servers.names().collect();
        println!("Known servers: {}", known.join(", "));
    }

    pub fn profiles(&self) -> Vec<UserProfile> {
        self.profiles.load_all()
    }

    pub fn delete_profile(&self, name: &str) -> Result<(), ClientError> {
        Ok(self.profiles.delete(name)?)
    }

    pub fn show_history(&self, n: usize) {
        self.cache.show_recent(n);
    }

    /// Runs one command. Returns `false` once the client should exit.
    pub fn execute(&mut self, command: Command) -> bool {
        match command {
            Command::Profile { name, age } => {
                if let Some(response) = self.send_profile(&name, age) {
                    println!("Server: {}", response.message);
                }
            }
            Command::Listen => match self.start_listener() {
                Ok(StartOutcome::Started) => println!("WS: listener started in the background ('stop' to end it)."),
                Ok(StartOutcome::AlreadyActive) => println!("WS: listener already active."),
                Ok(StartOutcome::Failed) => println!("WS: listener could not be started."),
                Err(e) => println!("{}", e),
            },
            Command::Stop => {
                let outcome = self.stop_listener();
                self.report_stop(outcome);
            }
            Command::Location { latitude, longitude } => {
                if let Some(hint) = self.send_location(latitude, longitude) {
                    println!("Hint: {}", hint.hint);
                }
            }
            Command::Select(name) => match self.select_server(&name) {
                Ok(()) => println!("Selected server '{}'.", name),
                Err(e) => println!("{}", e),
            },
            Command::AddServer { name, ip, tcp_port, ws_port, udp_port } => {
                let endpoint = ServerEndpoint::with_defaults(&ip, tcp_port, ws_port, udp_port);
                match self.add_server(&name, endpoint) {
                    Ok(()) => println!("Server '{}' added.", name),
                    Err(e) => println!("{}", e),
                }
            }
            Command::RemoveServer(name) => match self.remove_server(&name) {
                Ok(()) => println!("Server '{}' removed.", name),
                Err(e) => println!("{}", e),
            },
            Command::Server => self.show_server(),
            Command::History(n) => self.show_history(n),
            Command::Profiles => {
                let profiles = self.profiles();
                if profiles.is_empty() {
                    println!("No saved profiles.");
                }
                for profile in profiles {
                    match profile.age {
                        Some(age) => println!("  {} ({})", profile.name, age),
                        None => println!("  {}", profile.name),
                    }
                }
            }
            Command::DeleteProfile(name) => match self.delete_profile(&name) {
                Ok(()) => println!("Profile '{}' deleted.", name),
                Err(e) => println!("{}", e),
            },
            Command::Help => print_menu(),
            Command::Exit => return false,
        }
        true
    }

    /// Stops the listener on the way out.
    pub fn shutdown(&mut self) {
        if self.listener.is_active() {
            let outcome = self.listener.stop();
            self.report_stop(outcome);
        }
    }

    fn report_stop(&self, outcome: StopOutcome) {
        match outcome {
            StopOutcome::NotActive => println!("WS: listener not active."),
            StopOutcome::Stopped => println!("WS: listener stopped."),
            StopOutcome::TimedOut => println!("WS: listener did not stop in time."),
        }
    }

    fn record<T: serde::Serialize>(&self, event_type: &str, payload: &T, source: &str) {
        let content = serde_json::to_value(payload).unwrap_or(Value::Null);
        if let Err(e) = self.cache.add(event_type, content, source) {
            warn!("{} not cached: {}", event_type, e);
        }
    }

    fn log_failure<T>(&self, result: Result<T, ClientError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(ClientError::NoServerSelected) => {
                println!("Select a server first ('select <name>').");
                None
            }
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context_in(dir: &TempDir) -> ClientContext {
        ClientContext::new(&ClientPaths::under(dir.path().to_path_buf()), None)
    }

    #[test]
    fn test_default_server_is_selected() {
        let dir = TempDir::new().unwrap();
        let context = context_in(&dir);
        let (name, endpoint) = context.current_server().unwrap();
        assert_eq!(name, "default");
        assert_eq!(endpoint, &ServerEndpoint::default());
        assert!(context.session_id().is_none());
    }

    #[test]
    fn test_switching_server_discards_session() {
        let dir = TempDir::new().unwrap();
        let mut context = context_in(&dir);
        context
            .add_server("lab", ServerEndpoint::with_defaults("127.0.0.1", 6000, None, None))
            .unwrap();
        context.session_id = Some(String::from("abc"));

        context.select_server("default").unwrap();
        assert_eq!(context.session_id(), Some("abc"));

        context.select_server("lab").unwrap();
        assert_eq!(context.session_id(), None);
        assert!(matches!(context.select_server("nope"), Err(ClientError::UnknownServer(_))));
    }

    #[test]
    fn test_removing_current_server() {
        let dir = TempDir::new().unwrap();
        let mut context = context_in(&dir);
        context.session_id = Some(String::from("abc"));
        context.remove_server("default").unwrap();

        assert!(context.current_server().is_none());
        assert!(context.session_id().is_none());
        assert!(matches!(context.start_listener(), Err(ClientError::NoServerSelected)));
        assert!(context.send_location(1.0, 2.0).is_none());
        assert!(matches!(context.remove_server("default"), Err(ClientError::UnknownServer(_))));
    }

    #[test]
    fn test_profile_is_saved_even_when_server_is_down() {
        let dir = TempDir::new().unwrap();
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut context = context_in(&dir);
        context
            .add_server("down", ServerEndpoint::with_defaults("127.0.0.1", port, None, None))
            .unwrap();
        context.select_server("down").unwrap();

        assert!(context.send_profile("Ann", Some(30)).is_none());
        assert!(dir.path().join("users").join("ann.json").exists());
        assert!(context.session_id().is_none());
    }

    #[test]
    fn test_profiles_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let context = context_in(&dir);
        context.profiles.save(&UserProfile::new("Bob", None)).unwrap();
        context.profiles.save(&UserProfile::new("Ann", Some(30))).unwrap();

        let names: Vec<String> = context.profiles().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Ann", "Bob"]);

        context.delete_profile("Ann").unwrap();
        context.delete_profile("Ann").unwrap();
        assert_eq!(context.profiles().len(), 1);
        assert!(matches!(context.delete_profile(""), Err(ClientError::Storage(_))));
    }

    #[test]
    fn test_exit_and_stop_commands() {
        let dir = TempDir::new().unwrap();
        let mut context = context_in(&dir);
        assert!(context.execute(Command::Stop));
        assert!(context.execute(Command::Help));
        assert!(context.execute(Command::Profiles));
        assert!(context.execute(Command::DeleteProfile(String::from("nobody"))));
        assert!(!context.execute(Command::Exit));
    }
}
