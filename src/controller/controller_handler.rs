use crate::configuration::config::Config;
use crate::error_handling::types::*;
use crate::network::tcp_listener::TcpProfileListener;
use crate::network::udp_listener::UdpHintListener;
use crate::session_management::SessionRegistry;
use crate::web_interface::{event_generator, Broadcaster, WsServer};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Addresses actually bound by [`Controller::start`], useful when the configuration asks for
/// ephemeral ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddresses {
    pub tcp: SocketAddr,
    pub ws: SocketAddr,
    pub udp: SocketAddr,
}

/// Owns the shared server state and the lifetime of every long-running task.
pub struct Controller {
    pub config: Config,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<Broadcaster>,
    tasks: Vec<JoinHandle<()>>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate().map_err(|e| {
            error!("Invalid configuration: {}", e);
            ControllerError::ConfigurationError(e)
        })?;

        Ok(Self {
            registry: Arc::new(SessionRegistry::new(config.session_timeout())),
            broadcaster: Arc::new(Broadcaster::new(config.event_cache_size)),
            config,
            tasks: Vec::new(),
        })
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    /// Binds the three listeners, then spawns them with the event generator and the session
    /// sweeper. Nothing is spawned unless every bind succeeded.
    pub async fn start(&mut self) -> Result<BoundAddresses, ControllerError> {
        if !self.tasks.is_empty() {
            return Err(ControllerError::InitializationFailed(String::from(
                "controller already started",
            )));
        }

        let tcp = TcpProfileListener::bind(self.config.tcp_addr()?, self.registry()).await?;
        let udp = UdpHintListener::bind(self.config.udp_addr()?, self.registry()).await?;
        let ws = WsServer::bind(self.config.ws_addr()?, self.broadcaster()).await?;

        let bound = BoundAddresses {
            tcp: tcp.local_addr()?,
            ws: ws.local_addr()?,
            udp: udp.local_addr()?,
        };

        self.tasks.push(tokio::spawn(tcp.run()));
        self.tasks.push(tokio::spawn(udp.run()));
        self.tasks.push(tokio::spawn(ws.run()));
        self.tasks.push(tokio::spawn(event_generator::run(
            self.broadcaster(),
            self.config.broadcast_schedule(),
        )));
        self.tasks.push(tokio::spawn(sweep_sessions(
            self.registry(),
            self.config.session_timeout(),
        )));

        info!(
            "Server started (TCP {}, WebSocket {}, UDP {})",
            bound.tcp, bound.ws, bound.udp
        );
        Ok(bound)
    }

    /// Starts the server and serves until Ctrl-C.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        self.start().await?;

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for the shutdown signal: {}", e);
        }
        info!("Shutdown requested");
        self.shutdown();
        Ok(())
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!(
            "Server stopped ({} session(s) live, {} event(s) in the diagnostic cache)",
            self.registry.len(),
            self.broadcaster.recent_events().len()
        );
    }
}

/// Removes idle sessions every half expiry window.
async fn sweep_sessions(registry: Arc<SessionRegistry>, expiry: Duration) {
    let mut ticker = tokio::time::interval((expiry / 2).max(Duration::from_secs(1)));
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let removed = registry.sweep(expiry);
        if removed > 0 {
            info!("[SESSION] Swept {} expired session(s), {} left", removed, registry.len());
        } else {
            debug!("[SESSION] Sweep found nothing to remove");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn ephemeral_config() -> Config {
        Config {
            bind_address: String::from("127.0.0.1"),
            tcp_port: 0,
            ws_port: 0,
            udp_port: 0,
            ..Config::default()
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = Config {
            bind_address: String::from("not-an-ip"),
            ..Config::default()
        };
        assert!(matches!(
            Controller::new(config),
            Err(ControllerError::ConfigurationError(ConfigError::BadIPFormatting(_)))
        ));
    }

    #[tokio::test]
    async fn test_start_serves_tcp_then_shutdown() {
        let mut controller = Controller::new(ephemeral_config()).unwrap();
        let bound = controller.start().await.unwrap();
        assert!(controller.start().await.is_err());

        let mut stream = TcpStream::connect(bound.tcp).await.unwrap();
        stream
            .write_all(br#"{"action":"update_profile","name":"Ann"}"#)
            .await
            .unwrap();
        stream.shutdown().await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert!(String::from_utf8_lossy(&reply).contains("success"));
        assert_eq!(controller.registry().len(), 1);

        controller.shutdown();
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = Config {
            tcp_port: taken.local_addr().unwrap().port(),
            ..ephemeral_config()
        };
        let mut controller = Controller::new(config).unwrap();
        assert!(matches!(
            controller.start().await,
            Err(ControllerError::NetworkError(NetworkError::BindError(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_keeps_live_sessions() {
        let expiry = Duration::from_secs(60);
        let registry = Arc::new(SessionRegistry::new(expiry));
        registry.create_or_renew(None, Some("Ann"), "127.0.0.1:1".parse().unwrap());

        let sweeper = tokio::spawn(sweep_sessions(Arc::clone(&registry), expiry));
        // Two sweep periods on the paused clock; session ages follow the wall clock
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(registry.len(), 1);
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_sessions() {
        let expiry = Duration::from_secs(60);
        let registry = Arc::new(SessionRegistry::new(expiry));
        let peer = "127.0.0.1:1".parse().unwrap();
        let long_ago = chrono::Utc::now() - chrono::Duration::seconds(120);
        let stale = registry.create_or_renew_at(None, Some("stale"), peer, long_ago);
        let live = registry.create_or_renew(None, Some("live"), peer);

        let sweeper = tokio::spawn(sweep_sessions(Arc::clone(&registry), expiry));
        // Nothing happens before the first period has elapsed
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(registry.len(), 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(registry.get(&stale.id).is_none());
        assert!(registry.get(&live.id).is_some());
        assert_eq!(registry.len(), 1);
        sweeper.abort();
    }
}
