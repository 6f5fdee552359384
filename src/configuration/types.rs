use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::net::Ipv6Addr;
use std::time::Duration;

/// One entry of the client's servers registry file.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub ip: String,
    pub tcp_port: u16,
    pub ws_port: u16,
    pub udp_port: u16,
}

impl ServerEndpoint {
    /// Builds an endpoint, deriving the WebSocket and UDP ports from the TCP
    /// port when they are not given.
    pub fn with_defaults(ip: &str, tcp_port: u16, ws_port: Option<u16>, udp_port: Option<u16>) -> Self {
        Self {
            ip: ip.to_string(),
            tcp_port,
            ws_port: ws_port.unwrap_or_else(|| tcp_port.saturating_add(3765)),
            udp_port: udp_port.unwrap_or_else(|| tcp_port.saturating_add(2)),
        }
    }

    /// Host part of an address: IPv6 literals are bracketed, anything else is used as is.
    fn host(&self) -> Cow<'_, str> {
        match self.ip.parse::<Ipv6Addr>() {
            Ok(v6) => Cow::Owned(format!("[{}]", v6)),
            Err(_) => Cow::Borrowed(self.ip.as_str()),
        }
    }

    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host(), self.tcp_port)
    }

    pub fn udp_addr(&self) -> String {
        format!("{}:{}", self.host(), self.udp_port)
    }

    pub fn ws_uri(&self) -> String {
        format!("ws://{}:{}", self.host(), self.ws_port)
    }
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self {
            ip: String::from("127.0.0.1"),
            tcp_port: 5000,
            ws_port: 8765,
            udp_port: 5002,
        }
    }
}

/// Cadence of the broadcast generator.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct BroadcastSchedule {
    /// Lower bound of the random pause between cycles
    pub min_interval: Duration,
    /// Upper bound of the random pause between cycles
    pub max_interval: Duration,
    /// Pause between the `day_event` and the `data_update` of a cycle
    pub data_update_delay: Duration,
}

impl Default for BroadcastSchedule {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(60),
            max_interval: Duration::from_secs(300),
            data_update_delay: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_defaults_derives_ports() {
        let endpoint = ServerEndpoint::with_defaults("10.0.0.2", 5000, None, None);
        assert_eq!(endpoint.ws_port, 8765);
        assert_eq!(endpoint.udp_port, 5002);
        assert_eq!(endpoint.ws_uri(), "ws://10.0.0.2:8765");

        let explicit = ServerEndpoint::with_defaults("10.0.0.2", 5000, Some(9000), Some(9001));
        assert_eq!(explicit.ws_port, 9000);
        assert_eq!(explicit.udp_addr(), "10.0.0.2:9001");
    }

    #[test]
    fn test_ipv6_addresses_are_bracketed() {
        let endpoint = ServerEndpoint::with_defaults("::1", 5000, None, None);
        assert_eq!(endpoint.tcp_addr(), "[::1]:5000");
        assert_eq!(endpoint.udp_addr(), "[::1]:5002");
        assert_eq!(endpoint.ws_uri(), "ws://[::1]:8765");
        assert!(endpoint.tcp_addr().parse::<std::net::SocketAddr>().is_ok());

        let named = ServerEndpoint::with_defaults("localhost", 5000, None, None);
        assert_eq!(named.tcp_addr(), "localhost:5000");
    }
}
