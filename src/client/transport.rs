//! Blocking one-shot TCP and UDP exchanges with the server.

use crate::error_handling::types::{ClientError, NetworkError, ProtocolError};
use crate::network::types::{HintResponse, LocationUpdate, ProfileRequest, ProfileResponse};
use log::debug;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

pub const TCP_TIMEOUT: Duration = Duration::from_secs(10);
pub const UDP_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REPLY_SIZE: usize = 64 * 1024;

/// Sends one profile message and waits for the single JSON reply.
///
/// The write side is shut down after sending so the server sees the end of the request.
pub fn tcp_request(
    addr: &str,
    request: &ProfileRequest,
    timeout: Duration,
) -> Result<ProfileResponse, ClientError> {
    let target = resolve(addr)?;
    let mut stream = TcpStream::connect_timeout(&target, timeout).map_err(network_error)?;
    stream.set_read_timeout(Some(timeout)).map_err(NetworkError::SockError)?;
    stream.set_write_timeout(Some(timeout)).map_err(NetworkError::SockError)?;

    let payload = serde_json::to_vec(request).map_err(ProtocolError::from)?;
    stream.write_all(&payload).map_err(network_error)?;
    stream.shutdown(Shutdown::Write).map_err(network_error)?;
    debug!("[TCP] Sent {} bytes to {}", payload.len(), target);

    let mut reply = Vec::new();
    Read::take(&mut stream, MAX_REPLY_SIZE as u64)
        .read_to_end(&mut reply)
        .map_err(network_error)?;
    if reply.is_empty() {
        return Err(ProtocolError::EmptyMessage.into());
    }
    let response: ProfileResponse = serde_json::from_slice(&reply).map_err(ProtocolError::from)?;
    Ok(response)
}

/// Sends one location datagram and waits for the hint.
pub fn udp_request(
    addr: &str,
    update: &LocationUpdate,
    timeout: Duration,
) -> Result<HintResponse, ClientError> {
    let target = resolve(addr)?;
    let local: SocketAddr = if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(local).map_err(NetworkError::SockError)?;
    socket.set_read_timeout(Some(timeout)).map_err(NetworkError::SockError)?;
    socket.set_write_timeout(Some(timeout)).map_err(NetworkError::SockError)?;

    let payload = serde_json::to_vec(update).map_err(ProtocolError::from)?;
    socket.send_to(&payload, target).map_err(network_error)?;
    debug!("[UDP] Sent {} bytes to {}", payload.len(), target);

    let mut buffer = vec![0u8; MAX_REPLY_SIZE];
    let (len, from) = socket.recv_from(&mut buffer).map_err(network_error)?;
    debug!("[UDP] {} bytes from {}", len, from);
    let hint: HintResponse = serde_json::from_slice(&buffer[..len]).map_err(ProtocolError::from)?;
    Ok(hint)
}

fn resolve(addr: &str) -> Result<SocketAddr, NetworkError> {
    addr.to_socket_addrs()
        .map_err(|e| NetworkError::ConnectionFailed(format!("cannot resolve {}: {}", addr, e)))?
        .next()
        .ok_or_else(|| NetworkError::ConnectionFailed(format!("no address for {}", addr)))
}

fn network_error(e: io::Error) -> NetworkError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => NetworkError::Timeout,
        _ => NetworkError::ConnectionFailed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_tcp_request_reads_reply_after_half_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            stream.read_to_end(&mut request).unwrap();
            stream
                .write_all(br#"{"status":"success","message":"ok","session_id":"abc"}"#)
                .unwrap();
            request
        });

        let response = tcp_request(&addr, &ProfileRequest::update_profile("Ann", None), TCP_TIMEOUT).unwrap();
        assert!(response.is_success());
        assert_eq!(response.session_id.as_deref(), Some("abc"));

        let request: serde_json::Value = serde_json::from_slice(&server.join().unwrap()).unwrap();
        assert_eq!(request["name"], "Ann");
    }

    #[test]
    fn test_tcp_request_refused() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let result = tcp_request(&addr, &ProfileRequest::update_profile("Ann", None), Duration::from_secs(1));
        assert!(matches!(result, Err(ClientError::Network(_))));
    }

    #[test]
    fn test_udp_request_times_out_without_reply() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = silent.local_addr().unwrap().to_string();
        let result = udp_request(&addr, &LocationUpdate::new(1.0, 2.0, None), Duration::from_millis(200));
        assert!(matches!(result, Err(ClientError::Network(NetworkError::Timeout))));
    }

    #[test]
    fn test_unresolvable_address() {
        let result = udp_request("not an address", &LocationUpdate::new(1.0, 2.0, None), UDP_TIMEOUT);
        assert!(matches!(result, Err(ClientError::Network(NetworkError::ConnectionFailed(_)))));
    }
}
