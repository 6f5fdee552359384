//! Socket-level tests of the three server endpoints on ephemeral ports.

use crate::client::transport::{tcp_request, udp_request, TCP_TIMEOUT, UDP_TIMEOUT};
use crate::configuration::BroadcastSchedule;
use crate::network::types::{LocationUpdate, ProfileRequest, ResponseStatus};
use crate::network::udp_listener::GENERIC_HINT;
use crate::network::{TcpProfileListener, UdpHintListener};
use crate::session_management::SessionRegistry;
use crate::web_interface::{event_generator, Broadcaster, ClientMessage, WsServer};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_tungstenite::tungstenite::Message;

fn localhost() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn registry() -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(Duration::from_secs(1800)))
}

async fn spawn_tcp(registry: Arc<SessionRegistry>) -> SocketAddr {
    let listener = TcpProfileListener::bind(localhost(), registry).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());
    addr
}

async fn spawn_udp(registry: Arc<SessionRegistry>) -> SocketAddr {
    let listener = UdpHintListener::bind(localhost(), registry).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());
    addr
}

async fn raw_tcp_exchange(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    reply
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tcp_session_round_trip() {
    let registry = registry();
    let addr = spawn_tcp(Arc::clone(&registry)).await.to_string();

    let (first, second) = tokio::task::spawn_blocking(move || {
        let request = ProfileRequest::update_profile("Ann", None).with_field("age", 30);
        let first = tcp_request(&addr, &request, TCP_TIMEOUT).unwrap();

        let renewal = ProfileRequest::update_profile("Ann", first.session_id.clone()).with_field("age", 30);
        let second = tcp_request(&addr, &renewal, TCP_TIMEOUT).unwrap();
        (first, second)
    })
    .await
    .unwrap();

    assert_eq!(first.status, ResponseStatus::Success);
    assert!(first.session_id.as_deref().is_some_and(|sid| !sid.is_empty()));
    assert_eq!(second.session_id, first.session_id);
    assert!(second.message.contains("confirmed"));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_tcp_malformed_input_leaves_server_running() {
    let registry = registry();
    let addr = spawn_tcp(Arc::clone(&registry)).await;

    let reply: Value = serde_json::from_slice(&raw_tcp_exchange(addr, b"{\"action\": oops").await).unwrap();
    assert_eq!(reply["status"], "error");
    assert!(reply.get("session_id").is_none());

    // Closed without sending anything: no reply at all
    assert!(raw_tcp_exchange(addr, b"").await.is_empty());

    let reply: Value =
        serde_json::from_slice(&raw_tcp_exchange(addr, br#"{"action":"update_profile","name":"Bob"}"#).await).unwrap();
    assert_eq!(reply["status"], "success");
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_udp_hints() {
    let registry = registry();
    let addr = spawn_udp(Arc::clone(&registry)).await;
    let socket = UdpSocket::bind(localhost()).await.unwrap();
    let mut buffer = [0u8; 2048];

    socket
        .send_to(br#"{"latitude":55.75,"longitude":37.61,"action":"location_update"}"#, addr)
        .await
        .unwrap();
    let (len, _) = tokio::time::timeout(UDP_TIMEOUT, socket.recv_from(&mut buffer))
        .await
        .unwrap()
        .unwrap();
    let reply: Value = serde_json::from_slice(&buffer[..len]).unwrap();
    assert_eq!(reply["hint"], GENERIC_HINT);
    assert!(reply["timestamp"].is_f64());

    // Malformed datagrams are dropped; the next one is still answered
    socket.send_to(b"nope", addr).await.unwrap();
    socket
        .send_to(br#"{"latitude":1,"longitude":2,"action":"location_update","session_id":"bogus"}"#, addr)
        .await
        .unwrap();
    let (len, _) = tokio::time::timeout(UDP_TIMEOUT, socket.recv_from(&mut buffer))
        .await
        .unwrap()
        .unwrap();
    let reply: Value = serde_json::from_slice(&buffer[..len]).unwrap();
    assert_eq!(reply["hint"], GENERIC_HINT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_udp_personalised_hint_through_client_helper() {
    let registry = registry();
    let issued = registry.create_or_renew(None, Some("Ann"), "127.0.0.1:9".parse().unwrap());
    let addr = spawn_udp(Arc::clone(&registry)).await.to_string();

    let hint = tokio::task::spawn_blocking(move || {
        udp_request(&addr, &LocationUpdate::new(55.75, 37.61, Some(issued.id.to_string())), UDP_TIMEOUT)
    })
    .await
    .unwrap()
    .unwrap();
    assert!(hint.hint.starts_with("Ann,"));
}

#[tokio::test]
async fn test_ws_client_receives_one_full_cycle() {
    let broadcaster = Arc::new(Broadcaster::new(20));
    let server = WsServer::bind(localhost(), Arc::clone(&broadcaster)).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr)).await.unwrap();
    let identify = serde_json::to_string(&ClientMessage::WsIdentify {
        session_id: String::from("abc"),
    })
    .unwrap();
    ws.send(Message::text(identify)).await.unwrap();

    // The generator starts only once the client is registered
    while broadcaster.client_count().await == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let schedule = BroadcastSchedule {
        min_interval: Duration::from_secs(60),
        max_interval: Duration::from_secs(60),
        data_update_delay: Duration::from_millis(50),
    };
    let generator = tokio::spawn(event_generator::run(Arc::clone(&broadcaster), schedule));

    let mut kinds = Vec::new();
    while kinds.len() < 2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            let event: Value = serde_json::from_str(text.as_str()).unwrap();
            kinds.push(event["type"].as_str().unwrap().to_string());
        }
    }
    generator.abort();
    assert_eq!(kinds, vec!["day_event", "data_update"]);

    ws.close(None).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while broadcaster.client_count().await > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(broadcaster.client_count().await, 0);
}
