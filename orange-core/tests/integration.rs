//! Integration tests: session lifecycle, registration, heartbeat,
//! reconnect, soft offline, media delivery, probing and provisioning over
//! real sockets on localhost.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use orange_core::media::decoder::Sample;
use orange_core::protocol::outbound;
use orange_core::{
    ClientIdentity, ConnectionState, OrangeError, PacketType, Prober, Session, SessionConfig,
    StreamViewer, VideoDecoder, packetize, provision,
};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_async, accept_hdr_async};

// ── Helpers ──────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(5);

/// Bind a listener on an OS-assigned port and return it with its
/// websocket address.
async fn ephemeral_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("ws://{addr}/ws"))
}

async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

fn test_session() -> Session {
    Session::new(
        ClientIdentity::new("SN-TEST", "tok"),
        SessionConfig {
            heartbeat_interval: Duration::from_millis(100),
            reconnect_delay: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        },
    )
}

/// Next JSON text frame whose action is not `heartbeat`.
async fn next_envelope(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timeout")
            .expect("stream ended")
            .expect("read error");
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            if value["action"] != "heartbeat" {
                return value;
            }
        }
    }
}

/// Connect `session` to a fresh server and consume the registration.
async fn connected_pair() -> (Session, WebSocketStream<TcpStream>, TcpListener) {
    let (listener, url) = ephemeral_listener().await;
    let session = test_session();
    let (setup, mut ws) = tokio::join!(session.setup(&url), accept_ws(&listener));
    setup.unwrap();
    let register = next_envelope(&mut ws).await;
    assert_eq!(register["action"], "register");
    (session, ws, listener)
}

#[derive(Default)]
struct CountingDecoder {
    submitted: usize,
}

impl VideoDecoder for CountingDecoder {
    type Config = ();

    fn configure(&mut self, _primary: &[u8], _secondary: &[u8]) -> Result<(), OrangeError> {
        Ok(())
    }

    fn submit(&mut self, _config: &(), _sample: Sample) {
        self.submitted += 1;
    }
}

// ── Session lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn test_registration_and_token_query() {
    let (listener, url) = ephemeral_listener().await;
    let session = test_session();

    let (uri_tx, uri_rx) = tokio::sync::oneshot::channel();
    let server = async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let _ = uri_tx.send(req.uri().to_string());
            Ok(resp)
        };
        accept_hdr_async(stream, callback).await.unwrap()
    };
    let (setup, mut ws) = tokio::join!(session.setup(&url), server);
    setup.unwrap();

    assert!(session.is_connected());
    assert_eq!(uri_rx.await.unwrap(), "/ws?token=tok");

    let register = next_envelope(&mut ws).await;
    assert_eq!(register["action"], "register");
    assert_eq!(register["data"]["sn"], "SN-TEST");
    assert_eq!(register["data"]["role"], "client");
    assert_eq!(register["data"]["token"], "tok");
    assert!(register["req_id"].is_string());

    session.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_ping_and_envelope() {
    let (session, mut ws, _listener) = connected_pair().await;

    let mut saw_ping = false;
    let mut saw_heartbeat = false;
    let deadline = tokio::time::Instant::now() + WAIT;
    while !(saw_ping && saw_heartbeat) {
        let msg = tokio::time::timeout_at(deadline, ws.next())
            .await
            .expect("no heartbeat")
            .unwrap()
            .unwrap();
        match msg {
            Message::Ping(_) => saw_ping = true,
            Message::Text(text) => {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                if value == json!({"action": "heartbeat", "data": {"sn": "SN-TEST"}}) {
                    saw_heartbeat = true;
                }
            }
            _ => {}
        }
    }

    session.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_after_server_close() {
    let (listener, url) = ephemeral_listener().await;
    let session = test_session();
    let mut transitions = session.transitions();

    let (setup, mut first) = tokio::join!(session.setup(&url), accept_ws(&listener));
    setup.unwrap();
    next_envelope(&mut first).await;

    first.close(None).await.unwrap();

    // The session dials the same address again on its own.
    let mut second = tokio::time::timeout(WAIT, accept_ws(&listener))
        .await
        .expect("no reconnect");
    let register = next_envelope(&mut second).await;
    assert_eq!(register["action"], "register");

    let mut seen = Vec::new();
    while seen.len() < 6 {
        let change = tokio::time::timeout(WAIT, transitions.recv())
            .await
            .expect("missing transition")
            .unwrap();
        if change.to.is_connected() {
            assert_eq!(change.from, ConnectionState::Connecting);
        }
        seen.push(change.to);
    }
    assert!(matches!(
        seen.as_slice(),
        [
            ConnectionState::Connecting,
            ConnectionState::Connected { .. },
            ConnectionState::Disconnected,
            ConnectionState::Reconnecting { .. },
            ConnectionState::Connecting,
            ConnectionState::Connected { .. },
        ]
    ));

    session.shutdown().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_user_disconnect_does_not_reconnect() {
    let (session, mut ws, listener) = connected_pair().await;

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);

    // The server sees the close frame.
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await.expect("no close") {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => {}
        }
    }

    let again = tokio::time::timeout(Duration::from_millis(400), listener.accept()).await;
    assert!(again.is_err(), "session reconnected after user disconnect");
    assert!(!session.send_json(&outbound::get_device_list()));
}

// ── Control routing ──────────────────────────────────────────────

#[tokio::test]
async fn test_soft_offline_eviction_then_ack() {
    let (session, mut ws, _listener) = connected_pair().await;
    let mut offline = session.soft_offline();

    ws.send(Message::Text(r#"{"code":503,"msg":"evicted"}"#.into()))
        .await
        .unwrap();
    tokio::time::timeout(WAIT, offline.wait_for(|v| *v))
        .await
        .expect("eviction not seen")
        .unwrap();
    assert!(session.is_soft_offline());
    // Eviction is soft: the socket stays up.
    assert!(session.is_connected());

    ws.send(Message::Text(r#"{"code":200,"action":"register"}"#.into()))
        .await
        .unwrap();
    tokio::time::timeout(WAIT, offline.wait_for(|v| !*v))
        .await
        .expect("ack not seen")
        .unwrap();

    session.shutdown().await;
}

#[tokio::test]
async fn test_device_list_and_requests() {
    let (session, mut ws, _listener) = connected_pair().await;
    let mut devices = session.devices();

    assert!(session.send_json(&outbound::get_device_list()));
    let request = next_envelope(&mut ws).await;
    assert_eq!(request["action"], "get_device_list");

    let reply = json!({
        "action": "device_list",
        "data": [
            {"sn": "D1", "model": "Pixel", "status": "online"},
            {"sn": "D2", "model": "Mi"},
        ]
    });
    ws.send(Message::Text(reply.to_string().into())).await.unwrap();
    tokio::time::timeout(WAIT, devices.wait_for(|d| d.len() == 2))
        .await
        .expect("device list not routed")
        .unwrap();

    session.disconnect().await;
    assert!(session.devices().borrow().is_empty());
}

// ── Media ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_binary_frames_reach_viewer() {
    let (session, mut ws, _listener) = connected_pair().await;
    let viewer = StreamViewer::new(&session, CountingDecoder::default(), 500_000);
    let mut stats = viewer.stats_receiver();
    let stop = viewer.stop_handle();
    let handle = tokio::spawn(viewer.run());

    let units: [&[u8]; 6] = [
        &[0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F],
        &[0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80],
        &[0, 0, 1, 0x65, 0x88, 0x84],
        &[0, 0, 0, 1, 0x41, 0x9A],
        &[0, 0, 1, 0x41, 0x9B],
        &[0, 0, 0, 1, 0x09, 0xF0],
    ];
    for unit in units {
        let packet = packetize("SN-TEST", PacketType::Video, unit).unwrap();
        ws.send(Message::Binary(packet)).await.unwrap();
    }

    tokio::time::timeout(WAIT, stats.wait_for(|s| s.total_frames == 3))
        .await
        .expect("frames not decoded")
        .unwrap();

    stop.cancel();
    let decode = handle.await.unwrap();
    assert_eq!(decode.decoder().submitted, 3);
    assert_eq!(decode.stats().configurations, 1);

    session.shutdown().await;
}

// ── Probing ──────────────────────────────────────────────────────

/// Minimal HTTP server answering every request with 404.
async fn http_404_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            });
        }
    });
    format!("ws://{addr}/ws")
}

#[tokio::test]
async fn test_http_probe_picks_live_candidate() {
    let live = http_404_server().await;
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        format!("ws://{addr}/ws")
    };

    let prober = Prober::http(Duration::from_secs(2)).unwrap();
    let winner = tokio::time::timeout(WAIT, prober.race(&[dead.clone(), live.clone()]))
        .await
        .expect("race timed out");
    assert_eq!(winner, Some(live));

    let none = prober.race(&[dead.clone(), dead]).await;
    assert!(none.is_none());
}

// ── Provisioning ─────────────────────────────────────────────────

#[tokio::test]
async fn test_provision_sends_join_cluster_and_closes() {
    let (listener, url) = ephemeral_listener().await;

    let client = provision(
        &url,
        "ws://10.0.0.2:8080/ws",
        "tok",
        Duration::from_secs(2),
        Duration::from_millis(50),
    );
    let server = async {
        let mut ws = accept_ws(&listener).await;
        let command = next_envelope(&mut ws).await;
        let closed = loop {
            match tokio::time::timeout(WAIT, ws.next()).await.expect("no close") {
                Some(Ok(Message::Close(frame))) => break frame,
                Some(Ok(_)) => {}
                other => panic!("unexpected end: {other:?}"),
            }
        };
        (command, closed)
    };

    let (result, (command, closed)) = tokio::join!(client, server);
    assert_ok!(result);
    assert_eq!(command["action"], "join_cluster");
    assert_eq!(command["data"]["token"], "tok");
    assert_eq!(command["data"]["target_urls"], json!(["ws://10.0.0.2:8080/ws"]));
    assert!(command["req"].is_string());
    assert!(closed.is_some());
}

#[tokio::test]
async fn test_provision_unreachable_target() {
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let result = provision(
        &format!("ws://{dead}"),
        "ws://master",
        "tok",
        Duration::from_secs(2),
        Duration::from_millis(10),
    )
    .await;
    assert_err!(result);
}
