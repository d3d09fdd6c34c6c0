//! Full-path test: session manager → bridge → relay → viewer, and
//! viewer input back down to the runner socket.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use tether_bridge::RelayBridge;
use tether_core::proto::{ClientFrame, ManagerFrame, ServerFrame};
use tether_core::{Role, SessionId, SessionStatus, UserId};
use tether_relay::{ConnectionRole, InMemoryCredentialStore, LogPushGateway, RelayState, serve_on};
use tether_session::{SessionAnnounce, SessionManager};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn send(ws: &mut WsStream, frame: &ClientFrame) {
    let json = serde_json::to_string(frame).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

async fn recv(ws: &mut WsStream) -> ServerFrame {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn events_flow_up_and_input_flows_down() {
    let credentials = Arc::new(InMemoryCredentialStore::new());
    let user = UserId::new();
    credentials
        .insert("tth_ws", user, ConnectionRole::Workstation)
        .await;
    credentials
        .insert("tth_view", user, ConnectionRole::Viewer)
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = RelayState::new(credentials, Arc::new(LogPushGateway), format!("http://{addr}"));
    tokio::spawn(serve_on(listener, state));

    // A session registered before the bridge connects: exercises the
    // announce-on-connect replay.
    let project = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(Duration::from_secs(30));
    let (runner_tx, mut runner_rx) = mpsc::channel(8);
    manager
        .register(
            SessionAnnounce {
                id: SessionId::from("s1"),
                name: "fix-bug".into(),
                cwd: project.path().to_path_buf(),
                project_dir: project.path().to_path_buf(),
                command: vec!["claude".into()],
            },
            runner_tx,
        )
        .await
        .unwrap();

    let bridge = RelayBridge::new(format!("ws://{addr}"), "tth_ws", manager.clone());
    tokio::spawn(bridge.run());

    // Viewer sees the announced session.
    let (mut viewer, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/viewer"))
        .await
        .unwrap();
    send(&mut viewer, &ClientFrame::Auth {
        token: "tth_view".into(),
    })
    .await;
    assert!(matches!(recv(&mut viewer).await, ServerFrame::AuthOk));

    loop {
        send(&mut viewer, &ClientFrame::ListSessions).await;
        if let ServerFrame::SessionsList { sessions } = recv(&mut viewer).await
            && !sessions.is_empty()
        {
            assert_eq!(sessions[0].id, SessionId::from("s1"));
            assert_eq!(sessions[0].name, "fix-bug");
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    send(&mut viewer, &ClientFrame::Subscribe {
        session_id: SessionId::from("s1"),
    })
    .await;
    assert!(matches!(
        recv(&mut viewer).await,
        ServerFrame::SessionStatus {
            status: SessionStatus::Running,
            ..
        }
    ));

    // A transcript record becomes a live frame at the viewer.
    std::fs::write(
        project.path().join("s1.jsonl"),
        r#"{"type":"assistant","message":{"content":"hello from the session"}}
"#,
    )
    .unwrap();
    let ServerFrame::SessionMessage { role, content, .. } = recv(&mut viewer).await else {
        panic!("expected a session_message frame");
    };
    assert_eq!(role, Role::Assistant);
    assert_eq!(content, "hello from the session");

    // Viewer input lands on the runner socket as text + carriage return.
    send(&mut viewer, &ClientFrame::SendInput {
        session_id: SessionId::from("s1"),
        text: "cargo test".into(),
    })
    .await;
    let first = tokio::time::timeout(Duration::from_secs(5), runner_rx.recv())
        .await
        .unwrap();
    assert_eq!(
        first,
        Some(ManagerFrame::Input {
            text: "cargo test".into()
        })
    );
    let second = tokio::time::timeout(Duration::from_secs(5), runner_rx.recv())
        .await
        .unwrap();
    assert_eq!(second, Some(ManagerFrame::Input { text: "\r".into() }));

    // Ending the session propagates to the subscribed viewer.
    manager.end(&SessionId::from("s1")).await;
    assert!(matches!(
        recv(&mut viewer).await,
        ServerFrame::SessionStatus {
            status: SessionStatus::Ended,
            ..
        }
    ));
}
