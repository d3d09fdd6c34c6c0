//! Echo-suppression end to end: remote input goes into the session,
//! reappears in the transcript, and is never posted back to its origin.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};

use tether_adapter::{AdapterHost, AdapterResult, ChatAdapter};
use tether_core::proto::ManagerFrame;
use tether_core::{Role, SessionId, SessionStatus, TodoItem};
use tether_session::{SessionAnnounce, SessionManager};

#[derive(Default)]
struct RecordingAdapter {
    messages: Mutex<Vec<(Role, String)>>,
}

#[async_trait]
impl ChatAdapter for RecordingAdapter {
    async fn on_session_start(
        &self,
        _id: &SessionId,
        _name: &str,
        _cwd: &Path,
    ) -> AdapterResult<()> {
        Ok(())
    }

    async fn on_session_end(&self, _id: &SessionId) -> AdapterResult<()> {
        Ok(())
    }

    async fn on_session_update(&self, _id: &SessionId, _name: &str) -> AdapterResult<()> {
        Ok(())
    }

    async fn on_status(&self, _id: &SessionId, _status: SessionStatus) -> AdapterResult<()> {
        Ok(())
    }

    async fn on_message(&self, _id: &SessionId, role: Role, text: &str) -> AdapterResult<()> {
        self.messages.lock().await.push((role, text.to_string()));
        Ok(())
    }

    async fn on_task_list(&self, _id: &SessionId, _items: &[TodoItem]) -> AdapterResult<()> {
        Ok(())
    }
}

fn user_line(text: &str) -> String {
    format!(
        r#"{{"type":"user","timestamp":"{}","message":{{"role":"user","content":"{text}"}}}}"#,
        Utc::now().to_rfc3339()
    )
}

async fn setup(
    dir: &Path,
) -> (
    SessionManager,
    Arc<AdapterHost<RecordingAdapter>>,
    mpsc::Receiver<ManagerFrame>,
) {
    let manager = SessionManager::new(Duration::from_secs(30));
    let (runner_tx, runner_rx) = mpsc::channel(16);
    manager
        .register(
            SessionAnnounce {
                id: SessionId::from("s1"),
                name: "claude".into(),
                cwd: dir.to_path_buf(),
                project_dir: dir.to_path_buf(),
                command: vec!["claude".into()],
            },
            runner_tx,
        )
        .await
        .unwrap();

    let host = Arc::new(AdapterHost::new(
        Arc::new(RecordingAdapter::default()),
        manager.clone(),
    ));
    let events = manager.subscribe();
    let host_clone = Arc::clone(&host);
    tokio::spawn(async move { host_clone.run(events).await });

    (manager, host, runner_rx)
}

#[tokio::test]
async fn remote_input_is_framed_and_its_echo_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, host, mut runner_rx) = setup(dir.path()).await;

    assert!(host.submit_input(&SessionId::from("s1"), "run tests").await);

    // Exactly the two frames, in order, on the runner socket.
    assert_eq!(
        runner_rx.recv().await,
        Some(ManagerFrame::Input {
            text: "run tests".into()
        })
    );
    assert_eq!(
        runner_rx.recv().await,
        Some(ManagerFrame::Input { text: "\r".into() })
    );

    // The transcript soon shows the input as a user record.
    std::fs::write(dir.path().join("s1.jsonl"), format!("{}\n", user_line("run tests"))).unwrap();

    // Give the tailer and host time to see it.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    // Zero posts for the echo, and the ledger entry was consumed.
    assert!(host.adapter().messages.lock().await.is_empty());
    assert!(host.ledger().is_empty().await);
}

#[tokio::test]
async fn locally_typed_text_still_posts() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, host, _runner_rx) = setup(dir.path()).await;

    // No submit_input: this user record was typed at the terminal.
    std::fs::write(dir.path().join("s1.jsonl"), format!("{}\n", user_line("hello there"))).unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let messages = host.adapter().messages.lock().await.clone();
    assert_eq!(messages, vec![(Role::User, "hello there".to_string())]);
}

#[tokio::test]
async fn repeated_remote_input_suppresses_both_echoes() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, host, mut runner_rx) = setup(dir.path()).await;

    assert!(host.submit_input(&SessionId::from("s1"), "again").await);
    assert!(host.submit_input(&SessionId::from("s1"), "again").await);
    for _ in 0..4_u8 {
        let _ = runner_rx.recv().await;
    }

    // Distinct timestamps keep the two records distinct on disk.
    let first = user_line("again");
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = user_line("again");
    std::fs::write(dir.path().join("s1.jsonl"), format!("{first}\n{second}\n")).unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(host.adapter().messages.lock().await.is_empty());
    assert!(host.ledger().is_empty().await);
}

#[tokio::test]
async fn failed_send_rolls_the_ledger_back() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, host, runner_rx) = setup(dir.path()).await;

    // Kill the runner connection; the next send must fail.
    drop(runner_rx);

    assert!(!host.submit_input(&SessionId::from("s1"), "doomed").await);
    assert!(host.ledger().is_empty().await);
}
