//! Local rendezvous socket for session runners.
//!
//! Runners connect over a Unix domain socket and speak newline-delimited
//! JSON: a `session_start` announcement first, then optionally
//! `session_end`. The manager writes `input` frames in the other
//! direction. One runner connection carries one session; when the
//! connection drops, its session is torn down.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tether_core::proto::{ManagerFrame, RunnerFrame};
use tether_core::SessionId;

use crate::error::{SessionError, SessionResult};
use crate::manager::{SessionAnnounce, SessionManager};

/// Outbound frame buffer per runner connection.
const RUNNER_QUEUE: usize = 64;

/// The rendezvous endpoint.
pub struct IpcServer {
    listener: UnixListener,
    manager: SessionManager,
}

impl IpcServer {
    /// Bind the rendezvous socket, replacing any stale socket file.
    pub fn bind(path: &Path, manager: SessionManager) -> SessionResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path).map_err(SessionError::Rendezvous)?;
        info!(path = %path.display(), "rendezvous socket bound");
        Ok(Self { listener, manager })
    }

    /// Accept runner connections forever.
    pub async fn run(self) -> SessionResult<()> {
        loop {
            let (stream, _) = self
                .listener
                .accept()
                .await
                .map_err(SessionError::Rendezvous)?;
            tokio::spawn(handle_runner(stream, self.manager.clone()));
        }
    }
}

/// Drive one runner connection to completion.
async fn handle_runner(stream: UnixStream, manager: SessionManager) {
    let (read_half, mut write_half) = stream.into_split();

    let (frames_tx, mut frames_rx) = mpsc::channel::<ManagerFrame>(RUNNER_QUEUE);
    let writer = tokio::spawn(async move {
        while let Some(frame) = frames_rx.recv().await {
            let Ok(mut line) = serde_json::to_string(&frame) else {
                continue;
            };
            line.push('\n');
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut announced: Option<SessionId> = None;
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "runner connection read failed");
                break;
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<RunnerFrame>(&line) {
            Ok(RunnerFrame::SessionStart {
                id,
                name,
                cwd,
                project_dir,
                command,
            }) => {
                if announced.is_some() {
                    warn!(session = %id, "runner connection already carries a session, ignoring");
                    continue;
                }
                let announce = SessionAnnounce {
                    id: id.clone(),
                    name,
                    cwd,
                    project_dir,
                    command,
                };
                match manager.register(announce, frames_tx.clone()).await {
                    Ok(()) => announced = Some(id),
                    Err(e) => warn!(session = %id, error = %e, "registration rejected"),
                }
            },
            Ok(RunnerFrame::SessionEnd { session_id }) => {
                manager.end(&session_id).await;
                if announced.as_ref() == Some(&session_id) {
                    announced = None;
                }
            },
            Err(e) => {
                debug!(error = %e, "malformed runner frame");
            },
        }
    }

    // Transport closure ends the session it carried.
    if let Some(id) = announced {
        manager.end(&id).await;
    }
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_core::SessionEvent;
    use tokio::io::AsyncReadExt;

    async fn next_event(
        rx: &mut crate::bus::EventReceiver,
    ) -> Option<SessionEvent> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .ok()
            .flatten()
    }

    fn start_line(id: &str, dir: &Path) -> String {
        format!(
            r#"{{"type":"session_start","id":"{id}","name":"claude","cwd":"{dir}","projectDir":"{dir}","command":["claude"]}}"#,
            dir = dir.display()
        )
    }

    #[tokio::test]
    async fn announce_registers_and_close_ends() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("manager.sock");
        let manager = SessionManager::new(Duration::from_secs(30));
        let mut events = manager.subscribe();

        let server = IpcServer::bind(&sock, manager.clone()).unwrap();
        tokio::spawn(server.run());

        let mut stream = UnixStream::connect(&sock).await.unwrap();
        stream
            .write_all(format!("{}\n", start_line("s1", dir.path())).as_bytes())
            .await
            .unwrap();

        assert!(matches!(
            next_event(&mut events).await,
            Some(SessionEvent::SessionStarted { .. })
        ));
        assert!(manager.get(&SessionId::from("s1")).await.is_some());

        drop(stream);
        assert!(matches!(
            next_event(&mut events).await,
            Some(SessionEvent::SessionEnded { .. })
        ));
        assert!(manager.get(&SessionId::from("s1")).await.is_none());
    }

    #[tokio::test]
    async fn input_frames_reach_the_runner() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("manager.sock");
        let manager = SessionManager::new(Duration::from_secs(30));
        let mut events = manager.subscribe();

        let server = IpcServer::bind(&sock, manager.clone()).unwrap();
        tokio::spawn(server.run());

        let mut stream = UnixStream::connect(&sock).await.unwrap();
        stream
            .write_all(format!("{}\n", start_line("s1", dir.path())).as_bytes())
            .await
            .unwrap();
        let _ = next_event(&mut events).await;

        assert!(manager.send_input(&SessionId::from("s1"), "run tests").await);

        let mut buf = vec![0u8; 256];
        let mut received = String::new();
        while !received.contains("\\r") {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "runner socket closed early");
            received.push_str(std::str::from_utf8(&buf[..n]).unwrap());
        }
        let mut lines = received.lines();
        assert_eq!(
            lines.next().unwrap(),
            r#"{"type":"input","text":"run tests"}"#
        );
        assert_eq!(lines.next().unwrap(), r#"{"type":"input","text":"\r"}"#);
    }

    #[tokio::test]
    async fn explicit_session_end_frame_tears_down() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("manager.sock");
        let manager = SessionManager::new(Duration::from_secs(30));
        let mut events = manager.subscribe();

        let server = IpcServer::bind(&sock, manager.clone()).unwrap();
        tokio::spawn(server.run());

        let mut stream = UnixStream::connect(&sock).await.unwrap();
        stream
            .write_all(format!("{}\n", start_line("s1", dir.path())).as_bytes())
            .await
            .unwrap();
        let _ = next_event(&mut events).await;

        stream
            .write_all(b"{\"type\":\"session_end\",\"sessionId\":\"s1\"}\n")
            .await
            .unwrap();

        assert!(matches!(
            next_event(&mut events).await,
            Some(SessionEvent::SessionEnded { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("manager.sock");
        let manager = SessionManager::new(Duration::from_secs(30));
        let mut events = manager.subscribe();

        let server = IpcServer::bind(&sock, manager.clone()).unwrap();
        tokio::spawn(server.run());

        let mut stream = UnixStream::connect(&sock).await.unwrap();
        stream.write_all(b"not json\n").await.unwrap();
        stream
            .write_all(format!("{}\n", start_line("s1", dir.path())).as_bytes())
            .await
            .unwrap();

        // The bad line did not kill the connection.
        assert!(matches!(
            next_event(&mut events).await,
            Some(SessionEvent::SessionStarted { .. })
        ));
    }
}
