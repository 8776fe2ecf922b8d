//! Scripted in-memory server used by unit tests.
//!
//! Each [`ServerScript`] answers one connection: its frames are replayed in
//! order regardless of what the client sends, and every frame the client
//! sends is recorded.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::{EventType, Frame};
use crate::transport::{ConnectHeaders, Connector, FrameTransport};

pub(crate) mod frames {
    use super::*;

    pub(crate) fn round_start(session_id: &str, round_id: i32) -> Frame {
        let payload = serde_json::json!({
            "round_id": round_id,
            "speaker": format!("voice_{}", round_id),
            "text": format!("line {}", round_id),
        });
        Frame::server_event(
            EventType::PodcastRoundStart,
            session_id,
            payload.to_string().into_bytes(),
        )
    }

    pub(crate) fn round_end(session_id: &str) -> Frame {
        Frame::server_event(
            EventType::PodcastRoundEnd,
            session_id,
            br#"{"audio_duration": 1.5}"#.to_vec(),
        )
    }

    pub(crate) fn round_end_error(session_id: &str, message: &str) -> Frame {
        let payload = serde_json::json!({"is_error": true, "error_msg": message});
        Frame::server_event(
            EventType::PodcastRoundEnd,
            session_id,
            payload.to_string().into_bytes(),
        )
    }
}

/// Frames the server sends on one connection.
pub(crate) struct ServerScript {
    refuse: bool,
    stall: bool,
    stall_close: bool,
    frames: Vec<Frame>,
}

impl ServerScript {
    /// A connection that gets through both handshakes.
    pub(crate) fn session(session_id: &str) -> Self {
        Self::raw(vec![
            Frame::server_event(EventType::ConnectionStarted, "", b"{}".to_vec()),
            Frame::server_event(EventType::SessionStarted, session_id, b"{}".to_vec()),
        ])
    }

    pub(crate) fn raw(frames: Vec<Frame>) -> Self {
        Self {
            refuse: false,
            stall: false,
            stall_close: false,
            frames,
        }
    }

    /// A connection attempt that fails before any frame is exchanged.
    pub(crate) fn refuse() -> Self {
        Self {
            refuse: true,
            ..Self::raw(Vec::new())
        }
    }

    pub(crate) fn push(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Appends complete rounds: start, one audio chunk, end.
    pub(crate) fn rounds(mut self, rounds: &[(i32, &[u8])]) -> Self {
        let session_id = self.session_id();
        for (round_id, audio) in rounds {
            self.frames.push(frames::round_start(&session_id, *round_id));
            self.frames
                .push(Frame::server_audio(&session_id, audio.to_vec()));
            self.frames.push(frames::round_end(&session_id));
        }
        self
    }

    /// Ends the session cleanly and acknowledges FinishConnection.
    pub(crate) fn finished(self) -> Self {
        let session_id = self.session_id();
        self.push(Frame::server_event(
            EventType::SessionFinished,
            &session_id,
            b"{}".to_vec(),
        ))
        .connection_finished()
    }

    pub(crate) fn connection_finished(self) -> Self {
        self.push(Frame::server_event(
            EventType::ConnectionFinished,
            "",
            b"{}".to_vec(),
        ))
    }

    /// Once the frames run out, `recv` never returns instead of reporting
    /// a closed connection.
    pub(crate) fn stall(mut self) -> Self {
        self.stall = true;
        self
    }

    /// `close` never returns, as with a peer that stopped reading.
    pub(crate) fn stall_close(mut self) -> Self {
        self.stall_close = true;
        self
    }

    fn session_id(&self) -> String {
        self.frames
            .iter()
            .rev()
            .find(|f| !f.session_id.is_empty())
            .map(|f| f.session_id.clone())
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct Log {
    headers: Vec<ConnectHeaders>,
    sent: Vec<Vec<Frame>>,
    closed: usize,
}

/// Hands out one scripted transport per `connect` call.
pub(crate) struct ScriptedConnector {
    scripts: Mutex<VecDeque<ServerScript>>,
    log: Arc<Mutex<Log>>,
    cancel_on: Option<(usize, CancellationToken)>,
}

impl ScriptedConnector {
    pub(crate) fn new(scripts: Vec<ServerScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            log: Arc::new(Mutex::new(Log::default())),
            cancel_on: None,
        }
    }

    /// Cancels `token` when the `n`th connection (1-based) is opened.
    pub(crate) fn cancel_on_connect(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_on = Some((n, token));
        self
    }

    /// Frames sent by the client, one list per opened transport.
    pub(crate) async fn sent(&self) -> Vec<Vec<Frame>> {
        self.log.lock().await.sent.clone()
    }

    /// Headers of every connect call, refused ones included.
    pub(crate) async fn headers(&self) -> Vec<ConnectHeaders> {
        self.log.lock().await.headers.clone()
    }

    pub(crate) async fn connect_count(&self) -> usize {
        self.log.lock().await.headers.len()
    }

    pub(crate) async fn closed_count(&self) -> usize {
        self.log.lock().await.closed
    }

    /// The StartSession payload of every opened transport that sent one.
    pub(crate) async fn start_payloads(&self) -> Vec<serde_json::Value> {
        self.sent()
            .await
            .iter()
            .filter_map(|frames| {
                frames
                    .iter()
                    .find(|f| f.event == Some(EventType::StartSession))
            })
            .map(|f| serde_json::from_slice(&f.payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, headers: &ConnectHeaders) -> Result<Box<dyn FrameTransport>> {
        let mut log = self.log.lock().await;
        log.headers.push(headers.clone());

        if let Some((n, token)) = &self.cancel_on {
            if log.headers.len() == *n {
                token.cancel();
            }
        }

        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| Error::Connection("no scripted connection left".to_string()))?;
        if script.refuse {
            return Err(Error::Connection("connection refused".to_string()));
        }

        log.sent.push(Vec::new());
        Ok(Box::new(ScriptedTransport {
            index: log.sent.len() - 1,
            frames: script.frames.into(),
            stall: script.stall,
            stall_close: script.stall_close,
            closed: false,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedTransport {
    index: usize,
    frames: VecDeque<Frame>,
    stall: bool,
    stall_close: bool,
    closed: bool,
    log: Arc<Mutex<Log>>,
}

#[async_trait]
impl FrameTransport for ScriptedTransport {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(Error::Connection("send on closed transport".to_string()));
        }
        self.log.lock().await.sent[self.index].push(frame.clone());
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Frame>> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.stall => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.stall_close {
            std::future::pending::<()>().await;
        }
        if !self.closed {
            self.closed = true;
            self.log.lock().await.closed += 1;
        }
        Ok(())
    }
}
