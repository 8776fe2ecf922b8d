//! One connection attempt against the podcast endpoint.
//!
//! ```text
//! Disconnected -> Connecting -> ConnectionStarted -> SessionStarted
//!   -> Streaming -> SessionFinished -> ConnectionFinished -> Disconnected
//! ```
//!
//! Any state may fall into `Error`. Whatever happens after the transport is
//! opened, `FinishConnection` is attempted and the transport is closed.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::assembler::AudioAssembler;
use crate::error::{Error, Result};
use crate::payload::{
    decode_event, FailureEvent, PodcastEndEvent, PodcastRequest, RoundEndEvent, RoundStartEvent,
};
use crate::protocol::{EventType, Frame, MessageType};
use crate::round::RoundTracker;
use crate::transport::{ConnectHeaders, Connector, FrameTransport};

/// Session client state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    ConnectionStarted,
    SessionStarted,
    Streaming,
    SessionFinished,
    ConnectionFinished,
    Error,
}

/// What one attempt achieved.
#[derive(Debug)]
pub struct AttemptReport {
    /// Session id used by the attempt.
    pub session_id: String,
    /// Final state.
    pub state: SessionState,
    /// True once the server acknowledged `StartSession`.
    pub session_started: bool,
    /// Rounds newly assembled during this attempt.
    pub rounds_completed: usize,
    /// The error that ended the attempt, if any.
    pub error: Option<Error>,
}

impl AttemptReport {
    /// True if the session finished with no round left open.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
            && matches!(
                self.state,
                SessionState::SessionFinished | SessionState::ConnectionFinished
            )
    }
}

/// Drives one attempt over a transport.
struct SessionClient<'a> {
    transport: Box<dyn FrameTransport>,
    session_id: String,
    timeout: Duration,
    state: SessionState,
    session_started: bool,
    rounds_completed: usize,
    tracker: &'a mut RoundTracker,
    assembler: &'a mut AudioAssembler,
}

/// Runs one full attempt: connect, handshake, stream, finish, close.
///
/// Never returns an error directly; the outcome is in the report so the
/// caller can decide whether to retry.
pub async fn run_attempt(
    connector: &dyn Connector,
    headers: &ConnectHeaders,
    request: &PodcastRequest,
    session_id: &str,
    timeout: Duration,
    tracker: &mut RoundTracker,
    assembler: &mut AudioAssembler,
) -> AttemptReport {
    debug!("connecting (session_id={})", session_id);
    let transport = match with_timeout(timeout, "connecting", connector.connect(headers)).await {
        Ok(t) => t,
        Err(e) => {
            return AttemptReport {
                session_id: session_id.to_string(),
                state: SessionState::Error,
                session_started: false,
                rounds_completed: 0,
                error: Some(e),
            };
        }
    };

    let client = SessionClient {
        transport,
        session_id: session_id.to_string(),
        timeout,
        state: SessionState::Connecting,
        session_started: false,
        rounds_completed: 0,
        tracker,
        assembler,
    };
    client.run(request).await
}

impl<'a> SessionClient<'a> {
    async fn run(mut self, request: &PodcastRequest) -> AttemptReport {
        let outcome = self.exchange(request).await;

        if let Some((round_id, bytes)) = self.tracker.discard_open() {
            warn!(
                "discarding unfinished round {} ({} buffered bytes)",
                round_id, bytes
            );
        }

        let error = match outcome {
            Ok(()) => {
                if let Err(e) = self.finish_connection().await {
                    // The session already finished; the audio is complete.
                    warn!("finish connection: {}", e);
                } else {
                    self.state = SessionState::ConnectionFinished;
                }
                None
            }
            Err(e) => {
                self.state = SessionState::Error;
                if let Err(fe) = self.finish_connection().await {
                    debug!("finish connection after error: {}", fe);
                }
                Some(e)
            }
        };

        if let Err(e) = with_timeout(self.timeout, "closing", self.transport.close()).await {
            debug!("close transport: {}", e);
        }

        AttemptReport {
            session_id: self.session_id,
            state: self.state,
            session_started: self.session_started,
            rounds_completed: self.rounds_completed,
            error,
        }
    }

    async fn exchange(&mut self, request: &PodcastRequest) -> Result<()> {
        self.send(&Frame::control(EventType::StartConnection)).await?;
        self.expect(EventType::ConnectionStarted).await?;
        self.state = SessionState::ConnectionStarted;

        let payload = serde_json::to_vec(request)?;
        self.send(&Frame::session(
            EventType::StartSession,
            &self.session_id,
            payload,
        ))
        .await?;
        self.expect(EventType::SessionStarted).await?;
        self.state = SessionState::SessionStarted;
        self.session_started = true;

        self.send(&Frame::session(
            EventType::FinishSession,
            &self.session_id,
            b"{}".to_vec(),
        ))
        .await?;
        self.state = SessionState::Streaming;

        self.stream().await
    }

    async fn stream(&mut self) -> Result<()> {
        loop {
            let frame = self.recv().await?.ok_or_else(|| {
                Error::Connection("connection closed before session finished".to_string())
            })?;

            if frame.is_error() {
                return Err(server_error(&frame));
            }

            let event = frame.event_or_unknown();
            match (frame.msg_type, event) {
                (MessageType::AudioOnlyServer, _) => {
                    debug!("audio received: {} bytes", frame.payload.len());
                    self.tracker.append(&frame.payload)?;
                }
                (_, EventType::PodcastRoundStart) => {
                    let start: RoundStartEvent = decode_event("RoundStart", &frame.payload)?;
                    self.tracker.open(start.round_id, start.speaker.as_deref())?;
                }
                (_, EventType::PodcastRoundEnd) => {
                    let end: RoundEndEvent = decode_event("RoundEnd", &frame.payload)?;
                    if end.failed() {
                        let closed = self.tracker.close_error()?;
                        let message = end.error_msg.unwrap_or_else(|| frame.payload_text());
                        error!("round {} failed: {}", closed.round_id, message);
                        return Err(Error::RoundFailed {
                            round_id: closed.round_id,
                            message,
                        });
                    }
                    let closed = self.tracker.close_success(self.assembler)?;
                    if !closed.duplicate {
                        self.rounds_completed += 1;
                    }
                }
                (_, EventType::PodcastEnd) => {
                    let end: PodcastEndEvent = decode_event("PodcastEnd", &frame.payload)?;
                    let url = end.meta_info.and_then(|m| m.audio_url).unwrap_or_default();
                    info!("podcast generation completed {}", url);
                }
                (_, EventType::SessionFinished) => {
                    self.state = SessionState::SessionFinished;
                    if let Some(round_id) = self.tracker.open_round() {
                        return Err(Error::Protocol(format!(
                            "session finished with round {} still open",
                            round_id
                        )));
                    }
                    return Ok(());
                }
                (_, EventType::SessionFailed) | (_, EventType::SessionCanceled) => {
                    return Err(server_error(&frame));
                }
                (_, other) => {
                    debug!("skipping event {}: {}", other, frame.payload_text());
                }
            }
        }
    }

    async fn finish_connection(&mut self) -> Result<()> {
        self.send(&Frame::control(EventType::FinishConnection)).await?;

        // Late session frames may still be in flight; skip to the ack.
        loop {
            let frame = self.recv().await?.ok_or_else(|| {
                Error::Connection("connection closed before ConnectionFinished".to_string())
            })?;
            if frame.is_error() {
                return Err(server_error(&frame));
            }
            if frame.event == Some(EventType::ConnectionFinished) {
                return Ok(());
            }
        }
    }

    /// Receives one frame and requires it to be `expected`.
    async fn expect(&mut self, expected: EventType) -> Result<()> {
        let frame = self.recv().await?.ok_or_else(|| Error::Handshake {
            expected: expected.to_string(),
            got: "connection closed".to_string(),
        })?;

        if frame.is_error()
            || matches!(
                frame.event,
                Some(EventType::ConnectionFailed) | Some(EventType::SessionFailed)
            )
        {
            return Err(server_error(&frame));
        }
        if frame.msg_type != MessageType::FullServerResponse || frame.event != Some(expected) {
            return Err(Error::Handshake {
                expected: expected.to_string(),
                got: format!(
                    "{:?}/{} {}",
                    frame.msg_type,
                    frame.event_or_unknown(),
                    frame.payload_text()
                ),
            });
        }
        debug!("{} (session_id={})", expected, self.session_id);
        Ok(())
    }

    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let what = format!("sending {}", frame.event_or_unknown());
        with_timeout(self.timeout, &what, self.transport.send(frame)).await
    }

    async fn recv(&mut self) -> Result<Option<Frame>> {
        with_timeout(self.timeout, "receiving", self.transport.recv()).await
    }
}

fn server_error(frame: &Frame) -> Error {
    let failure: Option<FailureEvent> = serde_json::from_slice(&frame.payload).ok();
    let (code, message) = match failure {
        Some(f) => (
            f.code.map(|c| c as u32).unwrap_or(frame.error_code),
            f.message.unwrap_or_else(|| frame.payload_text()),
        ),
        None => (frame.error_code, frame.payload_text()),
    };
    Error::Server { code, message }
}

async fn with_timeout<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Connection(format!(
            "timed out after {:?} {}",
            timeout, what
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{AudioConfig, InputInfo, SpeakerInfo, ACTION_DIALOGUE};
    use crate::script::NlpText;
    use crate::testing::{frames, ScriptedConnector, ServerScript};

    fn headers() -> ConnectHeaders {
        ConnectHeaders {
            app_id: "app".to_string(),
            app_key: "key".to_string(),
            access_key: "access".to_string(),
            resource_id: "res".to_string(),
            connect_id: "conn".to_string(),
        }
    }

    fn request() -> PodcastRequest {
        PodcastRequest {
            input_id: "podcast_1".to_string(),
            nlp_texts: vec![NlpText {
                text: "hi".to_string(),
                speaker: "V1".to_string(),
            }],
            action: ACTION_DIALOGUE,
            use_head_music: false,
            use_tail_music: false,
            input_info: InputInfo::default(),
            speaker_info: SpeakerInfo::default(),
            audio_config: AudioConfig::default(),
            retry_info: None,
        }
    }

    async fn attempt(connector: &ScriptedConnector) -> (AttemptReport, AudioAssembler) {
        let mut tracker = RoundTracker::new();
        let mut asm = AudioAssembler::new();
        let report = run_attempt(
            connector,
            &headers(),
            &request(),
            "s1",
            Duration::from_secs(5),
            &mut tracker,
            &mut asm,
        )
        .await;
        (report, asm)
    }

    #[tokio::test]
    async fn clean_session() {
        let connector = ScriptedConnector::new(vec![ServerScript::session("s1")
            .rounds(&[(0, b"aa".as_slice()), (1, b"bb".as_slice())])
            .finished()]);

        let (report, asm) = attempt(&connector).await;
        assert!(report.is_clean(), "{:?}", report.error);
        assert_eq!(report.state, SessionState::ConnectionFinished);
        assert_eq!(report.rounds_completed, 2);
        assert_eq!(asm.audio(), b"aabb");

        let sent = connector.sent().await;
        let events: Vec<_> = sent[0].iter().map(|f| f.event.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                EventType::StartConnection,
                EventType::StartSession,
                EventType::FinishSession,
                EventType::FinishConnection,
            ]
        );
        assert_eq!(sent[0][1].session_id, "s1");
        let payload: serde_json::Value = serde_json::from_slice(&sent[0][1].payload).unwrap();
        assert_eq!(payload["nlp_texts"][0]["speaker"], "V1");
        assert_eq!(connector.closed_count().await, 1);
    }

    #[tokio::test]
    async fn handshake_requires_connection_started() {
        let connector = ScriptedConnector::new(vec![ServerScript::raw(vec![
            Frame::server_event(EventType::SessionStarted, "s1", b"{}".to_vec()),
        ])]);

        let (report, _) = attempt(&connector).await;
        assert!(matches!(report.error, Some(Error::Handshake { .. })));
        assert!(!report.session_started);
        assert_eq!(connector.closed_count().await, 1);
    }

    #[tokio::test]
    async fn connection_refused() {
        let connector = ScriptedConnector::new(vec![ServerScript::refuse()]);
        let (report, _) = attempt(&connector).await;
        assert!(matches!(report.error, Some(Error::Connection(_))));
        assert_eq!(report.state, SessionState::Error);
    }

    #[tokio::test]
    async fn error_frame_mid_round_discards_round() {
        let connector = ScriptedConnector::new(vec![ServerScript::session("s1")
            .rounds(&[(0, b"keep".as_slice())])
            .push(frames::round_start("s1", 1))
            .push(Frame::server_audio("s1", b"DROP".to_vec()))
            .push(Frame::server_error(55000000, "internal"))
            .connection_finished()]);

        let (report, asm) = attempt(&connector).await;
        assert!(matches!(
            report.error,
            Some(Error::Server { code: 55000000, .. })
        ));
        assert_eq!(report.rounds_completed, 1);
        assert_eq!(asm.audio(), b"keep");

        // FinishConnection is still sent on the error path.
        let sent = connector.sent().await;
        assert_eq!(sent[0].last().unwrap().event, Some(EventType::FinishConnection));
        assert_eq!(connector.closed_count().await, 1);
    }

    #[tokio::test]
    async fn failed_round_end_aborts() {
        let connector = ScriptedConnector::new(vec![ServerScript::session("s1")
            .push(frames::round_start("s1", 0))
            .push(Frame::server_audio("s1", b"x".to_vec()))
            .push(frames::round_end_error("s1", "tts engine error"))
            .connection_finished()]);

        let (report, asm) = attempt(&connector).await;
        match report.error {
            Some(Error::RoundFailed { round_id, message }) => {
                assert_eq!(round_id, 0);
                assert_eq!(message, "tts engine error");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(asm.is_empty());
    }

    #[tokio::test]
    async fn session_finished_with_open_round_is_not_clean() {
        let connector = ScriptedConnector::new(vec![ServerScript::session("s1")
            .push(frames::round_start("s1", 0))
            .push(Frame::server_audio("s1", b"x".to_vec()))
            .finished()]);

        let (report, asm) = attempt(&connector).await;
        assert!(!report.is_clean());
        assert!(matches!(report.error, Some(Error::Protocol(_))));
        assert!(asm.is_empty());
    }

    #[tokio::test]
    async fn dropped_connection_mid_stream() {
        let connector = ScriptedConnector::new(vec![ServerScript::session("s1")
            .rounds(&[(0, b"a".as_slice())])
            .push(frames::round_start("s1", 1))]);

        let (report, asm) = attempt(&connector).await;
        assert!(matches!(report.error, Some(Error::Connection(_))));
        assert!(report.session_started);
        assert_eq!(asm.audio(), b"a");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_server_times_out() {
        let connector = ScriptedConnector::new(vec![ServerScript::session("s1").stall()]);

        let (report, _) = attempt(&connector).await;
        match report.error {
            Some(Error::Connection(msg)) => assert!(msg.contains("timed out"), "{}", msg),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(connector.closed_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_close_is_bounded() {
        let connector = ScriptedConnector::new(vec![ServerScript::session("s1")
            .rounds(&[(0, b"aa".as_slice())])
            .finished()
            .stall_close()]);

        let (report, asm) = attempt(&connector).await;
        assert!(report.is_clean(), "{:?}", report.error);
        assert_eq!(asm.audio(), b"aa");
        assert_eq!(connector.closed_count().await, 0);
    }

    #[tokio::test]
    async fn missing_connection_finished_keeps_audio() {
        let connector = ScriptedConnector::new(vec![ServerScript::session("s1")
            .rounds(&[(0, b"aa".as_slice()), (1, b"bb".as_slice())])
            .push(Frame::server_event(
                EventType::SessionFinished,
                "s1",
                b"{}".to_vec(),
            ))]);

        let (report, asm) = attempt(&connector).await;
        assert!(report.is_clean(), "{:?}", report.error);
        assert_eq!(report.state, SessionState::SessionFinished);
        assert_eq!(report.rounds_completed, 2);
        assert_eq!(asm.audio(), b"aabb");
        assert_eq!(connector.closed_count().await, 1);
    }

    #[tokio::test]
    async fn malformed_round_start_is_decode_error() {
        let connector = ScriptedConnector::new(vec![ServerScript::session("s1")
            .push(Frame::server_event(
                EventType::PodcastRoundStart,
                "s1",
                br#"{"speaker": "V1"}"#.to_vec(),
            ))
            .connection_finished()]);

        let (report, _) = attempt(&connector).await;
        assert!(matches!(report.error, Some(Error::Decode(_))));
    }

    #[tokio::test]
    async fn informational_events_are_skipped() {
        let connector = ScriptedConnector::new(vec![ServerScript::session("s1")
            .push(Frame::server_event(EventType::UsageResponse, "s1", b"{}".to_vec()))
            .rounds(&[(-1, b"music".as_slice()), (0, b"talk".as_slice())])
            .push(Frame::server_event(
                EventType::PodcastEnd,
                "s1",
                br#"{"meta_info": {"audio_url": "https://example.invalid/a.mp3"}}"#.to_vec(),
            ))
            .push(Frame::server_event(EventType::Unknown(777), "s1", b"{}".to_vec()))
            .finished()]);

        let (report, asm) = attempt(&connector).await;
        assert!(report.is_clean(), "{:?}", report.error);
        assert_eq!(asm.audio(), b"musictalk");
    }
}
