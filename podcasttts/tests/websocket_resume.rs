//! End-to-end synthesis against a local WebSocket server speaking the
//! binary frame protocol.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dailycast_podcasttts::protocol::{BinaryProtocol, EventType, Frame};
use dailycast_podcasttts::{
    Client, DialogueScript, Error, PodcastOptions, Segment, APP_KEY_PODCAST, RESOURCE_PODCAST,
};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

#[derive(Default)]
struct Seen {
    headers: Vec<HashMap<String, String>>,
    session_ids: Vec<String>,
    start_payloads: Vec<serde_json::Value>,
}

/// How the server behaves on one connection.
#[derive(Clone, Copy)]
enum Behavior {
    /// Completes rounds 0 and 1, starts round 2, then closes the socket.
    DropMidRound,
    /// Resumes at round 2 and finishes the session.
    Resume,
    /// Answers StartConnection with an error frame.
    RejectHandshake,
}

fn round(session_id: &str, round_id: i32, audio: &[u8]) -> Vec<Frame> {
    vec![
        round_start(session_id, round_id),
        Frame::server_audio(session_id, audio.to_vec()),
        Frame::server_event(
            EventType::PodcastRoundEnd,
            session_id,
            br#"{"audio_duration": 0.5}"#.to_vec(),
        ),
    ]
}

fn round_start(session_id: &str, round_id: i32) -> Frame {
    let payload = serde_json::json!({"round_id": round_id, "speaker": "voice", "text": "line"});
    Frame::server_event(
        EventType::PodcastRoundStart,
        session_id,
        payload.to_string().into_bytes(),
    )
}

async fn send_all(ws: &mut WebSocketStream<TcpStream>, proto: &BinaryProtocol, frames: Vec<Frame>) {
    for frame in frames {
        let data = proto.marshal(&frame).unwrap();
        ws.send(Message::binary(data)).await.unwrap();
    }
}

async fn serve(stream: TcpStream, behavior: Behavior, seen: Arc<Mutex<Seen>>) {
    let header_log = seen.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let headers = req
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        header_log.lock().unwrap().headers.push(headers);
        Ok(resp)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .unwrap();
    let proto = BinaryProtocol::new();
    let mut session_id = String::new();

    while let Some(msg) = ws.next().await {
        let data = match msg {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let frame = proto.unmarshal(&data).unwrap();

        match (frame.event, behavior) {
            (Some(EventType::StartConnection), Behavior::RejectHandshake) => {
                send_all(
                    &mut ws,
                    &proto,
                    vec![Frame::server_error(45000001, "invalid access key")],
                )
                .await;
            }
            (Some(EventType::StartConnection), _) => {
                let ack = Frame::server_event(EventType::ConnectionStarted, "", b"{}".to_vec());
                send_all(&mut ws, &proto, vec![ack]).await;
            }
            (Some(EventType::StartSession), _) => {
                session_id = frame.session_id.clone();
                {
                    let mut seen = seen.lock().unwrap();
                    seen.session_ids.push(session_id.clone());
                    seen.start_payloads
                        .push(serde_json::from_slice(&frame.payload).unwrap());
                }
                let ack =
                    Frame::server_event(EventType::SessionStarted, &session_id, b"{}".to_vec());
                send_all(&mut ws, &proto, vec![ack]).await;
            }
            (Some(EventType::FinishSession), Behavior::DropMidRound) => {
                let mut frames = round(&session_id, 0, b"r0");
                frames.extend(round(&session_id, 1, b"r1"));
                frames.push(round_start(&session_id, 2));
                frames.push(Frame::server_audio(&session_id, b"cut".to_vec()));
                send_all(&mut ws, &proto, frames).await;
                let _ = ws.close(None).await;
                return;
            }
            (Some(EventType::FinishSession), _) => {
                let mut frames = round(&session_id, 2, b"r2");
                frames.extend(round(&session_id, 3, b"r3"));
                frames.push(Frame::server_event(
                    EventType::PodcastEnd,
                    &session_id,
                    br#"{"meta_info": {"audio_url": ""}}"#.to_vec(),
                ));
                frames.push(Frame::server_event(
                    EventType::SessionFinished,
                    &session_id,
                    b"{}".to_vec(),
                ));
                send_all(&mut ws, &proto, frames).await;
            }
            (Some(EventType::FinishConnection), _) => {
                let ack = Frame::server_event(EventType::ConnectionFinished, "", b"{}".to_vec());
                send_all(&mut ws, &proto, vec![ack]).await;
            }
            _ => {}
        }
    }
}

async fn start_server(behaviors: Vec<Behavior>) -> (String, Arc<Mutex<Seen>>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let seen = Arc::new(Mutex::new(Seen::default()));

    let server_seen = seen.clone();
    let handle = tokio::spawn(async move {
        for behavior in behaviors {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, behavior, server_seen.clone()).await;
        }
    });
    (url, seen, handle)
}

fn client(url: &str, attempts: u32) -> Client {
    Client::builder("test-app")
        .access_key("test-access")
        .endpoint(url)
        .max_attempts(attempts)
        .backoff(Duration::from_millis(10))
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn script() -> DialogueScript {
    DialogueScript::new(vec![
        Segment::new("host", "Welcome"),
        Segment::new("guest", "Thanks"),
        Segment::new("host", "Today we read three papers."),
        Segment::new("guest", "Let's start."),
    ])
}

#[tokio::test]
async fn resumes_after_dropped_connection() {
    let (url, seen, server) = start_server(vec![Behavior::DropMidRound, Behavior::Resume]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("episode.mp3");

    let result = client(&url, 5)
        .podcast()
        .synthesize(&script(), &PodcastOptions::default(), &path)
        .await
        .unwrap();
    server.await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"r0r1r2r3");
    assert_eq!(result.attempts, 2);
    assert_eq!(result.rounds, 4);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.headers.len(), 2);
    for headers in &seen.headers {
        assert_eq!(headers["x-api-app-id"], "test-app");
        assert_eq!(headers["x-api-app-key"], APP_KEY_PODCAST);
        assert_eq!(headers["x-api-access-key"], "test-access");
        assert_eq!(headers["x-api-resource-id"], RESOURCE_PODCAST);
    }
    assert_ne!(
        seen.headers[0]["x-api-connect-id"],
        seen.headers[1]["x-api-connect-id"]
    );

    assert_ne!(seen.session_ids[0], seen.session_ids[1]);
    assert!(seen.start_payloads[0].get("retry_info").is_none());
    assert_eq!(
        seen.start_payloads[1]["retry_info"],
        serde_json::json!({
            "retry_task_id": seen.session_ids[0],
            "last_finished_round_id": 1,
        })
    );
    assert_eq!(result.task_id, seen.session_ids[0]);
}

#[tokio::test]
async fn rejected_handshake_writes_nothing() {
    let (url, seen, server) =
        start_server(vec![Behavior::RejectHandshake, Behavior::RejectHandshake]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("episode.mp3");

    let err = client(&url, 2)
        .podcast()
        .synthesize(&script(), &PodcastOptions::default(), &path)
        .await
        .unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, Error::NoAudioProduced), "{:?}", err);
    assert!(!path.exists());
    assert_eq!(seen.lock().unwrap().headers.len(), 2);
    assert!(seen.lock().unwrap().start_payloads.is_empty());
}
