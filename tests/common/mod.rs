//! Shared test utilities
//!
//! Mock vendor servers bind `127.0.0.1:0` and hand back their base URL so a
//! [`Config`] can point at them.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use voice_relay::api::ApiServerBuilder;
use voice_relay::config::file::RelayConfigFile;
use voice_relay::{Config, DbPool, db};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Config with defaults, no server keys, and no static dir
#[must_use]
pub fn test_config() -> Config {
    let mut config =
        Config::from_sources(&RelayConfigFile::default(), |_| None).expect("default config");
    config.server.static_dir = None;
    config
}

/// Build a test API router
pub fn build_test_router(db: DbPool, config: Config) -> Router {
    ApiServerBuilder::new(db, config)
        .static_dir(None)
        .build()
        .router()
}

/// Run the full server on a random port
pub async fn spawn_server(db: DbPool, config: Config) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ApiServerBuilder::new(db, config).static_dir(None).build();
    tokio::spawn(server.serve(listener));
    addr
}

/// Serve an axum app on a random port, returning its base URL
pub async fn spawn_app(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Recorded requests of a mock server
pub type Recorded = Arc<Mutex<Vec<Value>>>;

/// Gemini reply carrying plain text
#[must_use]
pub fn gemini_text(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

/// Gemini reply asking for a function call
#[must_use]
pub fn gemini_call(name: &str, args: Value) -> Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{ "functionCall": { "name": name, "args": args } }]
            },
            "finishReason": "STOP"
        }]
    })
}

#[derive(Clone)]
struct GeminiMock {
    replies: Arc<Vec<(StatusCode, Value)>>,
    requests: Recorded,
}

async fn gemini_handler(
    State(mock): State<GeminiMock>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let index = {
        let mut requests = mock.requests.lock().unwrap();
        requests.push(body);
        requests.len() - 1
    };
    let (status, reply) = mock
        .replies
        .get(index)
        .or_else(|| mock.replies.last())
        .cloned()
        .unwrap_or((StatusCode::OK, gemini_text("ok")));
    (status, Json(reply))
}

/// Mock `generateContent`: replies in order, repeating the last one
pub async fn mock_gemini(replies: Vec<(StatusCode, Value)>) -> (String, Recorded) {
    let requests = Recorded::default();
    let app = Router::new()
        .route("/models/{*call}", post(gemini_handler))
        .with_state(GeminiMock {
            replies: Arc::new(replies),
            requests: requests.clone(),
        });
    (spawn_app(app).await, requests)
}

/// Mock streaming STT: after the first audio frame, send `turns`; answer
/// `Terminate` with `Termination`. Records the `Authorization` header of each
/// connection.
pub async fn mock_stt(turns: Vec<Value>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth = Arc::new(Mutex::new(Vec::new()));
    let auth_log = auth.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let turns = turns.clone();
            let auth_log = auth_log.clone();
            tokio::spawn(async move {
                let callback = |req: &Request, resp: Response| {
                    let header = req
                        .headers()
                        .get("Authorization")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    auth_log.lock().unwrap().push(header);
                    Ok::<_, ErrorResponse>(resp)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };

                let begin = json!({ "type": "Begin", "id": "mock-session", "expires_at": 0 });
                let _ = ws.send(Message::text(begin.to_string())).await;

                let mut sent_turns = false;
                while let Some(Ok(msg)) = ws.next().await {
                    match msg {
                        Message::Binary(_) if !sent_turns => {
                            sent_turns = true;
                            for turn in &turns {
                                let _ = ws.send(Message::text(turn.to_string())).await;
                            }
                        }
                        Message::Text(text) if text.as_str().contains("Terminate") => {
                            let done = json!({ "type": "Termination", "audio_duration_seconds": 1 });
                            let _ = ws.send(Message::text(done.to_string())).await;
                            break;
                        }
                        _ => {}
                    }
                }
                let _ = ws.close(None).await;
            });
        }
    });

    (format!("ws://{addr}/v3/ws"), auth)
}

/// Mock streaming STT that never answers `Terminate`
///
/// The flag flips once the relay drops its end of the socket.
pub async fn mock_stt_unresponsive() -> (String, Arc<AtomicBool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let released = Arc::new(AtomicBool::new(false));
    let flag = released.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let flag = flag.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(_)) = ws.next().await {}
                flag.store(true, Ordering::SeqCst);
            });
        }
    });

    (format!("ws://{addr}/v3/ws"), released)
}

/// One `Turn` message
#[must_use]
pub fn stt_turn(transcript: &str, end_of_turn: bool, formatted: bool) -> Value {
    json!({
        "type": "Turn",
        "turn_order": 0,
        "transcript": transcript,
        "end_of_turn": end_of_turn,
        "turn_is_formatted": formatted,
        "words": []
    })
}

/// Mock streaming TTS: sends `chunks` audio frames then `final` per request.
/// Records the text of every synthesis request.
pub async fn mock_tts(chunks: Vec<&'static str>) -> (String, Recorded) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Recorded::default();
    let log = requests.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let chunks = chunks.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    let Ok(body) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    if body.get("text").is_none() {
                        continue;
                    }
                    log.lock().unwrap().push(body.clone());
                    for chunk in &chunks {
                        let frame = json!({ "audio": chunk, "context_id": body["context_id"] });
                        let _ = ws.send(Message::text(frame.to_string())).await;
                    }
                    let fin = json!({ "final": true, "context_id": body["context_id"] });
                    let _ = ws.send(Message::text(fin.to_string())).await;
                }
            });
        }
    });

    (format!("ws://{addr}/v1/speech/stream-input"), requests)
}

/// Mock batch STT that completes immediately with `transcript`
pub async fn mock_batch_stt(transcript: &'static str) -> String {
    let app = Router::new()
        .route(
            "/v2/upload",
            post(|| async { Json(json!({ "upload_url": "https://cdn.test/upload/1" })) }),
        )
        .route(
            "/v2/transcript",
            post(move || async move {
                Json(json!({ "id": "t-1", "status": "completed", "text": transcript }))
            }),
        )
        .route(
            "/v2/transcript/{id}",
            get(move || async move {
                Json(json!({ "id": "t-1", "status": "completed", "text": transcript }))
            }),
        );
    spawn_app(app).await
}

/// Mock batch STT that starts `queued` and then answers each poll from
/// `polls` in order, repeating the last. Returns the base URL and a poll
/// counter.
pub async fn mock_batch_stt_polling(polls: Vec<Value>) -> (String, Arc<Mutex<usize>>) {
    let count = Arc::new(Mutex::new(0_usize));
    let counter = count.clone();
    let polls = Arc::new(polls);

    let app = Router::new()
        .route(
            "/v2/upload",
            post(|| async { Json(json!({ "upload_url": "https://cdn.test/upload/2" })) }),
        )
        .route(
            "/v2/transcript",
            post(|| async { Json(json!({ "id": "t-2", "status": "queued" })) }),
        )
        .route(
            "/v2/transcript/{id}",
            get(move || {
                let counter = counter.clone();
                let polls = polls.clone();
                async move {
                    let index = {
                        let mut n = counter.lock().unwrap();
                        *n += 1;
                        *n - 1
                    };
                    let reply = polls
                        .get(index)
                        .or_else(|| polls.last())
                        .cloned()
                        .unwrap_or_else(|| json!({ "id": "t-2", "status": "processing" }));
                    Json(reply)
                }
            }),
        );
    (spawn_app(app).await, count)
}

/// Mock batch TTS returning a hosted clip
pub async fn mock_batch_tts(status: StatusCode) -> String {
    let app = Router::new().route(
        "/v1/speech/generate",
        post(move |Json(body): Json<Value>| async move {
            let clip = json!({
                "audioFile": "https://murf.test/reply.wav",
                "encodedAudio": if body["encodeAsBase64"] == true { json!("UklGRg==") } else { Value::Null },
                "audioLengthInSeconds": 1.5
            });
            (status, Json(clip))
        }),
    );
    spawn_app(app).await
}
