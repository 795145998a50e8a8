//! Live voice relay socket
//!
//! `GET /ws?assemblyai_key=..&google_gemini_key=..&murf_ai_key=..&session_id=..`
//!
//! The client streams 16 kHz PCM16 binary frames and receives text frames:
//! transcripts (partial and final), `AI_RESPONSE:<text>`, `AUDIO_CHUNK:<base64>` and `AUDIO_END`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::ApiState;
use crate::config::ApiKeys;
use crate::llm::GeminiClient;
use crate::relay::{Conversation, OutFrame, Speaker, TurnDetector, pump_stt_events, run_turns};
use crate::voice::{SttSession, StreamingStt};

/// Close reason when credentials or the session id are absent
pub const MISSING_PARAMS_REASON: &str = "API keys or session_id are missing.";

/// How long to wait for the STT vendor to flush after the client leaves
const STT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection parameters as sent by the client
#[derive(Debug, Default, Deserialize)]
pub struct RelayQuery {
    pub assemblyai_key: Option<String>,
    pub google_gemini_key: Option<String>,
    pub murf_ai_key: Option<String>,
    pub session_id: Option<String>,
}

/// Parameters with server fallbacks applied
#[derive(Debug, PartialEq, Eq)]
pub struct RelayParams {
    pub stt_key: String,
    pub llm_key: String,
    pub tts_key: String,
    pub session_id: String,
}

impl RelayQuery {
    /// Resolve each key from the query, then the server config
    ///
    /// Returns `None` if any key or the session id ends up missing or empty.
    #[must_use]
    pub fn resolve(self, server: &ApiKeys) -> Option<RelayParams> {
        fn pick(client: Option<String>, server: Option<&String>) -> Option<String> {
            client
                .filter(|k| !k.trim().is_empty())
                .or_else(|| server.filter(|k| !k.trim().is_empty()).cloned())
        }

        Some(RelayParams {
            stt_key: pick(self.assemblyai_key, server.assemblyai.as_ref())?,
            llm_key: pick(self.google_gemini_key, server.google_gemini.as_ref())?,
            tts_key: pick(self.murf_ai_key, server.murf.as_ref())?,
            session_id: self.session_id.filter(|s| !s.trim().is_empty())?,
        })
    }
}

/// Build the relay socket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Upgrade to the relay socket
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
    Query(query): Query<RelayQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

/// Close the socket with a code and reason
async fn close(mut socket: WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "failed to send close frame");
    }
}

/// Handle one relay connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>, query: RelayQuery) {
    let config = state.config.clone();

    let Some(params) = query.resolve(&config.api_keys) else {
        tracing::warn!("rejecting relay connection: missing keys or session id");
        close(socket, close_code::POLICY, MISSING_PARAMS_REASON).await;
        return;
    };
    let session_id = params.session_id;

    let clients = GeminiClient::from_config(&config, params.llm_key).and_then(|llm| {
        let speaker = Speaker::from_config(&config, params.tts_key)?;
        let stt = StreamingStt::new(
            config.endpoints.stt_stream.clone(),
            params.stt_key,
            config.voice.sample_rate,
            config.voice.format_turns,
        )?;
        Ok((llm, speaker, stt))
    });
    let (llm, speaker, stt) = match clients {
        Ok(clients) => clients,
        Err(e) => {
            tracing::error!(error = %e, "failed to configure vendor clients");
            close(socket, close_code::ERROR, "Relay misconfigured.").await;
            return;
        }
    };

    let SttSession {
        audio,
        events,
        tasks: stt_tasks,
    } = match stt.connect().await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "STT connection failed");
            close(socket, close_code::ERROR, "Could not connect to speech recognition.").await;
            return;
        }
    };

    tracing::info!(session_id = %session_id, "relay connected");

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<OutFrame>(64);
    let (utterance_tx, utterance_rx) = mpsc::channel::<String>(8);

    // Single writer owns the client's sending half
    let send_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sender.send(Message::Text(frame.encode().into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let mut events_task = tokio::spawn(pump_stt_events(
        events,
        TurnDetector::new(config.voice.format_turns),
        out_tx.clone(),
        utterance_tx,
    ));

    let conversation = Conversation::new(state.session_repo.clone(), llm, state.tools.clone());
    let turn_task = tokio::spawn(run_turns(
        session_id.clone(),
        conversation,
        speaker,
        utterance_rx,
        out_tx,
    ));

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                if audio.send(data).await.is_err() {
                    tracing::warn!(session_id = %session_id, "STT stream closed, dropping connection");
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "client read failed");
                break;
            }
        }
    }

    tracing::info!(session_id = %session_id, "relay client disconnected");

    // Let the vendor flush the last turn before the queue closes
    if let Err(e) = audio.terminate().await {
        tracing::debug!(error = %e, "STT already closed");
    }
    if tokio::time::timeout(STT_DRAIN_TIMEOUT, &mut events_task)
        .await
        .is_err()
    {
        tracing::warn!(session_id = %session_id, "STT did not terminate in time");
        events_task.abort();
    }
    stt_tasks.abort();
    drop(audio);

    if let Err(e) = turn_task.await {
        tracing::error!(error = %e, "turn worker panicked");
    }
    send_task.abort();
}
