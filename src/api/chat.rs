//! Batch voice chat: one uploaded recording in, one spoken reply out

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::{ApiState, error_response};
use crate::llm::GeminiClient;
use crate::relay::Conversation;
use crate::voice::{BatchStt, BatchTts};

/// Largest accepted recording
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Batch chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub audio_url: String,
    pub user_query: String,
    pub llm_response: String,
}

/// Batch chat errors
#[derive(Debug)]
pub enum ChatError {
    NotConfigured(&'static str),
    BadRequest(String),
    NoSpeech,
    Vendor(String),
    Database(String),
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::NotConfigured(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "not_configured",
                msg.to_string(),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::NoSpeech => (
                StatusCode::BAD_REQUEST,
                "no_speech",
                "Could not understand audio".to_string(),
            ),
            Self::Vendor(msg) => (StatusCode::BAD_GATEWAY, "vendor_error", msg),
            Self::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "db_error", msg),
        };

        (status, error_response(code, &message)).into_response()
    }
}

impl From<crate::Error> for ChatError {
    fn from(e: crate::Error) -> Self {
        if e.is_vendor() {
            Self::Vendor(e.to_string())
        } else {
            Self::Database(e.to_string())
        }
    }
}

/// Read the `file` field of the upload
async fn read_audio(mut multipart: Multipart) -> Result<Vec<u8>, ChatError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ChatError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            let data = field
                .bytes()
                .await
                .map_err(|e| ChatError::BadRequest(e.to_string()))?;
            if data.is_empty() {
                return Err(ChatError::BadRequest("Empty audio file".to_string()));
            }
            return Ok(data.to_vec());
        }
    }

    Err(ChatError::BadRequest("Missing file field".to_string()))
}

fn server_key(key: Option<&String>, name: &'static str) -> Result<String, ChatError> {
    key.filter(|k| !k.is_empty())
        .cloned()
        .ok_or(ChatError::NotConfigured(name))
}

/// Transcribe, answer, and synthesize one recorded question
pub async fn chat(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ChatResponse>, ChatError> {
    let config = &state.config;
    let keys = &config.api_keys;
    let stt_key = server_key(keys.assemblyai.as_ref(), "AssemblyAI key not configured")?;
    let llm_key = server_key(keys.google_gemini.as_ref(), "Gemini key not configured")?;
    let tts_key = server_key(keys.murf.as_ref(), "Murf key not configured")?;

    let audio = read_audio(multipart).await?;
    tracing::info!(session_id = %session_id, bytes = audio.len(), "batch chat request");

    let stt = BatchStt::new(config.endpoints.stt_batch.clone(), stt_key)?;
    let user_query = stt.transcribe(&audio).await?;
    let user_query = user_query.trim().to_string();
    if user_query.is_empty() {
        return Err(ChatError::NoSpeech);
    }

    let llm = GeminiClient::from_config(config, llm_key)?;
    let conversation = Conversation::new(state.session_repo.clone(), llm, state.tools.clone());
    let llm_response = conversation.respond(&session_id, &user_query).await?;

    let tts = BatchTts::new(
        config.endpoints.tts_batch.clone(),
        tts_key,
        config.voice.tts_voice.clone(),
        config.voice.tts_sample_rate,
    )?;
    let speech = tts.generate(&llm_response, false).await?;
    let audio_url = speech
        .audio_file
        .ok_or_else(|| ChatError::Vendor("Murf returned no audio URL".to_string()))?;

    Ok(Json(ChatResponse {
        audio_url,
        user_query,
        llm_response,
    }))
}
