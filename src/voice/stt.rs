//! Speech-to-text (STT) processing
//!
//! Two `AssemblyAI` transports:
//! - [`StreamingStt`]: Universal Streaming v3 over WebSocket, fed live PCM16 frames
//! - [`BatchStt`]: upload + transcript polling for a complete recording

use std::time::Duration;

use axum::body::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use crate::{Error, Result};

/// Event emitted by a streaming STT session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SttEvent {
    /// Session opened by the vendor
    Begin { id: String },
    /// Transcript update for the current turn
    Turn(TurnEvent),
    /// Vendor finished the session
    Termination,
    /// Vendor reported an error
    Error(String),
}

/// Transcript of the turn in progress
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnEvent {
    pub transcript: String,
    pub end_of_turn: bool,
    pub turn_is_formatted: bool,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum StreamingMessage {
    Begin {
        #[serde(default)]
        id: String,
    },
    Turn {
        #[serde(default)]
        transcript: String,
        #[serde(default)]
        end_of_turn: bool,
        #[serde(default)]
        turn_is_formatted: bool,
    },
    Termination {},
}

/// Parse one text frame from the streaming API
///
/// Returns `None` for frames that carry nothing the relay acts on.
#[must_use]
pub fn parse_event(text: &str) -> Option<SttEvent> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;

    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        return Some(SttEvent::Error(error.to_string()));
    }

    match serde_json::from_value(value).ok()? {
        StreamingMessage::Begin { id } => Some(SttEvent::Begin { id }),
        StreamingMessage::Turn {
            transcript,
            end_of_turn,
            turn_is_formatted,
        } => Some(SttEvent::Turn(TurnEvent {
            transcript,
            end_of_turn,
            turn_is_formatted,
        })),
        StreamingMessage::Termination {} => Some(SttEvent::Termination),
    }
}

/// Input sent toward the streaming STT socket
enum SttInput {
    Audio(Bytes),
    Terminate,
}

/// Handle for pushing audio into a streaming session
#[derive(Clone)]
pub struct SttAudio {
    tx: mpsc::Sender<SttInput>,
}

impl SttAudio {
    /// Forward one audio frame
    ///
    /// # Errors
    ///
    /// Returns error if the STT connection has closed
    pub async fn send(&self, chunk: Bytes) -> Result<()> {
        self.tx
            .send(SttInput::Audio(chunk))
            .await
            .map_err(|_| Error::Stt("stream closed".to_string()))
    }

    /// Ask the vendor to finish the session; remaining turns are flushed before `Termination`
    ///
    /// # Errors
    ///
    /// Returns error if the STT connection has already closed
    pub async fn terminate(&self) -> Result<()> {
        self.tx
            .send(SttInput::Terminate)
            .await
            .map_err(|_| Error::Stt("stream closed".to_string()))
    }
}

/// Socket tasks of a streaming session; aborted on drop
pub struct SttTasks {
    writer: AbortHandle,
    reader: AbortHandle,
}

impl SttTasks {
    /// Stop both socket tasks, releasing the vendor connection
    pub fn abort(&self) {
        self.writer.abort();
        self.reader.abort();
    }
}

impl Drop for SttTasks {
    fn drop(&mut self) {
        self.abort();
    }
}

/// A live streaming STT session
pub struct SttSession {
    /// Audio input handle
    pub audio: SttAudio,
    /// Events from the vendor, ending when the socket closes
    pub events: mpsc::Receiver<SttEvent>,
    /// Handle that tears the connection down
    pub tasks: SttTasks,
}

/// Streaming STT client
#[derive(Debug, Clone)]
pub struct StreamingStt {
    url: String,
    api_key: String,
    sample_rate: u32,
    format_turns: bool,
}

impl StreamingStt {
    /// Create a streaming client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(url: String, api_key: String, sample_rate: u32, format_turns: bool) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("AssemblyAI API key required".to_string()));
        }

        Ok(Self {
            url,
            api_key,
            sample_rate,
            format_turns,
        })
    }

    /// Full connection URL including stream parameters
    #[must_use]
    pub fn connect_url(&self) -> String {
        format!(
            "{}?sample_rate={}&encoding=pcm_s16le&format_turns={}",
            self.url, self.sample_rate, self.format_turns
        )
    }

    /// Open a streaming session
    ///
    /// # Errors
    ///
    /// Returns error if the WebSocket handshake fails
    pub async fn connect(&self) -> Result<SttSession> {
        let mut request = self.connect_url().into_client_request()?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Stt(format!("invalid API key header: {e}")))?,
        );

        let (ws, _) = tokio_tungstenite::connect_async(request).await.map_err(|e| {
            tracing::error!(error = %e, "STT connection failed");
            e
        })?;
        tracing::info!(sample_rate = self.sample_rate, "STT stream connected");

        let (mut write, mut read) = ws.split();
        let (input_tx, mut input_rx) = mpsc::channel::<SttInput>(64);
        let (event_tx, event_rx) = mpsc::channel::<SttEvent>(32);

        let writer = tokio::spawn(async move {
            while let Some(input) = input_rx.recv().await {
                let (msg, last) = match input {
                    SttInput::Audio(chunk) => (Message::Binary(chunk), false),
                    SttInput::Terminate => (Message::text(r#"{"type":"Terminate"}"#), true),
                };
                if let Err(e) = write.send(msg).await {
                    tracing::warn!(error = %e, "STT write failed");
                    break;
                }
                if last {
                    tracing::debug!("STT terminate sent");
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => parse_event(text.as_str()),
                    Ok(Message::Close(frame)) => {
                        match frame {
                            Some(f) if f.code != CloseCode::Normal => {
                                let code = u16::from(f.code);
                                tracing::warn!(code, reason = %f.reason.as_str(), "STT closed with error");
                                let _ = event_tx
                                    .send(SttEvent::Error(format!("closed {code}: {}", f.reason.as_str())))
                                    .await;
                            }
                            _ => tracing::debug!("STT socket closed"),
                        }
                        break;
                    }
                    Ok(_) => None,
                    Err(e) => {
                        tracing::error!(error = %e, "STT read failed");
                        let _ = event_tx.send(SttEvent::Error(e.to_string())).await;
                        break;
                    }
                };

                if let Some(event) = event {
                    let done = event == SttEvent::Termination;
                    if event_tx.send(event).await.is_err() || done {
                        break;
                    }
                }
            }
        });

        Ok(SttSession {
            audio: SttAudio { tx: input_tx },
            events: event_rx,
            tasks: SttTasks {
                writer: writer.abort_handle(),
                reader: reader.abort_handle(),
            },
        })
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Batch STT client for complete recordings
pub struct BatchStt {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl BatchStt {
    /// Create a batch client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("AssemblyAI API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            poll_interval: Duration::from_secs(1),
            max_polls: 300,
        })
    }

    /// Override the transcript polling cadence
    #[must_use]
    pub const fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Transcribe a recording
    ///
    /// Returns the recognized text, which is empty when no speech was found.
    ///
    /// # Errors
    ///
    /// Returns error if any vendor call fails or the transcript ends in error
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting batch transcription");

        let response = self
            .client
            .post(format!("{}/v2/upload", self.base_url))
            .header("authorization", &self.api_key)
            .body(audio.to_vec())
            .send()
            .await?;
        let upload: UploadResponse = Self::checked(response).await?.json().await?;

        let response = self
            .client
            .post(format!("{}/v2/transcript", self.base_url))
            .header("authorization", &self.api_key)
            .json(&serde_json::json!({ "audio_url": upload.upload_url }))
            .send()
            .await?;
        let mut transcript: TranscriptResponse = Self::checked(response).await?.json().await?;

        let mut polls = 0;
        loop {
            match transcript.status.as_str() {
                "completed" => {
                    let text = transcript.text.unwrap_or_default();
                    tracing::info!(transcript = %text, "transcription complete");
                    return Ok(text);
                }
                "error" => {
                    let message = transcript.error.unwrap_or_else(|| "unknown error".to_string());
                    tracing::error!(error = %message, "transcription failed");
                    return Err(Error::Stt(message));
                }
                _ if polls >= self.max_polls => break,
                _ => {}
            }

            polls += 1;
            tokio::time::sleep(self.poll_interval).await;
            let response = self
                .client
                .get(format!("{}/v2/transcript/{}", self.base_url, transcript.id))
                .header("authorization", &self.api_key)
                .send()
                .await?;
            transcript = Self::checked(response).await?.json().await?;
        }

        Err(Error::Stt(format!("transcript {} timed out", transcript.id)))
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "AssemblyAI API error");
        Err(Error::Stt(format!("AssemblyAI API error {status}: {body}")))
    }
}
