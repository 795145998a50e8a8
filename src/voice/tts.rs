//! Text-to-speech (TTS) processing
//!
//! Murf is used in two ways: a streaming WebSocket that yields base64 WAV
//! chunks as they are rendered, and the REST generate endpoint for a single
//! finished clip.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Error, Result};

/// Frame received from the streaming TTS socket
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TtsFrame {
    /// Base64 WAV audio, if the frame carries any
    pub audio: Option<String>,
    /// Last frame for the context
    pub is_final: bool,
    /// Vendor error
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    audio: Option<String>,
    #[serde(default, rename = "final")]
    is_final: bool,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Parse one text frame from the streaming API
#[must_use]
pub fn parse_frame(text: &str) -> Option<TtsFrame> {
    let raw: RawFrame = serde_json::from_str(text).ok()?;
    let error = raw.error.map(|e| match e {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    });

    Some(TtsFrame {
        audio: raw.audio.filter(|a| !a.is_empty()),
        is_final: raw.is_final,
        error,
    })
}

/// Streaming TTS client
#[derive(Debug, Clone)]
pub struct StreamingTts {
    url: String,
    api_key: String,
    voice: String,
    sample_rate: u32,
}

impl StreamingTts {
    /// Create a streaming client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(url: String, api_key: String, voice: String, sample_rate: u32) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Murf API key required for TTS".to_string()));
        }

        Ok(Self {
            url,
            api_key,
            voice,
            sample_rate,
        })
    }

    /// Full connection URL
    #[must_use]
    pub fn connect_url(&self) -> String {
        format!(
            "{}?api-key={}&sample_rate={}&channel_type=MONO&format=WAV",
            self.url,
            urlencoding::encode(&self.api_key),
            self.sample_rate
        )
    }

    /// Start synthesizing `text` under `context_id`
    ///
    /// # Errors
    ///
    /// Returns error if the connection or the initial messages fail
    pub async fn open(&self, text: &str, context_id: &str) -> Result<TtsStream> {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.connect_url())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "TTS connection failed");
                e
            })?;

        let voice_config = serde_json::json!({
            "voice_config": { "voiceId": self.voice },
            "context_id": context_id,
        });
        ws.send(Message::text(voice_config.to_string())).await?;

        let payload = serde_json::json!({
            "text": text,
            "end": true,
            "context_id": context_id,
        });
        ws.send(Message::text(payload.to_string())).await?;

        tracing::debug!(context_id, chars = text.len(), "TTS text sent");

        Ok(TtsStream {
            ws,
            pending_final: false,
            done: false,
        })
    }
}

/// Audio chunks for one synthesis request
pub struct TtsStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending_final: bool,
    done: bool,
}

impl TtsStream {
    /// Next base64 audio chunk, `None` once the vendor marks the context final
    ///
    /// # Errors
    ///
    /// Returns error if the vendor reports an error or the socket drops early
    pub async fn next_chunk(&mut self) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }
        if self.pending_final {
            self.finish().await;
            return Ok(None);
        }

        while let Some(msg) = self.ws.next().await {
            let text = match msg? {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let Some(frame) = parse_frame(text.as_str()) else {
                continue;
            };
            if let Some(error) = frame.error {
                self.done = true;
                return Err(Error::Tts(error));
            }

            match (frame.audio, frame.is_final) {
                (Some(audio), true) => {
                    self.pending_final = true;
                    return Ok(Some(audio));
                }
                (Some(audio), false) => return Ok(Some(audio)),
                (None, true) => {
                    self.finish().await;
                    return Ok(None);
                }
                (None, false) => {}
            }
        }

        self.done = true;
        Err(Error::Tts("stream closed before final chunk".to_string()))
    }

    async fn finish(&mut self) {
        self.done = true;
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "TTS close failed");
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
    format: &'a str,
    sample_rate: u32,
    encode_as_base64: bool,
}

/// Result of a batch synthesis
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSpeech {
    /// Hosted audio URL
    #[serde(default)]
    pub audio_file: Option<String>,
    /// Inline base64 audio, present when requested
    #[serde(default)]
    pub encoded_audio: Option<String>,
}

/// Batch TTS client
pub struct BatchTts {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    voice: String,
    sample_rate: u32,
}

impl BatchTts {
    /// Create a batch client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(base_url: String, api_key: String, voice: String, sample_rate: u32) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Murf API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            voice,
            sample_rate,
        })
    }

    /// Synthesize a complete clip
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn generate(&self, text: &str, inline: bool) -> Result<GeneratedSpeech> {
        tracing::debug!(chars = text.len(), inline, "batch synthesis");

        let request = GenerateRequest {
            text,
            voice_id: &self.voice,
            format: "WAV",
            sample_rate: self.sample_rate,
            encode_as_base64: inline,
        };

        let response = self
            .client
            .post(format!("{}/v1/speech/generate", self.base_url))
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Murf API error");
            return Err(Error::Tts(format!("Murf API error {status}: {body}")));
        }

        let speech: GeneratedSpeech = response.json().await?;
        if speech.audio_file.is_none() && speech.encoded_audio.is_none() {
            return Err(Error::Tts("Murf returned no audio".to_string()));
        }
        Ok(speech)
    }

    /// Base64 audio of a clip, downloading the hosted file when not inline
    ///
    /// # Errors
    ///
    /// Returns error if the clip has no audio or the download fails
    pub async fn encoded_audio(&self, speech: GeneratedSpeech) -> Result<String> {
        if let Some(b64) = speech.encoded_audio {
            return Ok(b64);
        }
        let url = speech
            .audio_file
            .ok_or_else(|| Error::Tts("Murf returned no audio".to_string()))?;

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Tts(format!(
                "audio download failed: {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await?;
        Ok(BASE64.encode(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audio_frame() {
        let frame = parse_frame(r#"{"audio":"UklGRg==","context_id":"c1"}"#).unwrap();
        assert_eq!(frame.audio.as_deref(), Some("UklGRg=="));
        assert!(!frame.is_final);
        assert!(frame.error.is_none());
    }

    #[test]
    fn parses_final_frame() {
        let frame = parse_frame(r#"{"final":true,"context_id":"c1"}"#).unwrap();
        assert!(frame.audio.is_none());
        assert!(frame.is_final);
    }

    #[test]
    fn parses_final_frame_with_audio() {
        let frame = parse_frame(r#"{"audio":"AAAA","final":true}"#).unwrap();
        assert_eq!(frame.audio.as_deref(), Some("AAAA"));
        assert!(frame.is_final);
    }

    #[test]
    fn parses_error_frame() {
        let frame = parse_frame(r#"{"error":"Invalid voice"}"#).unwrap();
        assert_eq!(frame.error.as_deref(), Some("Invalid voice"));
    }

    #[test]
    fn connect_url_encodes_key() {
        let tts = StreamingTts::new(
            "wss://api.murf.ai/v1/speech/stream-input".to_string(),
            "a b".to_string(),
            "en-US-amara".to_string(),
            24_000,
        )
        .unwrap();
        assert_eq!(
            tts.connect_url(),
            "wss://api.murf.ai/v1/speech/stream-input?api-key=a%20b&sample_rate=24000&channel_type=MONO&format=WAV"
        );
    }

    #[test]
    fn generated_speech_shape() {
        let speech: GeneratedSpeech = serde_json::from_str(
            r#"{"audioFile":"https://murf.ai/a.wav","audioLengthInSeconds":1.2,"encodedAudio":null}"#,
        )
        .unwrap();
        assert_eq!(speech.audio_file.as_deref(), Some("https://murf.ai/a.wav"));
        assert!(speech.encoded_audio.is_none());
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(StreamingTts::new("wss://x".into(), String::new(), "v".into(), 24_000).is_err());
        assert!(BatchTts::new("https://x".into(), String::new(), "v".into(), 24_000).is_err());
    }

    #[tokio::test]
    async fn hosted_clip_is_downloaded_and_encoded() {
        let app = axum::Router::new().route("/a.wav", axum::routing::get(|| async { "RIFF" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let tts = BatchTts::new("https://x".into(), "k".into(), "v".into(), 24_000).unwrap();
        let speech = GeneratedSpeech {
            audio_file: Some(format!("http://{addr}/a.wav")),
            encoded_audio: None,
        };
        assert_eq!(tts.encoded_audio(speech).await.unwrap(), "UklGRg==");

        let inline = GeneratedSpeech {
            audio_file: None,
            encoded_audio: Some("AAAA".into()),
        };
        assert_eq!(tts.encoded_audio(inline).await.unwrap(), "AAAA");
    }
}
