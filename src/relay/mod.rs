//! Turn pipeline for a live voice connection
//!
//! ```text
//! client audio ──► STT socket ──► event loop ──► utterance queue ──► turn worker
//!                                    │                                  │
//!                                    └── transcripts            ├── LLM + tools
//!                                                                       ├── history append
//!                                                                       └── TTS chunks
//! ```
//!
//! Everything the client sees goes through one [`OutFrame`] channel drained
//! by a single writer. The turn worker handles utterances strictly in order,
//! so a connection never has two LLM or TTS calls in flight.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::TtsMode;
use crate::db::SessionRepo;
use crate::llm::GeminiClient;
use crate::tools::ToolExecutor;
use crate::voice::{BatchTts, SttEvent, StreamingTts, TurnEvent};
use crate::{Config, Result};

/// Reply used when the model cannot be reached; never stored
pub const LLM_FALLBACK: &str = "I'm having trouble thinking right now. Please try again in a moment.";

/// Text frame sent to the browser client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutFrame {
    /// Latest transcript, partial or final
    Transcript(String),
    /// Assistant reply for a completed turn
    AiResponse(String),
    /// One base64 chunk of synthesized audio
    AudioChunk(String),
    /// No more audio for the current reply
    AudioEnd,
}

impl OutFrame {
    /// Wire text of the frame
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Transcript(text) => text.clone(),
            Self::AiResponse(text) => format!("AI_RESPONSE:{text}"),
            Self::AudioChunk(b64) => format!("AUDIO_CHUNK:{b64}"),
            Self::AudioEnd => "AUDIO_END".to_string(),
        }
    }
}

/// Decides when a streaming turn is complete
#[derive(Debug, Clone, Copy)]
pub struct TurnDetector {
    format_turns: bool,
}

impl TurnDetector {
    #[must_use]
    pub const fn new(format_turns: bool) -> Self {
        Self { format_turns }
    }

    /// Final utterance if this event closes the turn
    ///
    /// With formatting on, the vendor sends an unformatted and then a
    /// formatted end-of-turn event; only the formatted one counts.
    #[must_use]
    pub fn completed(&self, event: &TurnEvent) -> Option<String> {
        if !event.end_of_turn || (self.format_turns && !event.turn_is_formatted) {
            return None;
        }
        let text = event.transcript.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Forward transcripts to the client and queue finished utterances
///
/// Runs until the STT stream ends or the vendor terminates the session.
pub async fn pump_stt_events(
    mut events: mpsc::Receiver<SttEvent>,
    detector: TurnDetector,
    out: mpsc::Sender<OutFrame>,
    utterances: mpsc::Sender<String>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SttEvent::Begin { id } => tracing::debug!(stt_session = %id, "STT session began"),
            SttEvent::Turn(turn) => {
                if !turn.transcript.is_empty() {
                    // Client may be gone; keep draining so the turn queue still fills
                    let _ = out.send(OutFrame::Transcript(turn.transcript.clone())).await;
                }
                if let Some(text) = detector.completed(&turn) {
                    tracing::info!(transcript = %text, "end of turn");
                    if utterances.send(text).await.is_err() {
                        break;
                    }
                }
            }
            SttEvent::Termination => {
                tracing::debug!("STT session terminated");
                break;
            }
            SttEvent::Error(e) => tracing::warn!(error = %e, "STT reported error"),
        }
    }
}

/// One session's dialogue: history, model, tools
#[derive(Clone)]
pub struct Conversation {
    repo: SessionRepo,
    llm: GeminiClient,
    tools: Arc<ToolExecutor>,
}

impl Conversation {
    #[must_use]
    pub const fn new(repo: SessionRepo, llm: GeminiClient, tools: Arc<ToolExecutor>) -> Self {
        Self { repo, llm, tools }
    }

    /// Run one turn and return the text to speak
    ///
    /// A successful reply is appended to history together with the user text.
    /// Model failures yield [`LLM_FALLBACK`], which is not stored.
    ///
    /// # Errors
    ///
    /// Returns error if history cannot be read or written
    pub async fn respond(&self, session_id: &str, user_text: &str) -> Result<String> {
        let history = self.repo.history(session_id)?;

        match self.llm.reply(&history, user_text, &self.tools).await {
            Ok(reply) => {
                self.repo.append_exchange(session_id, user_text, &reply)?;
                tracing::info!(session_id = %session_id, reply = %reply, "turn complete");
                Ok(reply)
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "LLM call failed");
                Ok(LLM_FALLBACK.to_string())
            }
        }
    }
}

/// Speech synthesis for replies
pub enum Speaker {
    /// Stream chunks as Murf renders them
    Stream(StreamingTts),
    /// One clip from the batch endpoint, sent as a single chunk
    Batch(BatchTts),
}

impl Speaker {
    /// Speaker for the configured TTS mode
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn from_config(config: &Config, api_key: String) -> Result<Self> {
        let voice = &config.voice;
        Ok(match voice.tts_mode {
            TtsMode::Stream => Self::Stream(StreamingTts::new(
                config.endpoints.tts_stream.clone(),
                api_key,
                voice.tts_voice.clone(),
                voice.tts_sample_rate,
            )?),
            TtsMode::Batch => Self::Batch(BatchTts::new(
                config.endpoints.tts_batch.clone(),
                api_key,
                voice.tts_voice.clone(),
                voice.tts_sample_rate,
            )?),
        })
    }

    /// Send the audio for `text` followed by `AUDIO_END`
    ///
    /// Returns the number of chunks sent. Synthesis errors are logged and the
    /// terminator is still sent.
    pub async fn speak(&self, text: &str, out: &mpsc::Sender<OutFrame>) -> usize {
        let sent = match self.send_chunks(text, out).await {
            Ok(n) => n,
            Err((n, e)) => {
                tracing::error!(error = %e, chunks = n, "TTS failed");
                n
            }
        };
        let _ = out.send(OutFrame::AudioEnd).await;
        sent
    }

    async fn send_chunks(
        &self,
        text: &str,
        out: &mpsc::Sender<OutFrame>,
    ) -> std::result::Result<usize, (usize, crate::Error)> {
        match self {
            Self::Stream(tts) => {
                let context_id = uuid::Uuid::new_v4().to_string();
                let mut stream = tts.open(text, &context_id).await.map_err(|e| (0, e))?;
                let mut sent = 0;
                while let Some(chunk) = stream.next_chunk().await.map_err(|e| (sent, e))? {
                    if out.send(OutFrame::AudioChunk(chunk)).await.is_err() {
                        break;
                    }
                    sent += 1;
                }
                Ok(sent)
            }
            Self::Batch(tts) => {
                let speech = tts.generate(text, true).await.map_err(|e| (0, e))?;
                let b64 = tts.encoded_audio(speech).await.map_err(|e| (0, e))?;
                let _ = out.send(OutFrame::AudioChunk(b64)).await;
                Ok(1)
            }
        }
    }
}

/// Drain the utterance queue, one turn at a time
///
/// Each utterance yields `AI_RESPONSE`, the audio chunks, then `AUDIO_END`.
pub async fn run_turns(
    session_id: String,
    conversation: Conversation,
    speaker: Speaker,
    mut utterances: mpsc::Receiver<String>,
    out: mpsc::Sender<OutFrame>,
) {
    while let Some(text) = utterances.recv().await {
        let reply = match conversation.respond(&session_id, &text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "history update failed");
                LLM_FALLBACK.to_string()
            }
        };

        if out.send(OutFrame::AiResponse(reply.clone())).await.is_err() {
            tracing::debug!(session_id = %session_id, "client gone, skipping speech");
            continue;
        }
        let chunks = speaker.speak(&reply, &out).await;
        tracing::debug!(session_id = %session_id, chunks, "reply spoken");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(transcript: &str, end_of_turn: bool, formatted: bool) -> TurnEvent {
        TurnEvent {
            transcript: transcript.to_string(),
            end_of_turn,
            turn_is_formatted: formatted,
        }
    }

    #[test]
    fn frames_encode_with_prefixes() {
        assert_eq!(OutFrame::Transcript("what is".into()).encode(), "what is");
        assert_eq!(
            OutFrame::AiResponse("Hi there".into()).encode(),
            "AI_RESPONSE:Hi there"
        );
        assert_eq!(OutFrame::AudioChunk("UklG".into()).encode(), "AUDIO_CHUNK:UklG");
        assert_eq!(OutFrame::AudioEnd.encode(), "AUDIO_END");
    }

    #[test]
    fn unformatted_detector_fires_on_end_of_turn() {
        let detector = TurnDetector::new(false);
        assert_eq!(detector.completed(&turn("hello", false, false)), None);
        assert_eq!(
            detector.completed(&turn(" hello there ", true, false)),
            Some("hello there".to_string())
        );
        assert_eq!(detector.completed(&turn("   ", true, false)), None);
    }

    #[test]
    fn formatted_detector_waits_for_formatted_turn() {
        let detector = TurnDetector::new(true);
        assert_eq!(detector.completed(&turn("hello there", true, false)), None);
        assert_eq!(
            detector.completed(&turn("Hello there.", true, true)),
            Some("Hello there.".to_string())
        );
    }

    #[tokio::test]
    async fn event_loop_forwards_transcripts_and_queues_turns() {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (utt_tx, mut utt_rx) = mpsc::channel(8);

        for event in [
            SttEvent::Begin { id: "b".into() },
            SttEvent::Turn(turn("what is", false, false)),
            SttEvent::Turn(turn("what is the time", true, false)),
            SttEvent::Termination,
            SttEvent::Turn(turn("ignored", true, false)),
        ] {
            event_tx.send(event).await.unwrap();
        }

        pump_stt_events(event_rx, TurnDetector::new(false), out_tx, utt_tx).await;

        assert_eq!(out_rx.recv().await, Some(OutFrame::Transcript("what is".into())));
        assert_eq!(
            out_rx.recv().await,
            Some(OutFrame::Transcript("what is the time".into()))
        );
        assert_eq!(out_rx.recv().await, None);
        assert_eq!(utt_rx.recv().await, Some("what is the time".to_string()));
        assert_eq!(utt_rx.recv().await, None);
    }

    #[test]
    fn speaker_follows_tts_mode() {
        let mut config =
            Config::from_sources(&crate::config::file::RelayConfigFile::default(), |_| None)
                .unwrap();
        assert!(matches!(
            Speaker::from_config(&config, "k".into()).unwrap(),
            Speaker::Stream(_)
        ));

        config.voice.tts_mode = TtsMode::Batch;
        assert!(matches!(
            Speaker::from_config(&config, "k".into()).unwrap(),
            Speaker::Batch(_)
        ));
        assert!(Speaker::from_config(&config, String::new()).is_err());
    }
}
