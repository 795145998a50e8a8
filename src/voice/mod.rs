//! Voice processing module
//!
//! Vendor clients for speech recognition (`AssemblyAI`) and synthesis (Murf),
//! each with a streaming transport for the live socket and a batch transport
//! for uploaded recordings.

pub mod stt;
pub mod tts;

pub use stt::{BatchStt, SttAudio, SttEvent, SttSession, SttTasks, StreamingStt, TurnEvent};
pub use tts::{BatchTts, GeneratedSpeech, StreamingTts, TtsStream};
