//! Configuration management for the voice relay

pub mod file;

use std::path::PathBuf;

use file::RelayConfigFile;

use crate::{Error, Result};

/// Default persona sent to the LLM as its system instruction
pub const DEFAULT_PERSONA: &str = "You are Kratosni, a witty and helpful robot assistant. \
You have access to several tools: you can get real-time stock prices, find live cricket scores, \
and convert currency. You must use these tools when a user asks a relevant question.";

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Voice relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (history database)
    pub data_dir: PathBuf,

    /// API keys
    pub api_keys: ApiKeys,

    /// HTTP/WebSocket server configuration
    pub server: ServerConfig,

    /// LLM configuration
    pub llm: LlmConfig,

    /// Voice processing configuration
    pub voice: VoiceConfig,

    /// Vendor base URLs
    pub endpoints: Endpoints,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (browser frontend)
    pub static_dir: Option<PathBuf>,
}

/// LLM dialogue configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier
    pub model: String,

    /// System instruction describing the assistant
    pub persona: String,

    /// Max function-call rounds before the reply is taken as-is
    pub max_tool_rounds: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            persona: DEFAULT_PERSONA.to_string(),
            max_tool_rounds: 3,
        }
    }
}

/// How synthesized speech is fetched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TtsMode {
    /// Murf streaming WebSocket, chunks forwarded as they arrive
    #[default]
    Stream,
    /// Murf REST generate, a single chunk per reply
    Batch,
}

impl TtsMode {
    /// Parse a mode name, case-insensitively
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" | "streaming" => Some(Self::Stream),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Sample rate of client audio (PCM16 mono)
    pub sample_rate: u32,

    /// Request formatted turns from STT; only formatted end-of-turn events then complete a turn
    pub format_turns: bool,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS output sample rate
    pub tts_sample_rate: u32,

    /// Streaming or batch synthesis
    pub tts_mode: TtsMode,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            format_turns: false,
            tts_voice: "en-US-amara".to_string(),
            tts_sample_rate: 24_000,
            tts_mode: TtsMode::Stream,
        }
    }
}

/// API keys for external services
///
/// Vendor keys are fallbacks for keys supplied per connection by the client.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `AssemblyAI` key (STT)
    pub assemblyai: Option<String>,

    /// Google Gemini key (LLM)
    pub google_gemini: Option<String>,

    /// Murf key (TTS)
    pub murf: Option<String>,

    /// Alpha Vantage key (stock quotes)
    pub alpha_vantage: Option<String>,

    /// `RapidAPI` key (live cricket scores)
    pub rapidapi: Option<String>,

    /// ExchangeRate-API key (currency conversion)
    pub exchange_rate: Option<String>,
}

/// Vendor base URLs
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub stt_stream: String,
    pub stt_batch: String,
    pub llm: String,
    pub tts_stream: String,
    pub tts_batch: String,
    pub stock: String,
    pub currency: String,
    pub scores: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            stt_stream: "wss://streaming.assemblyai.com/v3/ws".to_string(),
            stt_batch: "https://api.assemblyai.com".to_string(),
            llm: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            tts_stream: "wss://api.murf.ai/v1/speech/stream-input".to_string(),
            tts_batch: "https://api.murf.ai".to_string(),
            stock: "https://www.alphavantage.co".to_string(),
            currency: "https://v6.exchangerate-api.com".to_string(),
            scores: "https://cricbuzz-cricket-match-api.p.rapidapi.com".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the environment, and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but malformed
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let fc = file::load_config_file();
        let config = Self::from_sources(&fc, |key| std::env::var(key).ok())?;

        std::fs::create_dir_all(&config.data_dir)?;
        Ok(config)
    }

    /// Resolve configuration with precedence env > file > default
    ///
    /// `env` looks up a variable by name; tests pass a map instead of the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if a port, number, or mode cannot be parsed
    pub fn from_sources<F>(fc: &RelayConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_keys = ApiKeys {
            assemblyai: env("ASSEMBLYAI_API_KEY").or_else(|| fc.api_keys.assemblyai.clone()),
            google_gemini: env("GOOGLE_API_KEY")
                .or_else(|| env("GEMINI_API_KEY"))
                .or_else(|| fc.api_keys.google_gemini.clone()),
            murf: env("MURF_API_KEY").or_else(|| fc.api_keys.murf.clone()),
            alpha_vantage: env("ALPHA_VANTAGE_API_KEY")
                .or_else(|| fc.api_keys.alpha_vantage.clone()),
            rapidapi: env("RAPIDAPI_KEY").or_else(|| fc.api_keys.rapidapi.clone()),
            exchange_rate: env("EXCHANGE_RATE_API_KEY")
                .or_else(|| fc.api_keys.exchange_rate.clone()),
        };

        let port = match env("RELAY_PORT").or_else(|| env("PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid port: {raw}")))?,
            None => fc.server.port.unwrap_or(8000),
        };

        let static_dir = env("RELAY_STATIC_DIR")
            .or_else(|| fc.server.static_dir.clone())
            .map(PathBuf::from)
            .or_else(|| {
                let local = PathBuf::from("frontend");
                local.is_dir().then_some(local)
            });

        let data_dir = env("RELAY_DATA_DIR")
            .or_else(|| fc.server.data_dir.clone())
            .map_or_else(default_data_dir, PathBuf::from);

        let llm_default = LlmConfig::default();
        let max_tool_rounds = match env("RELAY_MAX_TOOL_ROUNDS") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid max_tool_rounds: {raw}")))?,
            None => fc.llm.max_tool_rounds.unwrap_or(llm_default.max_tool_rounds),
        };
        let llm = LlmConfig {
            model: env("RELAY_LLM_MODEL")
                .or_else(|| fc.llm.model.clone())
                .unwrap_or(llm_default.model),
            persona: env("RELAY_PERSONA")
                .or_else(|| fc.llm.persona.clone())
                .unwrap_or(llm_default.persona),
            max_tool_rounds,
        };

        let voice_default = VoiceConfig::default();
        let tts_mode = match env("RELAY_TTS_MODE").or_else(|| fc.voice.tts_mode.clone()) {
            Some(raw) => TtsMode::parse(&raw)
                .ok_or_else(|| Error::Config(format!("invalid tts_mode: {raw}")))?,
            None => voice_default.tts_mode,
        };
        let voice = VoiceConfig {
            sample_rate: fc.voice.sample_rate.unwrap_or(voice_default.sample_rate),
            format_turns: env("RELAY_FORMAT_TURNS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.voice.format_turns)
                .unwrap_or(voice_default.format_turns),
            tts_voice: env("RELAY_TTS_VOICE")
                .or_else(|| fc.voice.tts_voice.clone())
                .unwrap_or(voice_default.tts_voice),
            tts_sample_rate: fc
                .voice
                .tts_sample_rate
                .unwrap_or(voice_default.tts_sample_rate),
            tts_mode,
        };

        let defaults = Endpoints::default();
        let ep = &fc.endpoints;
        let endpoints = Endpoints {
            stt_stream: ep.stt_stream.clone().unwrap_or(defaults.stt_stream),
            stt_batch: ep.stt_batch.clone().unwrap_or(defaults.stt_batch),
            llm: ep.llm.clone().unwrap_or(defaults.llm),
            tts_stream: ep.tts_stream.clone().unwrap_or(defaults.tts_stream),
            tts_batch: ep.tts_batch.clone().unwrap_or(defaults.tts_batch),
            stock: ep.stock.clone().unwrap_or(defaults.stock),
            currency: ep.currency.clone().unwrap_or(defaults.currency),
            scores: ep.scores.clone().unwrap_or(defaults.scores),
        };

        Ok(Self {
            data_dir,
            api_keys,
            server: ServerConfig { port, static_dir },
            llm,
            voice,
            endpoints,
        })
    }

    /// Path of the history database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("relay.db")
    }
}

/// Default data directory: `~/.local/share/voice-relay` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".voice-relay"),
        |d| d.data_dir().join("voice-relay"),
    )
}
