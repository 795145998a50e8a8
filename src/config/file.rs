//! TOML configuration file loading
//!
//! Supports `~/.config/voice-relay/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfigFile {
    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Vendor base URL overrides
    #[serde(default)]
    pub endpoints: EndpointsFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// HTTP/WebSocket port
    pub port: Option<u16>,

    /// Directory holding the browser frontend
    pub static_dir: Option<String>,

    /// Directory holding the history database
    pub data_dir: Option<String>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gemini-1.5-flash")
    pub model: Option<String>,

    /// Assistant persona sent as the system instruction
    pub persona: Option<String>,

    /// Max function-call rounds per turn
    pub max_tool_rounds: Option<u32>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Input sample rate expected by STT
    pub sample_rate: Option<u32>,

    /// Ask STT for formatted turns
    pub format_turns: Option<bool>,

    /// TTS voice identifier (e.g. "en-US-amara")
    pub tts_voice: Option<String>,

    /// TTS output sample rate
    pub tts_sample_rate: Option<u32>,

    /// "stream" or "batch"
    pub tts_mode: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub assemblyai: Option<String>,
    pub google_gemini: Option<String>,
    pub murf: Option<String>,
    pub alpha_vantage: Option<String>,
    pub rapidapi: Option<String>,
    pub exchange_rate: Option<String>,
}

/// Vendor endpoint overrides
#[derive(Debug, Default, Deserialize)]
pub struct EndpointsFileConfig {
    pub stt_stream: Option<String>,
    pub stt_batch: Option<String>,
    pub llm: Option<String>,
    pub tts_stream: Option<String>,
    pub tts_batch: Option<String>,
    pub stock: Option<String>,
    pub currency: Option<String>,
    pub scores: Option<String>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the contents are not valid TOML for this schema
pub fn parse_config_file(content: &str) -> Result<RelayConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `RelayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> RelayConfigFile {
    let Some(path) = config_file_path() else {
        return RelayConfigFile::default();
    };

    if !path.exists() {
        return RelayConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                RelayConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RelayConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voice-relay/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-relay").join("config.toml"))
}
