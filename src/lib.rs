//! Voice Relay - live voice assistant relay
//!
//! Accepts microphone audio from a browser, forwards it to a streaming
//! speech-to-text service, answers finished utterances with an LLM that can
//! call lookup tools, and streams the reply back as synthesized speech.
//! Per-session history is kept in SQLite.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Browser client                        │
//! │     PCM16 audio ▲▼ transcripts, replies, audio        │
//! └────────────────────┬─────────────────────────────────┘
//!                      │  /ws, /agent/*
//! ┌────────────────────▼─────────────────────────────────┐
//! │                  Voice Relay                          │
//! │   api  │  relay (turn pipeline)  │  db (history)      │
//! └──────┬──────────────┬──────────────────┬─────────────┘
//!        │              │                  │
//! ┌──────▼─────┐ ┌──────▼───────────┐ ┌────▼─────┐
//! │ AssemblyAI │ │ Gemini + tools   │ │   Murf   │
//! │    STT     │ │ stock/fx/scores  │ │   TTS    │
//! └────────────┘ └──────────────────┘ └──────────┘
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod relay;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
