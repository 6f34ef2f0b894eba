//! Upstream service configuration.
//!
//! Each client gets its own config struct. API keys are never printed:
//! the `Debug` impls redact them, matching how the rest of the platform
//! treats credential material.

use serde::{Deserialize, Serialize};
use std::fmt;

fn default_stt_url() -> String {
    "wss://api.deepgram.com/v1/listen".to_string()
}

fn default_reply_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_reply_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_tts_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_tts_model() -> String {
    "eleven_monolingual_v1".to_string()
}

fn default_timeout_seconds() -> u64 {
    15
}

/// Live speech-recognition connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "default_stt_url")]
    pub url: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub api_key: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url: default_stt_url(),
            api_key: String::new(),
        }
    }
}

impl fmt::Debug for SttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SttConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Reply generation (chat completions) settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    #[serde(default = "default_reply_url")]
    pub url: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_reply_model")]
    pub model: String,
    /// Request timeout; past this the session speaks the apology line
    /// instead of hanging.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            url: default_reply_url(),
            api_key: String::new(),
            model: default_reply_model(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl fmt::Debug for ReplyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Speech synthesis settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Base URL of the synthesis API.
    #[serde(default = "default_tts_url")]
    pub url: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tts_model")]
    pub model_id: String,
    /// Voice used when an agent has no voice of its own.
    #[serde(default)]
    pub default_voice_id: String,
    /// Output encoding requested from the provider. `ulaw_8000` comes
    /// back line-ready for telephony; PCM formats go through the codec
    /// module first.
    #[serde(default = "TtsConfig::default_output_format")]
    pub output_format: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl TtsConfig {
    fn default_output_format() -> String {
        "ulaw_8000".to_string()
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: default_tts_url(),
            api_key: String::new(),
            model_id: default_tts_model(),
            default_voice_id: String::new(),
            output_format: Self::default_output_format(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model_id", &self.model_id)
            .field("default_voice_id", &self.default_voice_id)
            .field("output_format", &self.output_format)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}
