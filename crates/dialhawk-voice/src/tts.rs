//! Speech synthesis client.
//!
//! One HTTP request per flushed text fragment. Fragments belonging to a
//! reply must reach the caller in generation order, so the session
//! awaits each synthesis before sending the next — the client itself is
//! stateless.

use crate::config::TtsConfig;
use crate::error::VoiceError;
use serde_json::json;
use std::time::Duration;

/// Maximum text input size for one synthesis request (8 KiB). A flushed
/// fragment is a sentence or two; anything bigger is a bug upstream.
const MAX_TTS_INPUT_BYTES: usize = 8 * 1024;

/// Client for the speech synthesis API.
#[derive(Debug, Clone)]
pub struct SynthesisClient {
    http: reqwest::Client,
    config: TtsConfig,
}

impl SynthesisClient {
    pub fn new(config: TtsConfig) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| VoiceError::Config(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    /// The output encoding this client requests from the provider.
    pub fn output_format(&self) -> &str {
        &self.config.output_format
    }

    /// Synthesizes one text fragment with the given voice, falling back
    /// to the configured default voice when `voice_id` is `None`.
    ///
    /// Returns audio bytes in the configured output encoding
    /// (`ulaw_8000` arrives line-ready for telephony; PCM formats go
    /// through the codec module before transport).
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let voice = match voice_id {
            Some(v) if !v.is_empty() => v,
            _ => self.config.default_voice_id.as_str(),
        };
        if voice.is_empty() {
            return Err(VoiceError::Config(
                "no voice id given and no default voice configured".to_string(),
            ));
        }

        let url = format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.config.url, voice, self.config.output_format
        );

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.config.api_key)
            .json(&json!({
                "text": text,
                "model_id": self.config.model_id,
                "voice_settings": {
                    "stability": 0.4,
                    "similarity_boost": 0.75,
                },
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoiceError::Timeout("synthesis", self.config.timeout_seconds)
                } else {
                    VoiceError::Tts(format!("request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(VoiceError::Tts(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Tts(format!("body read failed: {e}")))?;

        tracing::debug!(bytes = audio.len(), voice, "synthesized fragment");
        Ok(audio.to_vec())
    }
}
