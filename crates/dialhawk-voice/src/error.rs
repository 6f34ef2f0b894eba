use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("transcription error: {0}")]
    Stt(String),

    #[error("reply generation error: {0}")]
    Reply(String),

    #[error("synthesis error: {0}")]
    Tts(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0} request timed out after {1} seconds")]
    Timeout(&'static str, u64),
}
