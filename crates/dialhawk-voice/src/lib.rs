//! Upstream voice-service clients for the Dialhawk platform.
//!
//! Three network clients make up the speech side of a call:
//!
//! - [`stt`] — a live bidirectional speech-recognition connection:
//!   stream audio frames up, receive interim/final transcript events
//!   down, with keepalive and graceful shutdown.
//! - [`reply`] — the response generator: streams reply tokens from a
//!   chat-completions endpoint and watches the stream for a structured
//!   appointment-booking intent.
//! - [`tts`] — speech synthesis: one HTTP request per flushed text
//!   fragment, returning audio bytes in the requested output encoding.
//!
//! All three report failures through [`VoiceError`]; none of them crash
//! a session — the session state machine decides whether to retry or
//! fall back to the apology utterance.

pub mod config;
pub mod error;
pub mod reply;
pub mod stt;
pub mod tts;

pub use config::{ReplyConfig, SttConfig, TtsConfig};
pub use error::VoiceError;
pub use reply::{detect_booking_intent, should_flush, ChatTurn, ReplyEvent, ReplyGenerator};
pub use stt::{
    SttEvent, SttState, StreamParams, TranscriberClient, TranscriptEvent, KEEPALIVE_INTERVAL_SECS,
};
pub use tts::SynthesisClient;
