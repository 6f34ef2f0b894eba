//! Per-call session pipeline for the Dialhawk platform.
//!
//! A session owns one live audio connection — a telephony media stream
//! or a browser microphone — and orchestrates the speech pipeline in
//! response to transport events: audio in → live transcription → (on a
//! completed utterance) reply generation → speech synthesis → telephony
//! transcode → paced audio out.
//!
//! Transport frames are decoded once into a tagged [`message::TransportEvent`]
//! and routed by pattern matching; collaborators are injected through
//! the traits in [`collaborators`], so the state machine is testable
//! with in-memory fakes end to end.

pub mod collaborators;
pub mod error;
pub mod message;
pub mod session;

pub use collaborators::{
    BookingSink, NullObserver, OutboundSink, ReplySource, SessionDeps, SessionObserver,
    Synthesizer, TranscriberFactory, TranscriberHandle,
};
pub use error::SessionError;
pub use message::{decode_text_frame, ControlMessage, TransportEvent};
pub use session::{Session, SessionConfig, SessionState, TransportKind};
