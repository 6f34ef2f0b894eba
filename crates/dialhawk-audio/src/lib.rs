//! Telephony audio codec primitives for the Dialhawk platform.
//!
//! Everything here is a stateless pure function: ITU G.711 mu-law
//! companding in both directions, minimal WAV container framing for
//! diagnostic capture, silence-buffer generation used to force utterance
//! endpointing, and amplitude normalization.
//!
//! Failure policy: audio corruption must never take down a live call.
//! Malformed or empty input produces an empty (or unchanged) result —
//! nothing in this crate returns an error or panics on bad audio.

mod mulaw;
mod wav;

pub use mulaw::{
    decode_mulaw, encode_mulaw, normalize_mulaw, silence_buffer, MULAW_SILENCE,
};
pub use wav::encode_wav;
