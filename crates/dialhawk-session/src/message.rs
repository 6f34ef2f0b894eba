//! Transport wire messages.
//!
//! The telephony media stream speaks JSON control messages; the browser
//! speaks raw binary audio frames. Everything arriving at a session is
//! decoded in a single step into [`TransportEvent`] and routed by
//! pattern matching — there is exactly one decoder, not per-handler
//! try/catch laddering.

use base64::Engine;
use serde::{Deserialize, Serialize};

/// A decoded inbound transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A JSON control message from the telephony media stream.
    Control(ControlMessage),
    /// A raw binary microphone frame from a browser client.
    BrowserMedia(Vec<u8>),
}

/// Telephony control messages, tagged by their `event` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ControlMessage {
    /// The media stream connected; no stream identifier yet.
    Connected,
    /// The stream is live. Fixes the stream identifier and codec
    /// parameters for the rest of the session.
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    /// One inbound audio frame, base64 mu-law.
    Media {
        #[serde(default)]
        track: Option<String>,
        payload: String,
    },
    /// The caller hung up or the provider tore the stream down.
    Stop,
}

/// Decodes one text frame into a control message.
///
/// Returns `None` for frames that do not parse; the session drops those
/// with a log line and carries on (bad input never kills a call).
pub fn decode_text_frame(text: &str) -> Option<ControlMessage> {
    match serde_json::from_str(text) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!("dropping unparseable control frame: {e}");
            None
        }
    }
}

/// Decodes a base64 media payload. Malformed payloads yield an empty
/// buffer rather than an error.
pub fn decode_media_payload(payload: &str) -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .unwrap_or_else(|e| {
            tracing::debug!("dropping malformed media payload: {e}");
            Vec::new()
        })
}

/// Outbound media frame sent back over the telephony stream.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMediaMessage<'a> {
    pub event: &'static str,
    #[serde(rename = "streamSid")]
    pub stream_sid: &'a str,
    pub media: OutboundMediaPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMediaPayload {
    pub track: &'static str,
    pub chunk: u64,
    pub timestamp: String,
    pub payload: String,
}

/// Encodes one outbound mu-law chunk as a telephony media frame.
///
/// `chunk` is the per-session ordinal of this frame, `timestamp_ms` the
/// media-clock position in milliseconds.
pub fn encode_media_frame(
    stream_sid: &str,
    chunk: u64,
    timestamp_ms: u64,
    audio: &[u8],
) -> String {
    let message = OutboundMediaMessage {
        event: "media",
        stream_sid,
        media: OutboundMediaPayload {
            track: "outbound",
            chunk,
            timestamp: timestamp_ms.to_string(),
            payload: base64::engine::general_purpose::STANDARD.encode(audio),
        },
    };
    // Serialization of this struct cannot fail; fall back to an empty
    // frame rather than propagating an impossibility.
    serde_json::to_string(&message).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_start_message() {
        let frame = r#"{"event":"start","streamSid":"MZ123"}"#;
        assert_eq!(
            decode_text_frame(frame),
            Some(ControlMessage::Start {
                stream_sid: "MZ123".into()
            })
        );
    }

    #[test]
    fn decodes_media_message() {
        let frame = r#"{"event":"media","track":"inbound","payload":"//8="}"#;
        match decode_text_frame(frame) {
            Some(ControlMessage::Media { track, payload }) => {
                assert_eq!(track.as_deref(), Some("inbound"));
                assert_eq!(decode_media_payload(&payload), vec![0xFF, 0xFF]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decodes_connected_and_stop() {
        assert_eq!(
            decode_text_frame(r#"{"event":"connected"}"#),
            Some(ControlMessage::Connected)
        );
        assert_eq!(
            decode_text_frame(r#"{"event":"stop"}"#),
            Some(ControlMessage::Stop)
        );
    }

    #[test]
    fn malformed_frames_are_dropped_not_errors() {
        assert_eq!(decode_text_frame("{not json"), None);
        assert_eq!(decode_text_frame(r#"{"event":"warp"}"#), None);
        assert!(decode_media_payload("!!!not-base64!!!").is_empty());
    }

    #[test]
    fn outbound_frame_shape() {
        let json = encode_media_frame("MZ9", 3, 60, &[0xFF; 4]);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "MZ9");
        assert_eq!(value["media"]["track"], "outbound");
        assert_eq!(value["media"]["chunk"], 3);
        assert_eq!(value["media"]["timestamp"], "60");
        let payload = value["media"]["payload"].as_str().unwrap();
        assert_eq!(decode_media_payload(payload), vec![0xFF; 4]);
    }
}
