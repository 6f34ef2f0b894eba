//! G.711 mu-law companding and mu-law-domain helpers.

/// The mu-law byte encoding silence (zero amplitude). Telephony streams
/// idle at this value, and injected silence buffers are filled with it.
pub const MULAW_SILENCE: u8 = 0xFF;

/// Mu-law encoding bias (G.711).
const BIAS: i32 = 0x84;

/// Clip level for linear input to the mu-law encoder.
const CLIP: i32 = 32_635;

/// The mu-law byte value at zero deviation; `normalize_mulaw` measures
/// peak amplitude as distance from this level.
const MULAW_MIDPOINT: i32 = 127;

/// Decodes 8-bit mu-law bytes into 16-bit linear PCM samples.
///
/// Standard G.711 expansion: invert the byte, split into sign bit,
/// 3-bit exponent and 4-bit mantissa, then rebuild the biased magnitude.
/// Deterministic, no side effects; an empty input yields an empty vec.
pub fn decode_mulaw(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| expand_sample(b)).collect()
}

fn expand_sample(byte: u8) -> i16 {
    let inverted = !byte;
    let sign = inverted & 0x80;
    let exponent = ((inverted >> 4) & 0x07) as i32;
    let mantissa = (inverted & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -(magnitude as i16)
    } else {
        magnitude as i16
    }
}

/// Encodes 16-bit linear PCM samples into 8-bit mu-law bytes.
///
/// The inverse companding step: synthesized replies arrive as linear PCM
/// and must be squeezed back onto the 8 kHz mu-law line before transport.
pub fn encode_mulaw(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| compress_sample(s)).collect()
}

fn compress_sample(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign: u8 = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };
    if magnitude > CLIP {
        magnitude = CLIP;
    }
    magnitude += BIAS;

    // Exponent is the position of the highest set bit above bit 7.
    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (magnitude & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = ((magnitude >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Returns a buffer of mu-law silence sized for `duration_ms` at
/// `sample_rate` Hz (one byte per sample).
///
/// Injected into the transcription connection during inbound quiet to
/// force the remote endpointer to emit an utterance boundary.
pub fn silence_buffer(duration_ms: u32, sample_rate: u32) -> Vec<u8> {
    let len = (duration_ms as u64 * sample_rate as u64 / 1_000) as usize;
    vec![MULAW_SILENCE; len]
}

/// Rescales a mu-law buffer so the peak absolute deviation from the
/// silence level reaches full scale.
///
/// Returns the input unchanged when it is empty, silent, or already at
/// full scale — in particular this makes the function idempotent, and
/// it never divides by zero on a flat buffer.
pub fn normalize_mulaw(bytes: &[u8]) -> Vec<u8> {
    let peak = bytes
        .iter()
        .map(|&b| (b as i32 - MULAW_MIDPOINT).abs())
        .max()
        .unwrap_or(0);

    if peak == 0 || peak >= MULAW_MIDPOINT {
        return bytes.to_vec();
    }

    bytes
        .iter()
        .map(|&b| {
            let deviation = b as i32 - MULAW_MIDPOINT;
            let scaled = MULAW_MIDPOINT + deviation * MULAW_MIDPOINT / peak;
            scaled.clamp(0, 255) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_decodes_to_zero() {
        assert_eq!(expand_sample(MULAW_SILENCE), 0);
    }

    #[test]
    fn decode_empty_is_empty() {
        assert!(decode_mulaw(&[]).is_empty());
    }

    #[test]
    fn full_scale_magnitudes() {
        // 0x00 carries sign + max exponent/mantissa after inversion.
        assert_eq!(expand_sample(0x00), -32_124);
        assert_eq!(expand_sample(0x80), 32_124);
        // 0x7F is negative zero; it decodes to plain zero.
        assert_eq!(expand_sample(0x7F), 0);
    }

    #[test]
    fn companding_round_trip_is_exact() {
        // Mu-law is lossy against arbitrary PCM, but every code decodes
        // to a value that re-encodes to itself — except negative zero
        // (0x7F), whose sign is unrepresentable in linear zero.
        for byte in 0u8..=255 {
            let pcm = expand_sample(byte);
            let back = compress_sample(pcm);
            let expected = if byte == 0x7F { 0xFF } else { byte };
            assert_eq!(
                back, expected,
                "code {byte:#04x} decoded to {pcm} re-encoded to {back:#04x}"
            );
        }
    }

    #[test]
    fn encode_clips_extremes() {
        assert_eq!(compress_sample(i16::MAX), compress_sample(32_635));
        assert_eq!(compress_sample(i16::MIN), compress_sample(-32_635));
    }

    #[test]
    fn silence_buffer_size_and_fill() {
        let buf = silence_buffer(500, 8_000);
        assert_eq!(buf.len(), 4_000);
        assert!(buf.iter().all(|&b| b == MULAW_SILENCE));
    }

    #[test]
    fn silence_buffer_zero_duration() {
        assert!(silence_buffer(0, 8_000).is_empty());
    }

    #[test]
    fn normalize_silent_buffer_is_noop() {
        let silent = vec![127u8; 160];
        assert_eq!(normalize_mulaw(&silent), silent);
        assert!(normalize_mulaw(&[]).is_empty());
    }

    #[test]
    fn normalize_scales_to_full_range() {
        // Quiet buffer: peak deviation 20.
        let quiet: Vec<u8> = vec![127, 137, 147, 117, 107];
        let loud = normalize_mulaw(&quiet);
        let peak = loud.iter().map(|&b| (b as i32 - 127).abs()).max().unwrap();
        assert_eq!(peak, 127, "peak deviation should reach full scale");
    }

    #[test]
    fn normalize_is_idempotent() {
        let quiet: Vec<u8> = vec![127, 140, 115, 130, 124, 160];
        let once = normalize_mulaw(&quiet);
        let twice = normalize_mulaw(&once);
        assert_eq!(once, twice);
    }
}
