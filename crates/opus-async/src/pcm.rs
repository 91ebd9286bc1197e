//! PCM byte layout and buffer sizing.
//!
//! PCM crosses the value boundary as a byte string of interleaved signed 16-bit
//! samples in native byte order:
//! `frame0[ch0], frame0[ch1], ..., frame1[ch0], frame1[ch1], ...`

/// Bytes per sample.
pub const SAMPLE_BYTES: usize = 2;

/// Longest frame a decoder may return, in milliseconds.
pub const MAX_FRAME_MS: usize = 120;

/// Reinterpret native-endian bytes as samples; a trailing odd byte is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|b| i16::from_ne_bytes([b[0], b[1]]))
        .collect()
}

pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * SAMPLE_BYTES);
    for s in samples {
        out.extend_from_slice(&s.to_ne_bytes());
    }
    out
}

/// Per-channel capacity of a decode buffer: the longest frame at `sample_rate`.
pub fn max_decode_frame(sample_rate: u32) -> usize {
    sample_rate as usize * MAX_FRAME_MS / 1000
}

/// Per-channel frame size for an encode input of `len` bytes.
///
/// Truncating: bytes that do not form a whole interleaved frame are ignored.
pub fn encode_frame_size(len: usize, channels: u16) -> usize {
    match channels {
        0 => 0,
        ch => len / ch as usize / SAMPLE_BYTES,
    }
}

/// Per-channel frame size for `frame_ms` milliseconds at `sample_rate`.
pub fn frame_samples(sample_rate: u32, frame_ms: u32) -> usize {
    (sample_rate as u64 * frame_ms as u64 / 1000) as usize
}
