//! Value-list boundary for embedding in a dynamically typed host.
//!
//! Every entry point answers with a list of values: one value on success, or
//! `(nil, code)` on failure.

use job_runtime::RuntimeHandle;

use crate::backend::CodecBackend;
use crate::error::ErrorCode;
use crate::session::{self, DecoderHandle, EncoderHandle};

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Integer(i64),
    Bytes(Vec<u8>),
    Decoder(DecoderHandle),
    Encoder(EncoderHandle),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

/// Convert a result into the host's value-list convention.
pub fn values<T: Into<Value>>(result: Result<T, ErrorCode>) -> Vec<Value> {
    match result {
        Ok(v) => vec![v.into()],
        Err(code) => vec![Value::Nil, Value::Integer(code.code() as i64)],
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<DecoderHandle> for Value {
    fn from(h: DecoderHandle) -> Self {
        Value::Decoder(h)
    }
}

impl From<EncoderHandle> for Value {
    fn from(h: EncoderHandle) -> Self {
        Value::Encoder(h)
    }
}

/// `new_decoder(sample_rate, channels)` -> `decoder` | `(nil, code)`.
pub fn new_decoder(backend: &dyn CodecBackend, sample_rate: i64, channels: i64) -> Vec<Value> {
    let result = match (u32::try_from(sample_rate), u16::try_from(channels)) {
        (Ok(rate), Ok(ch)) => session::create_decoder(backend, rate, ch),
        _ => Err(ErrorCode::BAD_ARG),
    };
    values(result)
}

/// `new_encoder(sample_rate, channels, bitrate, voice_optimized)` -> `encoder` | `(nil, code)`.
///
/// Out-of-range bitrates saturate; any non-positive bitrate means "maximum".
pub fn new_encoder(
    backend: &dyn CodecBackend,
    sample_rate: i64,
    channels: i64,
    bitrate: i64,
    voice_optimized: bool,
) -> Vec<Value> {
    let bitrate = bitrate.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    let result = match (u32::try_from(sample_rate), u16::try_from(channels)) {
        (Ok(rate), Ok(ch)) => {
            session::create_encoder(backend, rate, ch, bitrate, voice_optimized)
        }
        _ => Err(ErrorCode::BAD_ARG),
    };
    values(result)
}

/// `decoder:decode(bytes, fec)` -> `pcm` | `(nil, code)`, after suspending.
pub async fn decode(rt: &RuntimeHandle, decoder: &DecoderHandle, input: &[u8], fec: bool) -> Vec<Value> {
    let reply = decoder.decode(rt, input, fec);
    values(reply.await)
}

/// `encoder:encode(pcm)` -> `packet` | `(nil, code)`, after suspending.
pub async fn encode(rt: &RuntimeHandle, encoder: &EncoderHandle, pcm: &[u8]) -> Vec<Value> {
    let reply = encoder.encode(rt, pcm);
    values(reply.await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, fake_packet};
    use job_runtime::{Runtime, RuntimeConfig};

    fn runtime() -> Runtime {
        Runtime::new(&RuntimeConfig {
            workers: 2,
            queue_capacity: None,
            thread_name: "value-test".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn new_decoder_success_is_one_value() {
        let backend = FakeBackend::new();
        let out = new_decoder(&backend, 48_000, 2);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Value::Decoder(d) if d.channels() == 2));
    }

    #[test]
    fn new_decoder_failure_is_nil_and_code() {
        let backend = FakeBackend::new();
        let out = new_decoder(&backend, 48_000, 7);
        assert_eq!(out.len(), 2);
        assert!(out[0].is_nil());
        assert_eq!(out[1].as_integer(), Some(-1));
    }

    #[test]
    fn new_decoder_out_of_range_integers_are_bad_args() {
        let backend = FakeBackend::new();
        let out = new_decoder(&backend, -48_000, 2);
        assert_eq!(out[1].as_integer(), Some(ErrorCode::BAD_ARG.code() as i64));
        assert_eq!(backend.log().decoder_attempts, 0);
    }

    #[test]
    fn new_encoder_success_is_one_value() {
        let backend = FakeBackend::new();
        let out = new_encoder(&backend, 48_000, 2, -1, false);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Value::Encoder(_)));
    }

    #[test]
    fn new_encoder_saturates_huge_bitrate() {
        let backend = FakeBackend::new();
        let out = new_encoder(&backend, 48_000, 1, i64::MAX, false);
        assert_eq!(out.len(), 1);
        assert_eq!(
            backend.log().bitrates,
            vec![crate::backend::Bitrate::Bits(i32::MAX)]
        );
    }

    #[test]
    fn decode_reply_shapes() {
        let rt = runtime();
        let backend = FakeBackend::new();
        let dec = match new_decoder(&backend, 48_000, 1).remove(0) {
            Value::Decoder(d) => d,
            other => panic!("expected decoder, got {other:?}"),
        };
        let h = rt.handle();

        let (ok, err) = rt
            .block_on(async move {
                let ok = decode(&h, &dec, &fake_packet(3, 0, 1), false).await;
                let err = decode(&h, &dec, &[], false).await;
                (ok, err)
            })
            .unwrap();

        assert_eq!(ok.len(), 1);
        assert!(!ok[0].as_bytes().unwrap().is_empty());
        assert_eq!(err.len(), 2);
        assert!(err[0].is_nil());
        assert!(err[1].as_integer().unwrap() < 0);
    }

    #[test]
    fn encode_reply_shapes() {
        let rt = runtime();
        let backend = FakeBackend::new();
        let enc = crate::session::create_encoder(&backend, 48_000, 2, 0, false).unwrap();
        let h = rt.handle();

        let out = rt
            .block_on(async move { encode(&h, &enc, &[0u8; 3840]).await })
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_bytes().map(<[u8]>::len), Some(4));
    }
}
