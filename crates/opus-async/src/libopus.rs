//! libopus backend via the `opus` crate.

use crate::backend::{Application, Bitrate, CodecBackend, NativeDecoder, NativeEncoder};
use crate::error::ErrorCode;

/// Codec backend backed by libopus.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibOpus;

struct OpusDecoder(opus::Decoder);

struct OpusEncoder(opus::Encoder);

fn native_code(err: opus::Error) -> ErrorCode {
    ErrorCode(err.code() as i32)
}

/// Status as returned by the C API: a count, or the error code.
fn status(result: Result<usize, opus::Error>) -> i32 {
    match result {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(e) => native_code(e).code(),
    }
}

fn channels(channels: u16) -> Result<opus::Channels, ErrorCode> {
    match channels {
        1 => Ok(opus::Channels::Mono),
        2 => Ok(opus::Channels::Stereo),
        _ => Err(ErrorCode::BAD_ARG),
    }
}

impl CodecBackend for LibOpus {
    fn create_decoder(
        &self,
        sample_rate: u32,
        channel_count: u16,
    ) -> Result<Box<dyn NativeDecoder>, ErrorCode> {
        let decoder =
            opus::Decoder::new(sample_rate, channels(channel_count)?).map_err(native_code)?;
        Ok(Box::new(OpusDecoder(decoder)))
    }

    fn create_encoder(
        &self,
        sample_rate: u32,
        channel_count: u16,
        application: Application,
    ) -> Result<Box<dyn NativeEncoder>, ErrorCode> {
        let application = match application {
            Application::Voip => opus::Application::Voip,
            Application::Audio => opus::Application::Audio,
        };
        let encoder = opus::Encoder::new(sample_rate, channels(channel_count)?, application)
            .map_err(native_code)?;
        Ok(Box::new(OpusEncoder(encoder)))
    }
}

impl NativeDecoder for OpusDecoder {
    fn decode(&mut self, packet: &[u8], pcm: &mut [i16], fec: bool) -> i32 {
        status(self.0.decode(packet, pcm, fec))
    }
}

impl NativeEncoder for OpusEncoder {
    fn encode(&mut self, pcm: &[i16], packet: &mut [u8]) -> i32 {
        status(self.0.encode(pcm, packet))
    }

    fn set_bitrate(&mut self, bitrate: Bitrate) -> i32 {
        let value = match bitrate {
            Bitrate::Max => opus::Bitrate::Max,
            Bitrate::Bits(bits) => opus::Bitrate::Bits(bits),
        };
        match self.0.set_bitrate(value) {
            Ok(()) => ErrorCode::OK.code(),
            Err(e) => native_code(e).code(),
        }
    }
}
