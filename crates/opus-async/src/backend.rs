//! Seam to the native codec library.
//!
//! The traits mirror the C contract: constructors report an error code, codec
//! calls return a positive count or a non-positive status. Implementations are
//! not required to be reentrant; sessions serialize access to them.

use crate::error::ErrorCode;

/// Encoder tuning profile chosen at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Application {
    /// Speech-optimized (libopus `OPUS_APPLICATION_VOIP`).
    Voip,
    /// General audio (libopus `OPUS_APPLICATION_AUDIO`).
    Audio,
}

impl Application {
    pub fn from_voice_optimized(voice_optimized: bool) -> Self {
        if voice_optimized {
            Application::Voip
        } else {
            Application::Audio
        }
    }
}

/// Target encoder bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitrate {
    /// Highest bitrate the codec supports.
    Max,
    /// Explicit bits per second.
    Bits(i32),
}

impl Bitrate {
    /// Map a caller-supplied bitrate: `<= 0` means "maximum".
    pub fn from_requested(bitrate: i32) -> Self {
        if bitrate <= 0 {
            Bitrate::Max
        } else {
            Bitrate::Bits(bitrate)
        }
    }
}

/// A native decoder instance.
pub trait NativeDecoder: Send {
    /// Decode `packet` into interleaved `pcm`, whose length bounds the frame size.
    ///
    /// Returns decoded samples per channel, or a non-positive error status.
    fn decode(&mut self, packet: &[u8], pcm: &mut [i16], fec: bool) -> i32;
}

/// A native encoder instance.
pub trait NativeEncoder: Send {
    /// Encode one frame of interleaved `pcm` into `packet`.
    ///
    /// Returns the payload length in bytes, or a non-positive error status.
    fn encode(&mut self, pcm: &[i16], packet: &mut [u8]) -> i32;

    /// Control call: set the target bitrate. Returns `0` on success.
    fn set_bitrate(&mut self, bitrate: Bitrate) -> i32;
}

/// Factory for native codec instances.
pub trait CodecBackend: Send + Sync {
    fn create_decoder(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn NativeDecoder>, ErrorCode>;

    fn create_encoder(
        &self,
        sample_rate: u32,
        channels: u16,
        application: Application,
    ) -> Result<Box<dyn NativeEncoder>, ErrorCode>;
}
