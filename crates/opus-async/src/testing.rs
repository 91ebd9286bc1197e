//! Scripted in-memory codec for unit tests.
//!
//! Fake packets are `[tag, delay_ms, frames]`: decoding sleeps `delay_ms`, then
//! fills `frames * 120` samples per channel with `tag`. Decoding with FEC fills
//! the whole output buffer with `-tag` and reports its length, as libopus does
//! when it rebuilds the previous frame. Encoding writes the per-channel frame
//! size as a little-endian `u32`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::backend::{Application, Bitrate, CodecBackend, NativeDecoder, NativeEncoder};
use crate::error::ErrorCode;

const SUPPORTED_RATES: [u32; 5] = [8_000, 12_000, 16_000, 24_000, 48_000];
const SAMPLES_PER_FRAME_UNIT: usize = 120;

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeLog {
    pub decoder_attempts: usize,
    pub decoders_created: usize,
    pub decoders_dropped: usize,
    pub encoders_created: usize,
    pub encoders_dropped: usize,
    pub applications: Vec<Application>,
    pub bitrates: Vec<Bitrate>,
    pub decode_capacity: Vec<usize>,
    pub fec_flags: Vec<bool>,
    pub encode_samples: Vec<usize>,
    pub encode_capacity: Vec<usize>,
    pub max_concurrent_calls: usize,
}

#[derive(Default)]
struct Shared {
    log: Mutex<FakeLog>,
    active: AtomicUsize,
}

impl Shared {
    fn record(&self, f: impl FnOnce(&mut FakeLog)) {
        f(&mut self.log.lock().unwrap());
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(|log| log.max_concurrent_calls = log.max_concurrent_calls.max(now));
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeBackend {
    shared: Arc<Shared>,
}

pub(crate) fn fake_packet(tag: u8, delay_ms: u8, frames: u8) -> Vec<u8> {
    vec![tag, delay_ms, frames]
}

impl FakeBackend {
    pub const CORRUPT_PACKET: [u8; 1] = [0xFF];
    pub const REJECTED_BITRATE: i32 = 1;

    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn log(&self) -> FakeLog {
        self.shared.log.lock().unwrap().clone()
    }

    pub fn samples_for(packet: &[u8]) -> usize {
        packet.get(2).copied().unwrap_or(0) as usize * SAMPLES_PER_FRAME_UNIT
    }

    pub fn frame_size_of(packet: &[u8]) -> usize {
        u32::from_le_bytes([packet[0], packet[1], packet[2], packet[3]]) as usize
    }

    fn check_params(sample_rate: u32, channels: u16) -> Result<(), ErrorCode> {
        if SUPPORTED_RATES.contains(&sample_rate) && matches!(channels, 1 | 2) {
            Ok(())
        } else {
            Err(ErrorCode::BAD_ARG)
        }
    }
}

struct FakeDecoder {
    channels: usize,
    shared: Arc<Shared>,
}

struct FakeEncoder {
    channels: usize,
    shared: Arc<Shared>,
}

impl CodecBackend for FakeBackend {
    fn create_decoder(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn NativeDecoder>, ErrorCode> {
        self.shared.record(|log| log.decoder_attempts += 1);
        Self::check_params(sample_rate, channels)?;
        self.shared.record(|log| log.decoders_created += 1);
        Ok(Box::new(FakeDecoder {
            channels: channels as usize,
            shared: self.shared.clone(),
        }))
    }

    fn create_encoder(
        &self,
        sample_rate: u32,
        channels: u16,
        application: Application,
    ) -> Result<Box<dyn NativeEncoder>, ErrorCode> {
        Self::check_params(sample_rate, channels)?;
        self.shared.record(|log| {
            log.encoders_created += 1;
            log.applications.push(application);
        });
        Ok(Box::new(FakeEncoder {
            channels: channels as usize,
            shared: self.shared.clone(),
        }))
    }
}

impl NativeDecoder for FakeDecoder {
    fn decode(&mut self, packet: &[u8], pcm: &mut [i16], fec: bool) -> i32 {
        self.shared.enter();
        self.shared.record(|log| {
            log.decode_capacity.push(pcm.len());
            log.fec_flags.push(fec);
        });

        let status = if packet == FakeBackend::CORRUPT_PACKET {
            ErrorCode::INVALID_PACKET.code()
        } else if fec {
            let tag = packet.first().copied().unwrap_or(0) as i16;
            pcm.fill(-tag);
            (pcm.len() / self.channels) as i32
        } else {
            let delay = packet.get(1).copied().unwrap_or(0) as u64;
            thread::sleep(Duration::from_millis(delay));
            let samples = FakeBackend::samples_for(packet).min(pcm.len() / self.channels);
            let tag = packet.first().copied().unwrap_or(0) as i16;
            pcm[..samples * self.channels].fill(tag);
            samples as i32
        };

        self.shared.leave();
        status
    }
}

impl Drop for FakeDecoder {
    fn drop(&mut self) {
        self.shared.record(|log| log.decoders_dropped += 1);
    }
}

impl NativeEncoder for FakeEncoder {
    fn encode(&mut self, pcm: &[i16], packet: &mut [u8]) -> i32 {
        self.shared.enter();
        self.shared.record(|log| {
            log.encode_samples.push(pcm.len());
            log.encode_capacity.push(packet.len());
        });

        let status = if pcm.is_empty() {
            ErrorCode::BAD_ARG.code()
        } else if packet.len() < 4 {
            ErrorCode::BUFFER_TOO_SMALL.code()
        } else {
            let frame_size = (pcm.len() / self.channels) as u32;
            packet[..4].copy_from_slice(&frame_size.to_le_bytes());
            4
        };

        self.shared.leave();
        status
    }

    fn set_bitrate(&mut self, bitrate: Bitrate) -> i32 {
        self.shared.record(|log| log.bitrates.push(bitrate));
        match bitrate {
            Bitrate::Bits(FakeBackend::REJECTED_BITRATE) => ErrorCode::BAD_ARG.code(),
            _ => ErrorCode::OK.code(),
        }
    }
}

impl Drop for FakeEncoder {
    fn drop(&mut self) {
        self.shared.record(|log| log.encoders_dropped += 1);
    }
}
