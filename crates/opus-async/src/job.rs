//! Asynchronous decode/encode operations.
//!
//! Each call copies its input into a job at submission time, so the caller's
//! buffer is free the moment the call returns. The job's work step runs on a
//! worker with nothing but the job's own buffers and its session; the reap step
//! turns the native status into the caller's result and drops the buffers.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use job_runtime::{JobError, Pending, RuntimeHandle, Work};

use crate::error::ErrorCode;
use crate::pcm;
use crate::session::{DecoderHandle, EncoderHandle};

/// Result of one codec operation: the payload, or the native error code.
pub type CodecResult = Result<Vec<u8>, ErrorCode>;

/// Suspends the calling task until its codec job has been reaped.
#[must_use = "codec jobs deliver their result only when awaited"]
pub struct CodecReply {
    pending: Pending<Result<CodecResult, JobError>>,
}

impl Future for CodecReply {
    type Output = CodecResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CodecResult> {
        Pin::new(&mut self.pending)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or_else(|e| Err(ErrorCode::from(e))))
    }
}

impl CodecReply {
    /// Take the result if the job has already been reaped.
    pub fn try_take(&self) -> Option<CodecResult> {
        self.pending
            .try_take()
            .map(|outcome| outcome.unwrap_or_else(|e| Err(ErrorCode::from(e))))
    }
}

struct DecodeJob {
    decoder: DecoderHandle,
    input: Vec<u8>,
    fec: bool,
    /// Per-channel output size; `None` leaves room for the longest frame.
    frame_samples: Option<usize>,
    pcm: Vec<i16>,
    status: i32,
}

impl Work for DecodeJob {
    fn work(&mut self) {
        let session = &self.decoder.session;
        if self.input.is_empty() || self.frame_samples == Some(0) {
            self.status = ErrorCode::BAD_ARG.code();
            return;
        }

        let channels = session.channels() as usize;
        let max = pcm::max_decode_frame(session.sample_rate());
        let frame = self.frame_samples.map_or(max, |n| n.min(max));
        self.pcm = vec![0; frame * channels];

        let (input, out, fec) = (&self.input, &mut self.pcm, self.fec);
        self.status = session.with_native(|native| native.decode(input, out, fec));
    }
}

impl DecodeJob {
    fn finish(self) -> CodecResult {
        let samples = ErrorCode::check(self.status)?;
        let channels = self.decoder.channels() as usize;
        let end = (samples * channels).min(self.pcm.len());
        Ok(pcm::samples_to_bytes(&self.pcm[..end]))
    }
}

struct EncodeJob {
    encoder: EncoderHandle,
    input: Vec<u8>,
    packet: Vec<u8>,
    status: i32,
}

impl Work for EncodeJob {
    fn work(&mut self) {
        let session = &self.encoder.session;
        let channels = session.channels();
        let frame_size = pcm::encode_frame_size(self.input.len(), channels);
        let used = frame_size * channels as usize * pcm::SAMPLE_BYTES;
        if used != self.input.len() {
            tracing::debug!(
                session = self.encoder.id().get(),
                len = self.input.len(),
                ignored = self.input.len() - used,
                "pcm input is not a whole number of frames; trailing bytes ignored"
            );
        }

        let samples = pcm::bytes_to_samples(&self.input[..used]);
        self.packet = vec![0; frame_size * pcm::SAMPLE_BYTES];

        let out = &mut self.packet;
        self.status = session.with_native(|native| native.encode(&samples, out));
    }
}

impl EncodeJob {
    fn finish(mut self) -> CodecResult {
        let len = ErrorCode::check(self.status)?;
        self.packet.truncate(len);
        Ok(self.packet)
    }
}

impl DecoderHandle {
    /// Decode one packet off-thread.
    ///
    /// `input` is copied before this returns. The reply yields interleaved
    /// native-endian `i16` PCM, or the native error code. An empty packet fails
    /// with `BAD_ARG` without reaching the codec.
    ///
    /// With `fec` set the codec reconstructs the frame *before* `input` instead
    /// of decoding `input`; see [`recover`](Self::recover) for the usual way to
    /// do that.
    pub fn decode(&self, rt: &RuntimeHandle, input: &[u8], fec: bool) -> CodecReply {
        self.submit(rt, input, fec, None)
    }

    /// Rebuild the frame lost just before `next_packet` from its in-band FEC data.
    ///
    /// `lost_samples` is the per-channel length of the missing frame, normally
    /// the size of the last frame decoded. The reply yields exactly that much
    /// PCM; `next_packet` itself still has to be decoded with [`decode`](Self::decode).
    pub fn recover(
        &self,
        rt: &RuntimeHandle,
        next_packet: &[u8],
        lost_samples: usize,
    ) -> CodecReply {
        self.submit(rt, next_packet, true, Some(lost_samples))
    }

    fn submit(
        &self,
        rt: &RuntimeHandle,
        input: &[u8],
        fec: bool,
        frame_samples: Option<usize>,
    ) -> CodecReply {
        let job = DecodeJob {
            decoder: self.clone(),
            input: input.to_vec(),
            fec,
            frame_samples,
            pcm: Vec::new(),
            status: ErrorCode::OK.code(),
        };
        CodecReply {
            pending: rt.run(job, DecodeJob::finish),
        }
    }
}

impl EncoderHandle {
    /// Encode one frame of interleaved native-endian `i16` PCM off-thread.
    ///
    /// `pcm` is copied before this returns. Its length should be a multiple of
    /// `channels * 2`; extra bytes are ignored. The reply yields the compressed
    /// packet, or the native error code.
    pub fn encode(&self, rt: &RuntimeHandle, pcm: &[u8]) -> CodecReply {
        let job = EncodeJob {
            encoder: self.clone(),
            input: pcm.to_vec(),
            packet: Vec::new(),
            status: ErrorCode::OK.code(),
        };
        CodecReply {
            pending: rt.run(job, EncodeJob::finish),
        }
    }
}
