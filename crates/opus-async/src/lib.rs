//! Asynchronous Opus encode/decode for single-threaded cooperative runtimes.
//!
//! ## Flow
//! 1. **Session**: [`create_decoder`] / [`create_encoder`] wrap one native codec instance.
//! 2. **Submit**: [`DecoderHandle::decode`] / [`EncoderHandle::encode`] copy the input
//!    into a job and queue it on the [`job_runtime`] worker pool.
//! 3. **Suspend**: the calling task awaits the returned [`CodecReply`].
//! 4. **Reap**: back on the runtime thread the job's status becomes the payload or
//!    the native [`ErrorCode`], and the job's buffers are dropped.
//!
//! The native codec sits behind [`backend::CodecBackend`]; the `libopus` feature
//! provides the libopus implementation.

pub mod backend;
pub mod container;
pub mod error;
pub mod job;
pub mod pcm;
pub mod session;
pub mod settings;
pub mod stream;
pub mod value;

#[cfg(feature = "libopus")]
pub mod libopus;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Application, Bitrate, CodecBackend};
pub use error::ErrorCode;
pub use job::{CodecReply, CodecResult};
pub use session::{DecoderHandle, EncoderHandle, SessionId, create_decoder, create_encoder};

/// Native codec compiled into this build (`"libopus"` or `"none"`).
pub const CODEC_BACKEND: &str = env!("CODEC_BACKEND");
