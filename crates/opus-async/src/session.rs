//! Long-lived decoder/encoder sessions.
//!
//! A handle owns exactly one native codec instance. Handles are cheap to clone;
//! every in-flight job holds a clone, so the native instance lives until the
//! last job using it has been reaped.
//!
//! Native codecs are not reentrant. Each session keeps its instance behind a
//! mutex that a worker holds for one native call, so jobs on the same session
//! whose work phases overlap run one after the other instead of racing.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering, fence};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::backend::{Application, Bitrate, CodecBackend, NativeDecoder, NativeEncoder};
use crate::error::ErrorCode;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        SessionId(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

pub(crate) struct Session<N: ?Sized> {
    id: SessionId,
    sample_rate: u32,
    channels: u16,
    closed: AtomicBool,
    native: Mutex<Option<Box<N>>>,
}

impl<N: ?Sized> Session<N> {
    fn new(sample_rate: u32, channels: u16, native: Box<N>) -> Self {
        Self {
            id: SessionId::next(),
            sample_rate,
            channels,
            closed: AtomicBool::new(false),
            native: Mutex::new(Some(native)),
        }
    }

    pub(crate) fn channels(&self) -> u16 {
        self.channels
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Run one native call with exclusive access to the codec instance.
    ///
    /// Closed sessions report `INVALID_STATE` without touching the codec. A
    /// session closed while a call is running is released by that call once it
    /// lets go of the lock.
    pub(crate) fn with_native(&self, call: impl FnOnce(&mut N) -> i32) -> i32 {
        let mut guard = self.lock();
        let status = match guard.as_mut() {
            Some(native) if !self.is_closed() => call(&mut **native),
            _ => ErrorCode::INVALID_STATE.code(),
        };
        drop(guard);

        // Pairs with the fence in `close`: either its `try_lock` sees the lock
        // free, or this load sees `closed`.
        fence(Ordering::SeqCst);
        if self.is_closed() {
            self.release();
        }
        status
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the session closed and drop the native instance.
    ///
    /// If a call holds the instance, the drop is deferred until that call (or
    /// the next one to take the lock) finishes.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        self.release();
    }

    fn release(&self) {
        let mut guard = match self.native.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        guard.take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<N>>> {
        // A panic inside a native call leaves nothing half-written on our side.
        self.native.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a decoder session.
#[derive(Clone)]
pub struct DecoderHandle {
    pub(crate) session: Arc<Session<dyn NativeDecoder>>,
}

/// Handle to an encoder session.
#[derive(Clone)]
pub struct EncoderHandle {
    pub(crate) session: Arc<Session<dyn NativeEncoder>>,
    bitrate: Bitrate,
    application: Application,
}

/// Create a decoder session.
///
/// Fails with the native code if the codec refuses `sample_rate`/`channels`;
/// no session is allocated in that case.
pub fn create_decoder(
    backend: &dyn CodecBackend,
    sample_rate: u32,
    channels: u16,
) -> Result<DecoderHandle, ErrorCode> {
    if sample_rate == 0 || channels == 0 {
        return Err(ErrorCode::BAD_ARG);
    }
    let native = backend
        .create_decoder(sample_rate, channels)
        .inspect_err(|code| {
            tracing::debug!(sample_rate, channels, code = code.code(), "decoder rejected");
        })?;

    let session = Arc::new(Session::new(sample_rate, channels, native));
    tracing::debug!(session = session.id.get(), sample_rate, channels, "decoder created");
    Ok(DecoderHandle { session })
}

/// Create an encoder session.
///
/// `bitrate <= 0` selects the maximum bitrate; `voice_optimized` picks the VOIP
/// profile over the general audio one.
///
/// A failing bitrate control call fails the whole construction and drops the
/// native instance rather than leaving the encoder silently at its default
/// bitrate, which is what ignoring the control status would do. libopus clamps
/// positive bitrates, so with it only an out-of-range request reaches this path.
pub fn create_encoder(
    backend: &dyn CodecBackend,
    sample_rate: u32,
    channels: u16,
    bitrate: i32,
    voice_optimized: bool,
) -> Result<EncoderHandle, ErrorCode> {
    if sample_rate == 0 || channels == 0 {
        return Err(ErrorCode::BAD_ARG);
    }
    let application = Application::from_voice_optimized(voice_optimized);
    let mut native = backend
        .create_encoder(sample_rate, channels, application)
        .inspect_err(|code| {
            tracing::debug!(sample_rate, channels, code = code.code(), "encoder rejected");
        })?;

    let bitrate = Bitrate::from_requested(bitrate);
    let status = native.set_bitrate(bitrate);
    if status < 0 {
        tracing::debug!(?bitrate, code = status, "encoder bitrate rejected");
        return Err(ErrorCode(status));
    }

    let session = Arc::new(Session::new(sample_rate, channels, native));
    tracing::debug!(
        session = session.id.get(),
        sample_rate,
        channels,
        ?bitrate,
        ?application,
        "encoder created"
    );
    Ok(EncoderHandle {
        session,
        bitrate,
        application,
    })
}

impl DecoderHandle {
    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.session.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.session.channels
    }

    /// Release the native decoder. Later operations fail with `INVALID_STATE`.
    pub fn close(&self) {
        self.session.close();
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}

impl EncoderHandle {
    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.session.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.session.channels
    }

    pub fn bitrate(&self) -> Bitrate {
        self.bitrate
    }

    pub fn application(&self) -> Application {
        self.application
    }

    /// Release the native encoder. Later operations fail with `INVALID_STATE`.
    pub fn close(&self) {
        self.session.close();
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}

impl fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderHandle")
            .field("id", &self.session.id)
            .field("sample_rate", &self.session.sample_rate)
            .field("channels", &self.session.channels)
            .finish()
    }
}

impl fmt::Debug for EncoderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderHandle")
            .field("id", &self.session.id)
            .field("sample_rate", &self.session.sample_rate)
            .field("channels", &self.session.channels)
            .field("bitrate", &self.bitrate)
            .field("application", &self.application)
            .finish()
    }
}
