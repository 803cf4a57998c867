use thiserror::Error;

/// Errors surfaced by the simulation core.
///
/// Initialization failures are fatal: no fallback device is attempted and no
/// partially-built state is returned. Steady-state stepping has no retry
/// logic, a failed dispatch setup aborts the step.
#[derive(Error, Debug)]
pub enum Error {
    /// Particle array lengths disagree with the padded count they were
    /// allocated for. Raised at dispatch setup, never silently truncated.
    #[error("buffer length mismatch: expected {expected} slots, found {found}")]
    BufferMismatch {
        /// Padded slot count the dispatch was configured for.
        expected: usize,
        /// Slot count actually present.
        found: usize,
    },

    /// In-place stepping was requested from a kernel that does not guarantee
    /// snapshot reads.
    #[error("in-place stepping requires a kernel with snapshot reads")]
    SnapshotRequired,

    /// No adapter matched the requested power and fallback preferences.
    #[cfg(feature = "gpu")]
    #[error("no suitable GPU adapter found")]
    AdapterUnavailable,

    /// The adapter refused the device request.
    #[cfg(feature = "gpu")]
    #[error("GPU device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// The backend rejected the kernel shader or pipeline, with its
    /// diagnostic text.
    #[cfg(feature = "gpu")]
    #[error("kernel shader rejected: {0}")]
    ShaderCompilation(String),
}
