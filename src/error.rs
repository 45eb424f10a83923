use thiserror::Error;

/// Everything that can go wrong while preparing a process for spoofing.
///
/// None of these leave the specializing process: they are logged and the
/// process carries on with spoofing reduced or disabled.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem or channel I/O failed
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The config bytes do not decode to a JSON object
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    /// The config decoded, but its top level is not an object
    #[error("malformed config: expected an object, found {0}")]
    NotAnObject(&'static str),

    /// The relay sent a length field we refuse to honor
    #[error("invalid relay frame: length {0}")]
    Frame(i64),

    /// No hook backend exists for this architecture
    #[error("property hooking is not supported on {0}")]
    UnsupportedTarget(&'static str),

    /// The hook target could not be located in the loaded libraries
    #[error("symbol {} not found", .0.to_string_lossy())]
    SymbolNotFound(&'static std::ffi::CStr),

    /// The inline hook backend could not patch the target
    #[error("failed to install detour: {0}")]
    Detour(String),

    /// A previous install attempt in this process failed
    #[error("hook install already failed in this process")]
    AlreadyFailed,
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
