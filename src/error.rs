use thiserror::Error;

/// Error taxonomy for the whole crate.
///
/// Transport-level failures inside a single `Action` call are absorbed by
/// the transaction engine and reported as a log line plus a `None` result
/// (see `engine::TransactionEngine::call`); per-field decode failures are
/// likewise absorbed and logged rather than aborting a whole decode. The
/// variants here are for errors that must reach the CLI boundary.
#[derive(Debug, Error)]
pub enum WpuError {
    #[error("i2c io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bsc slave driver not connected")]
    DriverUnavailable,

    #[error("no valid response after {0} attempts")]
    TimeoutExceeded(u32),

    #[error("response has wrong message type: expected 0x01, got {0:#04x}")]
    WrongType(u8),

    #[error("response has wrong message class: expected {expected:?}, got {actual:?}")]
    WrongClass { expected: (u8, u8), actual: (u8, u8) },

    #[error("frame checksum invalid")]
    BadChecksum,

    #[error("frame length field invalid")]
    BadLength,

    #[error("schema version {0} not found in versiebeheer")]
    VersionNotFound(u8),

    #[error("{0}")]
    NotFound(String),

    #[error("unknown datatype code {0:#04x}")]
    UnknownDatatype(u8),

    #[error("value {value} out of range [{min}, {max}]")]
    ValueOutOfRange { value: i64, min: i64, max: i64 },

    #[error("{0}")]
    UsageError(String),

    #[error("schema store error: {0}")]
    Schema(#[from] rusqlite::Error),

    #[error("cache io error: {0}")]
    Cache(#[from] serde_json::Error),

    #[error("export error: {0}")]
    Export(String),
}
