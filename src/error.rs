use thiserror::Error;

/// Failures of the table-reading core. None of them is recovered internally:
/// a block either yields a complete table set or one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnpackError {
    #[error("truncated input: read at byte {byte_address} of a {len} byte stream")]
    TruncatedInput { byte_address: usize, len: usize },

    #[error("corrupt data: {0}")]
    CorruptData(String),

    #[error("unsupported mode: {0}")]
    UnsupportedMode(String),
}

impl UnpackError {
    pub fn corrupt<T: std::fmt::Display>(msg: T) -> Self {
        UnpackError::CorruptData(msg.to_string())
    }

    pub fn unsupported<T: std::fmt::Display>(msg: T) -> Self {
        UnpackError::UnsupportedMode(msg.to_string())
    }
}
