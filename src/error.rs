use thiserror::Error;

#[derive(Error, Debug)]
pub enum RescodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid coefficient block: {0}")]
    InvalidBlock(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid residual stream: {0}")]
    InvalidFormat(String),

    #[error("CRC mismatch in tile {tile}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { tile: usize, expected: u32, actual: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<bincode::Error> for RescodeError {
    fn from(err: bincode::Error) -> Self {
        RescodeError::Serialization(err.to_string())
    }
}

pub type RescodeResult<T> = Result<T, RescodeError>;
