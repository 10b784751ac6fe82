use thiserror::Error;

/// Ошибки сигнального слоя
#[derive(Debug, Error)]
pub enum SignalError {
    /// Операция запрещена текущим состоянием звонка
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Запись в звонок, который уже завершён
    #[error("call {0} is already torn down")]
    StaleCall(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("invalid config: {0}")]
    Config(String),
}

impl From<webrtc::Error> for SignalError {
    fn from(e: webrtc::Error) -> Self {
        SignalError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;
