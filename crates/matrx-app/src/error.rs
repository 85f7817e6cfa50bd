use matrx_client::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("No note is open")]
    NoNoteOpen,

    #[error("Chat backend error: {0}")]
    Chat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, AppError::Client(ClientError::Aborted))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
