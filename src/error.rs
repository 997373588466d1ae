use thiserror::Error;
use triad_agent::SessionError;

#[derive(Error, Debug)]
pub enum TriadError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Failed to render output: {0}")]
    RenderError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TriadError>;
