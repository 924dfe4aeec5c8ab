use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Index out of range: {what} index {index} (len {len})")]
    IndexOutOfRange { what: String, index: usize, len: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Analysis error: {0}")]
    Analysis(String),
}

pub type Result<T> = std::result::Result<T, Error>;
