use thiserror::Error;

#[derive(Error, Debug)]
pub enum CerebroError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
