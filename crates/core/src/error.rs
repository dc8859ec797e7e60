use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("inference error: {0}")]
    Inference(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("result record error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
