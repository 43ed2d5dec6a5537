use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoxPlayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    Llm(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Voice input error: {0}")]
    Voice(String),

    #[error("Command input closed")]
    InputClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

pub type VoxPlayResult<T> = Result<T, VoxPlayError>;
