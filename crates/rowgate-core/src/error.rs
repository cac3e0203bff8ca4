use thiserror::Error;

#[derive(Debug, Error)]
pub enum RowgateError {
    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("template parse error: {0}")]
    TemplateParse(String),

    #[error("no value supplied for placeholder '{0}'")]
    MissingPlaceholder(String),

    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RowgateError>;
