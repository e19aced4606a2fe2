use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("invalid base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("base url '{0}' cannot carry query parameters")]
    OpaqueBaseUrl(String),
    #[error("malformed server message: {0}")]
    MalformedMessage(#[from] serde_json::Error),
    #[error("failed to persist viewer state at '{path}': {source}")]
    Persist {
        path: String,
        source: std::io::Error,
    },
}
