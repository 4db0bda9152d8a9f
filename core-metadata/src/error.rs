use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Work not found on provider: {0}")]
    NotFound(String),

    #[error("HTTP error {status}: {body}")]
    HttpError { status: u16, body: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Artwork download failed for {code} ({variant}): {message}")]
    ArtworkError {
        code: String,
        variant: String,
        message: String,
    },

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
