use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True when the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// True when the same request may succeed if tried again.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::HttpStatus { status, .. } => crate::http::is_retryable_status(*status),
            BridgeError::OperationFailed(_) | BridgeError::Io(_) => true,
            BridgeError::NotAvailable(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let missing = BridgeError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(missing.is_not_found());

        let not_found = BridgeError::HttpStatus {
            status: 404,
            url: "https://example.com".to_string(),
        };
        assert!(!not_found.is_not_found());
        assert!(!not_found.is_transient());

        let busy = BridgeError::HttpStatus {
            status: 503,
            url: "https://example.com".to_string(),
        };
        assert!(busy.is_transient());
        assert!(BridgeError::OperationFailed("Connection failed".to_string()).is_transient());
        assert!(!BridgeError::NotAvailable("execute".to_string()).is_transient());
    }
}
