//! Error types for the CDN replica

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the CDN replica
#[derive(Error, Debug)]
pub enum Error {
    /// Article is not a known record (or the origin does not have it)
    #[error("Article not found: {0}")]
    NotFound(String),

    /// Origin answered 404 for the article
    #[error("Article not found at origin: {0}")]
    OriginNotFound(String),

    /// Origin fetch failed (network or non-2xx)
    #[error("Origin fetch failed for article {article}: {reason}")]
    OriginFetch { article: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Popularity manifest could not be read
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Geo database lookup failed
    #[error("Geo lookup failed for {address}: {reason}")]
    GeoLookup { address: String, reason: String },

    /// Malformed DNS message
    #[error("DNS codec error: {0}")]
    DnsCodec(String),

    // =========================================================================
    // Compression Errors
    // =========================================================================
    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the negative results a client should see as "404".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::OriginNotFound(_))
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Manifest(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(Error::NotFound("Foo".into()).is_not_found());
        assert!(Error::OriginNotFound("Foo".into()).is_not_found());
        assert!(!Error::Internal("boom".into()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = Error::OriginFetch {
            article: "50_Cent".into(),
            reason: "HTTP 500".into(),
        };
        assert_eq!(
            err.to_string(),
            "Origin fetch failed for article 50_Cent: HTTP 500"
        );
    }
}
