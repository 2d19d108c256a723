//! Role extraction error types.

use serde::Serialize;
use thiserror::Error;

/// Errors returned by [`AssertionRoleExtractor`](super::AssertionRoleExtractor).
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Assertion bytes are not valid UTF-8.
    #[error("assertion is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// Assertion is not well-formed XML, carries a DTD, or exceeds the node limit.
    #[error("malformed assertion XML: {0}")]
    MalformedXml(#[from] roxmltree::Error),

    /// The role query could not be built or evaluated.
    #[error("role query failed: {0}")]
    Query(String),
}

/// Coarse classification of an extraction failure, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EncodingError,
    MalformedXml,
    QueryError,
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::Encoding(_) => ErrorKind::EncodingError,
            ExtractionError::MalformedXml(_) => ErrorKind::MalformedXml,
            ExtractionError::Query(_) => ErrorKind::QueryError,
        }
    }

    /// True when the caller handed us a bad assertion, false when the
    /// extractor itself misbehaved.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, ExtractionError::Query(_))
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::EncodingError => write!(f, "encoding_error"),
            ErrorKind::MalformedXml => write!(f, "malformed_xml"),
            ErrorKind::QueryError => write!(f, "query_error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = ExtractionError::Query("empty attribute name".to_string());
        assert_eq!(err.kind(), ErrorKind::QueryError);
        assert!(!err.is_input_error());

        let bytes = [0xffu8, 0xfe];
        let utf8 = std::str::from_utf8(&bytes).unwrap_err();
        let err = ExtractionError::from(utf8);
        assert_eq!(err.kind(), ErrorKind::EncodingError);
        assert!(err.is_input_error());
    }

    #[test]
    fn test_kind_display_matches_serde() {
        for kind in [
            ErrorKind::EncodingError,
            ErrorKind::MalformedXml,
            ErrorKind::QueryError,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }
}
