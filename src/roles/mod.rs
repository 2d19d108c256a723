//! SAML role attribute extraction.
//!
//! Parses a cached assertion and returns the values of a named `Attribute`
//! in document order.

pub mod error;
pub mod extractor;

pub use error::ExtractionError;
pub use extractor::{AssertionRoleExtractor, DEFAULT_MAX_NODES, DEFAULT_ROLE_ATTRIBUTE};
