//! Assertion role extractor.
//!
//! Selects the equivalent of `//Attribute[@Name='<name>']/AttributeValue`
//! over a parsed assertion and returns the trimmed text of each match.

use roxmltree::{Document, Node, ParsingOptions};
use tracing::{debug, info};

use super::error::ExtractionError;

/// Attribute name carrying role memberships in the assertions we consume.
pub const DEFAULT_ROLE_ATTRIBUTE: &str = "Role";

/// Upper bound on parsed nodes per assertion.
pub const DEFAULT_MAX_NODES: u32 = 100_000;

const ATTRIBUTE_ELEMENT: &str = "Attribute";
const ATTRIBUTE_VALUE_ELEMENT: &str = "AttributeValue";
const NAME_ATTRIBUTE: &str = "Name";

/// Compiled selector for the values of one named attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleQuery {
    attribute_name: String,
}

impl RoleQuery {
    pub fn new(attribute_name: &str) -> Result<Self, ExtractionError> {
        if attribute_name.is_empty() {
            return Err(ExtractionError::Query(
                "attribute name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            attribute_name: attribute_name.to_string(),
        })
    }

    /// Collect matched values in document order.
    pub fn select(&self, doc: &Document<'_>) -> Vec<String> {
        doc.descendants()
            .filter(|node| self.matches(node))
            .map(|node| text_content(&node))
            .collect()
    }

    fn matches(&self, node: &Node<'_, '_>) -> bool {
        if !node.is_element() || node.tag_name().name() != ATTRIBUTE_VALUE_ELEMENT {
            return false;
        }

        node.parent_element()
            .map(|parent| {
                parent.tag_name().name() == ATTRIBUTE_ELEMENT
                    && parent.attribute(NAME_ATTRIBUTE) == Some(self.attribute_name.as_str())
            })
            .unwrap_or(false)
    }
}

impl std::fmt::Display for RoleQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "//{}[@{}='{}']/{}",
            ATTRIBUTE_ELEMENT, NAME_ATTRIBUTE, self.attribute_name, ATTRIBUTE_VALUE_ELEMENT
        )
    }
}

/// Concatenated descendant text, trimmed of XML whitespace only.
fn text_content(node: &Node<'_, '_>) -> String {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    text.trim_matches(is_xml_whitespace).to_string()
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Extracts attribute values from raw assertion XML.
///
/// Holds only read-only settings, so a single instance can be shared across
/// threads. Documents carrying a DTD are rejected, which rules out external
/// entity resolution.
#[derive(Debug, Clone)]
pub struct AssertionRoleExtractor {
    attribute_name: String,
    max_nodes: u32,
}

impl Default for AssertionRoleExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_ROLE_ATTRIBUTE, DEFAULT_MAX_NODES)
    }
}

impl AssertionRoleExtractor {
    pub fn new(attribute_name: impl Into<String>, max_nodes: u32) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            max_nodes,
        }
    }

    /// Extract values of the configured attribute.
    pub fn extract(&self, raw_xml: &[u8]) -> Result<Vec<String>, ExtractionError> {
        self.extract_roles(raw_xml, &self.attribute_name)
    }

    /// Extract the values of `attribute_name` from `raw_xml`.
    ///
    /// Returns every value or an error, never a partial list. An assertion
    /// without the attribute yields an empty vec.
    pub fn extract_roles(
        &self,
        raw_xml: &[u8],
        attribute_name: &str,
    ) -> Result<Vec<String>, ExtractionError> {
        let text = std::str::from_utf8(raw_xml)?;
        let doc = Document::parse_with_options(text, self.parsing_options())?;

        let query = RoleQuery::new(attribute_name)?;
        debug!(query = %query, nodes = doc.descendants().count(), "Evaluating role query");

        let roles = query.select(&doc);

        info!(
            attribute = %attribute_name,
            count = roles.len(),
            "Role attributes found"
        );
        for role in &roles {
            info!(attribute = %attribute_name, role = %role, "Role");
        }

        Ok(roles)
    }

    fn parsing_options(&self) -> ParsingOptions {
        let mut options = ParsingOptions::default();
        options.allow_dtd = false;
        options.nodes_limit = self.max_nodes;
        options
    }
}
