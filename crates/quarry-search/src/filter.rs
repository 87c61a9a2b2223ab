//! Search filter tree
//!
//! A [`Filter`] is an immutable tree built either through the constructors
//! here or by parsing filter text. AND and OR components are deduplicated
//! when the node is built, and two filters compare equal when they have the
//! same structure, treating AND/OR components as sets and attribute names
//! and options case-insensitively.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use quarry_core::attribute::options_equal;
use quarry_core::{parse_attribute_description, AttributeType, Schema};
use serde::{Deserialize, Serialize};

use crate::error::{SearchError, SearchResult};

// ─────────────────────────────────────────────────────────────────────────────
// Filter Components
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of a filter node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterType {
    And,
    Or,
    Not,
    Equality,
    Substring,
    GreaterOrEqual,
    LessOrEqual,
    Present,
    ApproximateMatch,
    ExtensibleMatch,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Equality => "EQUALITY",
            Self::Substring => "SUBSTRING",
            Self::GreaterOrEqual => "GREATER_OR_EQUAL",
            Self::LessOrEqual => "LESS_OR_EQUAL",
            Self::Present => "PRESENT",
            Self::ApproximateMatch => "APPROXIMATE_MATCH",
            Self::ExtensibleMatch => "EXTENSIBLE_MATCH",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute type plus options, as named in a filter component
#[derive(Debug, Clone)]
pub struct AttributeDescription {
    name: String,
    attr_type: Arc<AttributeType>,
    options: Vec<String>,
}

impl AttributeDescription {
    pub fn new(attr_type: Arc<AttributeType>) -> Self {
        Self {
            name: attr_type.name_or_oid().to_string(),
            attr_type,
            options: Vec::new(),
        }
    }

    /// Resolve `name;option;...` against the schema. Unknown names get a
    /// placeholder type.
    pub fn parse(schema: &dyn Schema, description: &str) -> Self {
        let (name, options) = parse_attribute_description(description);
        Self {
            name: name.to_string(),
            attr_type: schema.attribute_type_or_default(name),
            options,
        }
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        let option = option.into();
        if !self.options.iter().any(|o| o.eq_ignore_ascii_case(&option)) {
            self.options.push(option);
        }
        self
    }

    /// The name as written
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute_type(&self) -> &Arc<AttributeType> {
        &self.attr_type
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }
}

impl PartialEq for AttributeDescription {
    fn eq(&self, other: &Self) -> bool {
        self.attr_type == other.attr_type && options_equal(&self.options, &other.options)
    }
}

impl fmt::Display for AttributeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for option in &self.options {
            write!(f, ";{}", option)?;
        }
        Ok(())
    }
}

/// `attribute <op> value` for equality, ordering and approximate filters
#[derive(Debug, Clone, PartialEq)]
pub struct ValueAssertion {
    pub attribute: AttributeDescription,
    pub value: Vec<u8>,
}

/// Substring components; absent `initial`/`final_value` leave that end unanchored
#[derive(Debug, Clone, PartialEq)]
pub struct SubstringAssertion {
    pub attribute: AttributeDescription,
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub final_value: Option<Vec<u8>>,
}

impl SubstringAssertion {
    pub fn has_components(&self) -> bool {
        self.initial.is_some() || !self.any.is_empty() || self.final_value.is_some()
    }

    /// Escaped `initial*any*...*final` rendering
    pub fn pattern(&self) -> String {
        let mut out = String::new();
        if let Some(initial) = &self.initial {
            out.push_str(&escape_value(initial));
        }
        out.push('*');
        for any in &self.any {
            out.push_str(&escape_value(any));
            out.push('*');
        }
        if let Some(final_value) = &self.final_value {
            out.push_str(&escape_value(final_value));
        }
        out
    }
}

/// Extensible match: `[attr][:dn][:rule]:=value`
#[derive(Debug, Clone)]
pub struct ExtensibleAssertion {
    pub attribute: Option<AttributeDescription>,
    pub matching_rule: Option<String>,
    pub value: Vec<u8>,
    pub dn_attributes: bool,
}

impl PartialEq for ExtensibleAssertion {
    fn eq(&self, other: &Self) -> bool {
        let rules_equal = match (&self.matching_rule, &other.matching_rule) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        };
        rules_equal
            && self.attribute == other.attribute
            && self.value == other.value
            && self.dn_attributes == other.dn_attributes
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter
// ─────────────────────────────────────────────────────────────────────────────

/// A search filter node
#[derive(Debug, Clone)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality(ValueAssertion),
    Substring(SubstringAssertion),
    GreaterOrEqual(ValueAssertion),
    LessOrEqual(ValueAssertion),
    Present(AttributeDescription),
    Approximate(ValueAssertion),
    Extensible(ExtensibleAssertion),
}

impl Filter {
    /// AND of the given components, dropping duplicates
    pub fn and(components: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(dedup(components))
    }

    /// OR of the given components, dropping duplicates
    pub fn or(components: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(dedup(components))
    }

    pub fn not(component: Filter) -> Self {
        Self::Not(Box::new(component))
    }

    pub fn equality(attribute: AttributeDescription, value: impl Into<Vec<u8>>) -> Self {
        Self::Equality(ValueAssertion {
            attribute,
            value: value.into(),
        })
    }

    /// Substring filter; at least one component is required
    pub fn substring(
        attribute: AttributeDescription,
        initial: Option<Vec<u8>>,
        any: Vec<Vec<u8>>,
        final_value: Option<Vec<u8>>,
    ) -> SearchResult<Self> {
        let assertion = SubstringAssertion {
            attribute,
            initial,
            any,
            final_value,
        };
        if !assertion.has_components() {
            return Err(SearchError::malformed(
                &assertion.attribute,
                "substring filter needs an initial, any or final component",
            ));
        }
        Ok(Self::Substring(assertion))
    }

    pub fn greater_or_equal(attribute: AttributeDescription, value: impl Into<Vec<u8>>) -> Self {
        Self::GreaterOrEqual(ValueAssertion {
            attribute,
            value: value.into(),
        })
    }

    pub fn less_or_equal(attribute: AttributeDescription, value: impl Into<Vec<u8>>) -> Self {
        Self::LessOrEqual(ValueAssertion {
            attribute,
            value: value.into(),
        })
    }

    pub fn present(attribute: AttributeDescription) -> Self {
        Self::Present(attribute)
    }

    pub fn approximate(attribute: AttributeDescription, value: impl Into<Vec<u8>>) -> Self {
        Self::Approximate(ValueAssertion {
            attribute,
            value: value.into(),
        })
    }

    /// Extensible match; needs an attribute type, a matching rule, or both
    pub fn extensible(
        attribute: Option<AttributeDescription>,
        matching_rule: Option<String>,
        value: impl Into<Vec<u8>>,
        dn_attributes: bool,
    ) -> SearchResult<Self> {
        let assertion = ExtensibleAssertion {
            attribute,
            matching_rule,
            value: value.into(),
            dn_attributes,
        };
        if assertion.attribute.is_none() && assertion.matching_rule.is_none() {
            return Err(SearchError::malformed(
                Self::Extensible(assertion),
                "extensible match needs a matching rule or an attribute type",
            ));
        }
        Ok(Self::Extensible(assertion))
    }

    /// `(objectClass=*)`, which every entry matches
    pub fn object_class_present(schema: &dyn Schema) -> Self {
        Self::present(AttributeDescription::new(schema.object_class_type()))
    }

    pub fn filter_type(&self) -> FilterType {
        match self {
            Self::And(_) => FilterType::And,
            Self::Or(_) => FilterType::Or,
            Self::Not(_) => FilterType::Not,
            Self::Equality(_) => FilterType::Equality,
            Self::Substring(_) => FilterType::Substring,
            Self::GreaterOrEqual(_) => FilterType::GreaterOrEqual,
            Self::LessOrEqual(_) => FilterType::LessOrEqual,
            Self::Present(_) => FilterType::Present,
            Self::Approximate(_) => FilterType::ApproximateMatch,
            Self::Extensible(_) => FilterType::ExtensibleMatch,
        }
    }

    /// Components of an AND or OR; empty for every other kind
    pub fn components(&self) -> &[Filter] {
        match self {
            Self::And(components) | Self::Or(components) => components,
            _ => &[],
        }
    }

    /// The attribute named by a non-compound filter
    pub fn attribute(&self) -> Option<&AttributeDescription> {
        match self {
            Self::Equality(a) | Self::GreaterOrEqual(a) | Self::LessOrEqual(a) | Self::Approximate(a) => {
                Some(&a.attribute)
            }
            Self::Substring(s) => Some(&s.attribute),
            Self::Present(attribute) => Some(attribute),
            Self::Extensible(e) => e.attribute.as_ref(),
            Self::And(_) | Self::Or(_) | Self::Not(_) => None,
        }
    }

    /// Number of nested AND/OR/NOT levels
    pub fn depth(&self) -> usize {
        match self {
            Self::And(components) | Self::Or(components) => {
                1 + components.iter().map(Filter::depth).max().unwrap_or(0)
            }
            Self::Not(component) => 1 + component.depth(),
            _ => 0,
        }
    }

    /// Serializable view of the tree
    pub fn tree(&self) -> FilterTree {
        let (value, matching_rule, dn_attributes) = match self {
            Self::Equality(a) | Self::GreaterOrEqual(a) | Self::LessOrEqual(a) | Self::Approximate(a) => {
                (Some(escape_value(&a.value)), None, false)
            }
            Self::Substring(s) => (Some(s.pattern()), None, false),
            Self::Extensible(e) => (Some(escape_value(&e.value)), e.matching_rule.clone(), e.dn_attributes),
            _ => (None, None, false),
        };
        let children = match self {
            Self::And(components) | Self::Or(components) => components.iter().map(Filter::tree).collect(),
            Self::Not(component) => vec![component.tree()],
            _ => Vec::new(),
        };
        FilterTree {
            filter_type: self.filter_type(),
            attribute: self.attribute().map(ToString::to_string),
            matching_rule,
            dn_attributes,
            value,
            children,
        }
    }
}

fn dedup(components: impl IntoIterator<Item = Filter>) -> Vec<Filter> {
    let mut out: Vec<Filter> = Vec::new();
    for component in components {
        if !out.contains(&component) {
            out.push(component);
        }
    }
    out
}

fn same_components(a: &[Filter], b: &[Filter]) -> bool {
    a.len() == b.len() && a.iter().all(|f| b.contains(f))
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::And(a), Self::And(b)) | (Self::Or(a), Self::Or(b)) => same_components(a, b),
            (Self::Not(a), Self::Not(b)) => a == b,
            (Self::Equality(a), Self::Equality(b))
            | (Self::GreaterOrEqual(a), Self::GreaterOrEqual(b))
            | (Self::LessOrEqual(a), Self::LessOrEqual(b))
            | (Self::Approximate(a), Self::Approximate(b)) => a == b,
            (Self::Substring(a), Self::Substring(b)) => a == b,
            (Self::Present(a), Self::Present(b)) => a == b,
            (Self::Extensible(a), Self::Extensible(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(components) => write_compound(f, '&', components),
            Self::Or(components) => write_compound(f, '|', components),
            Self::Not(component) => write!(f, "(!{})", component),
            Self::Equality(a) => write!(f, "({}={})", a.attribute, Escaped(&a.value)),
            Self::Substring(s) => write!(f, "({}={})", s.attribute, s.pattern()),
            Self::GreaterOrEqual(a) => write!(f, "({}>={})", a.attribute, Escaped(&a.value)),
            Self::LessOrEqual(a) => write!(f, "({}<={})", a.attribute, Escaped(&a.value)),
            Self::Present(attribute) => write!(f, "({}=*)", attribute),
            Self::Approximate(a) => write!(f, "({}~={})", a.attribute, Escaped(&a.value)),
            Self::Extensible(e) => {
                f.write_char('(')?;
                if let Some(attribute) = &e.attribute {
                    write!(f, "{}", attribute)?;
                }
                if e.dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = &e.matching_rule {
                    write!(f, ":{}", rule)?;
                }
                write!(f, ":={})", Escaped(&e.value))
            }
        }
    }
}

fn write_compound(f: &mut fmt::Formatter<'_>, op: char, components: &[Filter]) -> fmt::Result {
    write!(f, "({}", op)?;
    for component in components {
        write!(f, "{}", component)?;
    }
    f.write_char(')')
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Whether a value byte must be written as `\XX` in filter text
pub fn needs_escape(byte: u8) -> bool {
    byte >= 0x7F || byte < 0x20 || matches!(byte, b'(' | b')' | b'*' | b'\\')
}

/// Render an assertion value for filter text
pub fn escape_value(value: &[u8]) -> String {
    Escaped(value).to_string()
}

struct Escaped<'a>(&'a [u8]);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in self.0 {
            if needs_escape(byte) {
                write!(f, "\\{:02x}", byte)?;
            } else {
                f.write_char(char::from(byte))?;
            }
        }
        Ok(())
    }
}

/// Flattened node for display and JSON output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterTree {
    #[serde(rename = "type")]
    pub filter_type: FilterType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_rule: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub dn_attributes: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FilterTree>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::SchemaRegistry;

    fn desc(schema: &SchemaRegistry, name: &str) -> AttributeDescription {
        AttributeDescription::parse(schema, name)
    }

    #[test]
    fn test_and_or_drop_duplicates() {
        let schema = SchemaRegistry::core().unwrap();
        let bob = Filter::equality(desc(&schema, "cn"), "Bob");
        let bob_again = Filter::equality(desc(&schema, "CN"), "Bob");
        let sn = Filter::present(desc(&schema, "sn"));

        let and = Filter::and([bob.clone(), sn.clone(), bob_again]);
        assert_eq!(and.components().len(), 2);
        let or = Filter::or([sn.clone(), sn]);
        assert_eq!(or.components().len(), 1);
    }

    #[test]
    fn test_structural_equality() {
        let schema = SchemaRegistry::core().unwrap();
        let a = Filter::equality(desc(&schema, "cn;lang-EN"), "x");
        let b = Filter::equality(desc(&schema, "commonName;lang-en"), "x");
        assert_eq!(a, b);
        assert_ne!(a, Filter::equality(desc(&schema, "cn"), "x"));
        assert_ne!(a, Filter::approximate(desc(&schema, "cn;lang-en"), "x"));

        let sn = Filter::present(desc(&schema, "sn"));
        assert_eq!(
            Filter::and([a.clone(), sn.clone()]),
            Filter::and([sn.clone(), b.clone()])
        );
        assert_ne!(Filter::and([a.clone(), sn.clone()]), Filter::or([a, sn]));
    }

    #[test]
    fn test_display() {
        let schema = SchemaRegistry::core().unwrap();
        let filter = Filter::and([
            Filter::equality(desc(&schema, "objectClass"), "person"),
            Filter::not(Filter::equality(desc(&schema, "sn"), "Jones")),
        ]);
        assert_eq!(filter.to_string(), "(&(objectClass=person)(!(sn=Jones)))");

        let sub = Filter::substring(
            desc(&schema, "cn"),
            Some(b"al".to_vec()),
            vec![b"x".to_vec()],
            Some(b"er".to_vec()),
        )
        .unwrap();
        assert_eq!(sub.to_string(), "(cn=al*x*er)");

        let ext = Filter::extensible(
            Some(desc(&schema, "cn")),
            Some("caseExactMatch".to_string()),
            "Bob",
            true,
        )
        .unwrap();
        assert_eq!(ext.to_string(), "(cn:dn:caseExactMatch:=Bob)");
        assert_eq!(Filter::object_class_present(&schema).to_string(), "(objectClass=*)");
        assert_eq!(Filter::or([]).to_string(), "(|)");
    }

    #[test]
    fn test_unsafe_bytes_are_escaped() {
        let schema = SchemaRegistry::core().unwrap();
        let filter = Filter::equality(desc(&schema, "cn"), "a(b)*c\\".as_bytes());
        assert_eq!(filter.to_string(), "(cn=a\\28b\\29\\2ac\\5c)");
        assert_eq!(escape_value(&[0x00, 0x7F, 0xC3, 0xA9]), "\\00\\7f\\c3\\a9");
    }

    #[test]
    fn test_constructor_validation() {
        let schema = SchemaRegistry::core().unwrap();
        assert!(matches!(
            Filter::substring(desc(&schema, "cn"), None, Vec::new(), None),
            Err(SearchError::Malformed { .. })
        ));
        assert!(Filter::extensible(None, None, "x", false).is_err());
        assert!(Filter::extensible(None, Some("caseIgnoreMatch".into()), "x", true).is_ok());
    }

    #[test]
    fn test_tree_and_depth() {
        let schema = SchemaRegistry::core().unwrap();
        let filter = Filter::not(Filter::or([
            Filter::present(desc(&schema, "mail")),
            Filter::greater_or_equal(desc(&schema, "uidNumber"), "100"),
        ]));
        assert_eq!(filter.depth(), 2);

        let tree = filter.tree();
        assert_eq!(tree.filter_type, FilterType::Not);
        assert_eq!(tree.children[0].children.len(), 2);
        assert_eq!(tree.children[0].children[1].value.as_deref(), Some("100"));

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["type"], "NOT");
        assert_eq!(json["children"][0]["children"][0]["type"], "PRESENT");
    }
}
