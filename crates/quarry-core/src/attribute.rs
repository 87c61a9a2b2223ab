//! Attributes: a type, a set of options and a set of values

use std::fmt;
use std::sync::Arc;

use crate::schema::AttributeType;

/// One attribute of an entry.
///
/// Values form a set under the type's equality matching rule: adding a
/// value equal to one already present is a no-op. Options compare
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct Attribute {
    attr_type: Arc<AttributeType>,
    name: String,
    options: Vec<String>,
    values: Vec<Vec<u8>>,
    is_virtual: bool,
}

impl Attribute {
    pub fn new(attr_type: Arc<AttributeType>) -> Self {
        let name = attr_type.name_or_oid().to_string();
        Self {
            attr_type,
            name,
            options: Vec::new(),
            values: Vec::new(),
            is_virtual: false,
        }
    }

    /// Use a specific user-facing name for the type
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        let option = option.into();
        if !option.is_empty() && !self.has_option(&option) {
            self.options.push(option);
        }
        self
    }

    pub fn with_options<I, S>(self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        options.into_iter().fold(self, |attr, o| attr.with_option(o))
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.add(value.into());
        self
    }

    pub fn with_values<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        values.into_iter().fold(self, |attr, v| attr.with_value(v))
    }

    /// Mark the attribute as computed rather than stored
    pub fn into_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Same type, name and options with no values
    pub fn empty_copy(&self) -> Self {
        Self {
            attr_type: self.attr_type.clone(),
            name: self.name.clone(),
            options: self.options.clone(),
            values: Vec::new(),
            is_virtual: self.is_virtual,
        }
    }

    pub fn attribute_type(&self) -> &Arc<AttributeType> {
        &self.attr_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `name;option;option`
    pub fn name_with_options(&self) -> String {
        let mut out = self.name.clone();
        for option in &self.options {
            out.push(';');
            out.push_str(option);
        }
        out
    }

    pub fn has_options(&self) -> bool {
        !self.options.is_empty()
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o.eq_ignore_ascii_case(option))
    }

    /// True when every requested option is present (an empty request matches)
    pub fn has_all_options(&self, options: &[String]) -> bool {
        options.iter().all(|o| self.has_option(o))
    }

    /// True when the option sets are equal, ignoring case and order
    pub fn options_equal(&self, options: &[String]) -> bool {
        options_equal(&self.options, options)
    }

    pub fn contains(&self, value: &[u8]) -> bool {
        let key = self.value_key(value);
        self.values.iter().any(|v| self.value_key(v) == key)
    }

    /// Add a value; returns false when an equal value was already present
    pub fn add(&mut self, value: Vec<u8>) -> bool {
        if self.contains(&value) {
            return false;
        }
        self.values.push(value);
        true
    }

    /// Remove a value; returns false when no equal value was present
    pub fn remove(&mut self, value: &[u8]) -> bool {
        let key = self.value_key(value);
        match self.values.iter().position(|v| self.value_key(v) == key) {
            Some(idx) => {
                self.values.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Add every value of `other`, returning the ones already present
    pub fn add_all(&mut self, other: &Attribute) -> Vec<Vec<u8>> {
        let mut duplicates = Vec::new();
        for value in &other.values {
            if !self.add(value.clone()) {
                duplicates.push(value.clone());
            }
        }
        duplicates
    }

    /// Values rendered as strings, lossily for non-UTF-8 bytes
    pub fn string_values(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect()
    }

    fn value_key(&self, value: &[u8]) -> Vec<u8> {
        self.attr_type
            .equality_matching_rule()
            .and_then(|rule| rule.normalize_value(value).ok())
            .unwrap_or_else(|| value.to_vec())
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.attr_type == other.attr_type
            && self.options_equal(&other.options)
            && self.values.len() == other.values.len()
            && self.values.iter().all(|v| other.contains(v))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name_with_options(), self.string_values().join(", "))
    }
}

/// Case-insensitive, order-insensitive option set equality
pub fn options_equal(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|o| b.iter().any(|p| p.eq_ignore_ascii_case(o)))
}

/// Split an attribute description `name;opt1;opt2` into name and options
pub fn parse_attribute_description(description: &str) -> (&str, Vec<String>) {
    let mut parts = description.split(';');
    let name = parts.next().unwrap_or_default();
    let options = parts
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();
    (name, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, SchemaRegistry};

    fn cn() -> Arc<AttributeType> {
        SchemaRegistry::core().unwrap().attribute_type("cn").unwrap()
    }

    #[test]
    fn test_values_are_a_set_under_equality_rule() {
        let mut attr = Attribute::new(cn()).with_value("Bob Smith");
        assert!(!attr.add(b"bob  smith".to_vec()));
        assert!(attr.add(b"Robert".to_vec()));
        assert_eq!(attr.len(), 2);
        assert!(attr.contains(b"BOB SMITH"));
        assert!(attr.remove(b"robert"));
        assert!(!attr.remove(b"robert"));
    }

    #[test]
    fn test_options() {
        let attr = Attribute::new(cn()).with_options(["lang-en", "LANG-EN", "binary"]);
        assert_eq!(attr.options().len(), 2);
        assert!(attr.has_option("Lang-En"));
        assert!(attr.has_all_options(&[]));
        assert!(attr.options_equal(&["BINARY".to_string(), "lang-en".to_string()]));
        assert_eq!(attr.name_with_options(), "cn;lang-en;binary");
    }

    #[test]
    fn test_equality_ignores_value_order() {
        let a = Attribute::new(cn()).with_values(["a", "b"]);
        let b = Attribute::new(cn()).with_values(["B", "A"]);
        assert_eq!(a, b);
        assert_ne!(a, Attribute::new(cn()).with_value("a"));
    }

    #[test]
    fn test_parse_attribute_description() {
        assert_eq!(parse_attribute_description("cn"), ("cn", vec![]));
        let (name, options) = parse_attribute_description("cn;lang-fr;;binary");
        assert_eq!(name, "cn");
        assert_eq!(options, vec!["lang-fr".to_string(), "binary".to_string()]);
    }
}
