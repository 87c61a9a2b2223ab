//! Serializable form of an entry
//!
//! Used wherever entries cross a text boundary: the CLI reads and writes
//! them as JSON and the codec tests build fixtures from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attribute::{parse_attribute_description, Attribute};
use crate::dn::Dn;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::schema::Schema;

/// Entry as a DN plus attribute descriptions mapped to string values.
///
/// `objectClass` is an ordinary key here. Values that are not UTF-8 are
/// rendered lossily.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub dn: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl EntryRecord {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute<I, S>(mut self, description: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .entry(description.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Render every attribute of `entry`, virtual ones included
    pub fn from_entry(entry: &Entry) -> Self {
        let mut record = Self::new(entry.dn().to_string());
        if !entry.object_classes().is_empty() {
            record.attributes.insert(
                "objectClass".to_string(),
                entry.object_classes().values().cloned().collect(),
            );
        }
        for attr in entry
            .user_attributes()
            .values()
            .chain(entry.operational_attributes().values())
            .flatten()
        {
            record
                .attributes
                .entry(attr.name_with_options())
                .or_default()
                .extend(attr.string_values());
        }
        record
    }

    /// Build an entry, resolving attribute names against `schema`
    pub fn into_entry(self, schema: &dyn Schema) -> Result<Entry> {
        let dn = Dn::parse(&self.dn)?;
        let mut entry = Entry::new(dn);
        for (description, values) in self.attributes {
            let (name, options) = parse_attribute_description(&description);
            if name.is_empty() {
                return Err(Error::Protocol(format!("empty attribute description in entry {}", self.dn)));
            }
            let attr = Attribute::new(schema.attribute_type_or_default(name))
                .with_name(name)
                .with_options(options)
                .with_values(values);
            let mut duplicates = Vec::new();
            entry.add_attribute(schema, &attr, &mut duplicates);
        }
        Ok(entry)
    }
}

impl From<&Entry> for EntryRecord {
    fn from(entry: &Entry) -> Self {
        Self::from_entry(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    #[test]
    fn test_record_to_entry() {
        let schema = SchemaRegistry::core().unwrap();
        let record = EntryRecord::new("uid=bob,dc=example,dc=com")
            .with_attribute("objectClass", ["top", "person"])
            .with_attribute("cn", ["Bob"])
            .with_attribute("cn;lang-fr", ["Robert"])
            .with_attribute("sn", ["Smith"]);

        let entry = record.clone().into_entry(&schema).unwrap();
        assert_eq!(entry.object_classes().len(), 2);
        let cn = schema.attribute_type("cn").unwrap();
        assert_eq!(entry.user_attribute(&cn).unwrap().len(), 2);

        let back = EntryRecord::from_entry(&entry);
        assert_eq!(back.attributes["cn;lang-fr"], vec!["Robert".to_string()]);
        assert_eq!(back.attributes["objectClass"].len(), 2);
    }

    #[test]
    fn test_record_json_shape() {
        let json = r#"{"dn":"cn=x,o=test","attributes":{"cn":["x"]}}"#;
        let record: EntryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.dn, "cn=x,o=test");

        let no_attrs: EntryRecord = serde_json::from_str(r#"{"dn":""}"#).unwrap();
        assert!(no_attrs.attributes.is_empty());
    }

    #[test]
    fn test_record_rejects_bad_dn() {
        let schema = SchemaRegistry::core().unwrap();
        assert!(EntryRecord::new("not a dn").into_entry(&schema).is_err());
    }
}
