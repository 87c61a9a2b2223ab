//! Versioned binary entry encoding
//!
//! Version 3 layout:
//!
//! ```text
//! 0x03
//! BER length of the config block, then the config flags byte
//! [BER length + UTF-8 DN]                      unless the DN is excluded
//! object classes                               token, or count + zero-terminated names
//! user attributes                              count, then token or literal form each
//! operational attributes                       same as user attributes
//! ```
//!
//! A literal attribute is its zero-terminated `name;option` description,
//! a BER value count, and each value with a BER length prefix. Virtual and
//! empty attributes are never written. Versions 1 and 2 are read but never
//! written.

use std::collections::BTreeMap;
use std::sync::Arc;

use quarry_core::{parse_attribute_description, Attribute, AttributeMap, Dn, Entry, ObjectClass, Schema};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ber::{append_ber_length, append_length_prefixed, ByteReader};
use crate::compressed::CompressedSchema;
use crate::error::{StorageError, StorageResult};

/// Version written by [`EntryCodec::encode`]
pub const CURRENT_VERSION: u8 = 0x03;

const EXCLUDE_DN: u8 = 0x01;
const COMPRESS_ATTRIBUTE_DESCRIPTIONS: u8 = 0x02;
const COMPRESS_OBJECT_CLASSES: u8 = 0x04;

/// Options controlling how an entry is encoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Leave the DN out; the caller stores it elsewhere
    pub exclude_dn: bool,
    pub compress_attribute_descriptions: bool,
    pub compress_object_classes: bool,
}

impl EncodeConfig {
    pub fn with_exclude_dn(mut self, exclude: bool) -> Self {
        self.exclude_dn = exclude;
        self
    }

    pub fn with_compressed_attribute_descriptions(mut self, compress: bool) -> Self {
        self.compress_attribute_descriptions = compress;
        self
    }

    pub fn with_compressed_object_classes(mut self, compress: bool) -> Self {
        self.compress_object_classes = compress;
        self
    }

    pub fn uses_dictionary(&self) -> bool {
        self.compress_attribute_descriptions || self.compress_object_classes
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.exclude_dn {
            flags |= EXCLUDE_DN;
        }
        if self.compress_attribute_descriptions {
            flags |= COMPRESS_ATTRIBUTE_DESCRIPTIONS;
        }
        if self.compress_object_classes {
            flags |= COMPRESS_OBJECT_CLASSES;
        }
        flags
    }

    fn from_flags(flags: u8) -> Self {
        Self {
            exclude_dn: flags & EXCLUDE_DN != 0,
            compress_attribute_descriptions: flags & COMPRESS_ATTRIBUTE_DESCRIPTIONS != 0,
            compress_object_classes: flags & COMPRESS_OBJECT_CLASSES != 0,
        }
    }

    /// BER length followed by the flag bytes
    fn encode(&self, buf: &mut Vec<u8>) -> StorageResult<()> {
        append_length_prefixed(buf, &[self.flags()])
    }

    fn decode(reader: &mut ByteReader<'_>) -> StorageResult<Self> {
        let block = reader.get_length_prefixed()?;
        Ok(block.first().map(|flags| Self::from_flags(*flags)).unwrap_or_default())
    }
}

/// Encodes entries to bytes and back
pub struct EntryCodec<'a> {
    schema: &'a dyn Schema,
    compressed: Option<&'a dyn CompressedSchema>,
}

impl<'a> EntryCodec<'a> {
    pub fn new(schema: &'a dyn Schema) -> Self {
        Self {
            schema,
            compressed: None,
        }
    }

    /// Dictionary used when the config asks for compressed descriptions
    pub fn with_compressed_schema(mut self, compressed: &'a dyn CompressedSchema) -> Self {
        self.compressed = Some(compressed);
        self
    }

    pub fn encode(&self, entry: &Entry, config: &EncodeConfig) -> StorageResult<Vec<u8>> {
        let dictionary = if config.uses_dictionary() {
            Some(self.compressed.ok_or_else(|| {
                StorageError::Encode("compression requested without a compressed schema".to_string())
            })?)
        } else {
            None
        };

        let mut buf = Vec::with_capacity(256);
        buf.push(CURRENT_VERSION);
        config.encode(&mut buf)?;

        if !config.exclude_dn {
            append_length_prefixed(&mut buf, entry.dn().to_string().as_bytes())?;
        }

        match dictionary {
            Some(dictionary) if config.compress_object_classes => {
                dictionary.encode_object_classes(&mut buf, entry.object_classes())?;
            }
            _ => {
                append_ber_length(&mut buf, entry.object_classes().len())?;
                for name in entry.object_classes().values() {
                    buf.extend_from_slice(name.as_bytes());
                    buf.push(0);
                }
            }
        }

        let attribute_dictionary = dictionary.filter(|_| config.compress_attribute_descriptions);
        encode_attributes(&mut buf, entry.user_attributes(), attribute_dictionary)?;
        encode_attributes(&mut buf, entry.operational_attributes(), attribute_dictionary)?;

        debug!("Encoded entry {} in {} bytes", entry.dn(), buf.len());
        Ok(buf)
    }

    pub fn decode(&self, bytes: &[u8]) -> StorageResult<Entry> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.get_u8()?;
        if !(0x01..=CURRENT_VERSION).contains(&version) {
            return Err(StorageError::UnsupportedVersion(version));
        }

        let config = if version == 0x01 {
            EncodeConfig::default()
        } else {
            EncodeConfig::decode(&mut reader)?
        };
        let dictionary = if config.uses_dictionary() {
            Some(self.compressed.ok_or_else(|| {
                StorageError::decode(reader.position(), "entry uses a compressed schema but none is configured")
            })?)
        } else {
            None
        };

        let dn = if config.exclude_dn {
            Dn::root()
        } else {
            let start = reader.position();
            let len = reader.get_ber_length()?;
            let text = reader.get_string(len)?;
            Dn::parse(&text).map_err(|e| StorageError::decode(start, e.to_string()))?
        };

        let object_classes = match dictionary {
            Some(dictionary) if config.compress_object_classes => {
                dictionary.decode_object_classes(&mut reader, self.schema)?
            }
            _ if version < 0x03 => self.decode_joined_object_classes(&mut reader)?,
            _ => {
                let count = reader.get_ber_length()?;
                let mut classes = BTreeMap::new();
                for _ in 0..count {
                    let name = reader.get_zero_terminated_string()?;
                    self.insert_object_class(&mut classes, name);
                }
                classes
            }
        };

        let attribute_dictionary = dictionary.filter(|_| config.compress_attribute_descriptions);
        let user_attributes = self.decode_attributes(version, &mut reader, attribute_dictionary)?;
        let operational_attributes = self.decode_attributes(version, &mut reader, attribute_dictionary)?;

        if !reader.is_empty() {
            debug!("Ignoring {} trailing bytes after entry {}", reader.remaining(), dn);
        }
        Ok(Entry::from_parts(dn, object_classes, user_attributes, operational_attributes))
    }

    /// Versions 1 and 2: one length, names separated by zero bytes
    fn decode_joined_object_classes(
        &self,
        reader: &mut ByteReader<'_>,
    ) -> StorageResult<BTreeMap<Arc<ObjectClass>, String>> {
        let start = reader.position();
        let len = reader.get_ber_length()?;
        let block = reader.get_bytes(len)?;
        let mut classes = BTreeMap::new();
        for name in block.split(|b| *b == 0).filter(|n| !n.is_empty()) {
            let name = String::from_utf8(name.to_vec())
                .map_err(|_| StorageError::decode(start, "invalid UTF-8 in object class"))?;
            self.insert_object_class(&mut classes, name);
        }
        Ok(classes)
    }

    fn insert_object_class(&self, classes: &mut BTreeMap<Arc<ObjectClass>, String>, name: String) {
        let object_class = self.schema.object_class_or_default(&name.to_ascii_lowercase());
        classes.insert(object_class, name);
    }

    fn decode_attributes(
        &self,
        version: u8,
        reader: &mut ByteReader<'_>,
        dictionary: Option<&dyn CompressedSchema>,
    ) -> StorageResult<AttributeMap> {
        let count = reader.get_ber_length()?;
        let mut attributes = AttributeMap::new();
        for _ in 0..count {
            let attr = match dictionary {
                Some(dictionary) => {
                    if version < 0x03 {
                        // Total attribute length, unused
                        reader.get_ber_length()?;
                    }
                    dictionary.decode_attribute(reader, self.schema)?
                }
                None => self.decode_literal_attribute(reader)?,
            };
            insert_attribute(&mut attributes, attr);
        }
        Ok(attributes)
    }

    fn decode_literal_attribute(&self, reader: &mut ByteReader<'_>) -> StorageResult<Attribute> {
        let start = reader.position();
        let description = reader.get_zero_terminated_string()?;
        let (name, options) = parse_attribute_description(&description);
        if name.is_empty() {
            return Err(StorageError::decode(start, "empty attribute description"));
        }
        let mut attr = Attribute::new(self.schema.attribute_type_or_default(name))
            .with_name(name)
            .with_options(options);
        let count = reader.get_ber_length()?;
        for _ in 0..count {
            attr.add(reader.get_length_prefixed()?.to_vec());
        }
        Ok(attr)
    }
}

fn encode_attributes(
    buf: &mut Vec<u8>,
    attributes: &AttributeMap,
    dictionary: Option<&dyn CompressedSchema>,
) -> StorageResult<()> {
    let stored: Vec<&Attribute> = attributes
        .values()
        .flatten()
        .filter(|a| !a.is_virtual() && !a.is_empty())
        .collect();
    append_ber_length(buf, stored.len())?;

    for attr in stored {
        match dictionary {
            Some(dictionary) => dictionary.encode_attribute(buf, attr)?,
            None => {
                buf.extend_from_slice(attr.name_with_options().as_bytes());
                buf.push(0);
                append_ber_length(buf, attr.len())?;
                for value in attr.values() {
                    append_length_prefixed(buf, value)?;
                }
            }
        }
    }
    Ok(())
}

fn insert_attribute(attributes: &mut AttributeMap, attr: Attribute) {
    let list = attributes.entry(attr.attribute_type().clone()).or_default();
    match list.iter_mut().find(|a| a.options_equal(attr.options())) {
        Some(existing) => {
            existing.add_all(&attr);
        }
        None => list.push(attr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressed::MemoryCompressedSchema;
    use quarry_core::{ConflictBehavior, EntryRecord, SchemaRegistry};

    fn bob(schema: &SchemaRegistry) -> Entry {
        EntryRecord::new("uid=bob,ou=people,dc=example,dc=com")
            .with_attribute("objectClass", ["top", "person", "organizationalPerson"])
            .with_attribute("cn", ["Bob Smith", "Robert Smith"])
            .with_attribute("cn;lang-fr", ["Robert"])
            .with_attribute("sn", ["Smith"])
            .with_attribute("description", ["x".repeat(300)])
            .with_attribute("createTimestamp", ["20240101120000Z"])
            .into_entry(schema)
            .unwrap()
    }

    #[test]
    fn test_round_trip_literal() {
        let schema = SchemaRegistry::core().unwrap();
        let codec = EntryCodec::new(&schema);
        let entry = bob(&schema);

        let bytes = codec.encode(&entry, &EncodeConfig::default()).unwrap();
        assert_eq!(bytes[0], CURRENT_VERSION);
        assert_eq!(&bytes[1..3], &[0x01, 0x00]);

        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, entry);
        let created = schema.attribute_type("createTimestamp").unwrap();
        assert!(decoded.operational_attribute(&created).is_some());
    }

    #[test]
    fn test_round_trip_compressed() {
        let schema = SchemaRegistry::core().unwrap();
        let dictionary = MemoryCompressedSchema::new();
        let codec = EntryCodec::new(&schema).with_compressed_schema(&dictionary);
        let entry = bob(&schema);
        let config = EncodeConfig::default()
            .with_compressed_attribute_descriptions(true)
            .with_compressed_object_classes(true);

        let literal = codec.encode(&entry, &EncodeConfig::default()).unwrap();
        let compressed = codec.encode(&entry, &config).unwrap();
        assert!(compressed.len() < literal.len());
        assert_eq!(codec.decode(&compressed).unwrap(), entry);

        let without_dictionary = EntryCodec::new(&schema);
        assert!(without_dictionary.encode(&entry, &config).is_err());
        assert!(without_dictionary.decode(&compressed).is_err());
    }

    #[test]
    fn test_exclude_dn() {
        let schema = SchemaRegistry::core().unwrap();
        let codec = EntryCodec::new(&schema);
        let bytes = codec
            .encode(&bob(&schema), &EncodeConfig::default().with_exclude_dn(true))
            .unwrap();
        assert!(codec.decode(&bytes).unwrap().dn().is_root());
    }

    #[test]
    fn test_virtual_and_empty_attributes_are_skipped() {
        let schema = SchemaRegistry::core().unwrap();
        let codec = EntryCodec::new(&schema);
        let mut entry = bob(&schema);
        let title = schema.attribute_type("title").unwrap();
        entry.install_virtual_attribute(
            Attribute::new(title.clone()).with_value("Engineer").into_virtual(),
            ConflictBehavior::RealOverridesVirtual,
        );
        let mail = schema.attribute_type("mail").unwrap();
        entry.put_attribute(mail.clone(), vec![Attribute::new(mail.clone())]);

        let decoded = codec.decode(&codec.encode(&entry, &EncodeConfig::default()).unwrap()).unwrap();
        assert!(decoded.user_attribute(&title).is_none());
        assert!(decoded.user_attribute(&mail).is_none());
        assert_eq!(decoded, bob(&schema));
    }

    #[test]
    fn test_decode_version_1_and_2() {
        let schema = SchemaRegistry::core().unwrap();
        let codec = EntryCodec::new(&schema);

        // v1: no config block, object classes as one zero-separated string
        let mut v1 = vec![0x01];
        append_length_prefixed(&mut v1, b"cn=test,o=example").unwrap();
        append_length_prefixed(&mut v1, b"top\0person").unwrap();
        v1.push(2);
        for (name, value) in [("cn", "test"), ("sn", "Tester")] {
            v1.extend_from_slice(name.as_bytes());
            v1.push(0);
            v1.push(1);
            append_length_prefixed(&mut v1, value.as_bytes()).unwrap();
        }
        v1.push(0);
        let entry = codec.decode(&v1).unwrap();
        assert_eq!(entry.dn().to_string(), "cn=test,o=example");
        assert_eq!(entry.object_classes().len(), 2);
        assert!(entry.has_value(&schema, &schema.attribute_type("sn").unwrap(), &[], b"tester"));

        // v2: config block, same object class layout
        let mut v2 = vec![0x02, 0x01, 0x01];
        append_length_prefixed(&mut v2, b"top\0organization\0").unwrap();
        v2.extend_from_slice(&[0, 0]);
        let entry = codec.decode(&v2).unwrap();
        assert!(entry.dn().is_root());
        assert_eq!(entry.object_class_names().len(), 2);
    }

    #[test]
    fn test_decode_errors() {
        let schema = SchemaRegistry::core().unwrap();
        let codec = EntryCodec::new(&schema);
        assert!(matches!(codec.decode(&[0x04]), Err(StorageError::UnsupportedVersion(4))));
        assert!(matches!(codec.decode(&[0x00]), Err(StorageError::UnsupportedVersion(0))));
        assert!(codec.decode(&[]).is_err());

        let bytes = codec.encode(&bob(&schema), &EncodeConfig::default()).unwrap();
        for cut in [2, 10, bytes.len() - 1] {
            assert!(codec.decode(&bytes[..cut]).is_err(), "truncated at {}", cut);
        }
    }
}
