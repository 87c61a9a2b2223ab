//! Compressed schema dictionary
//!
//! Object class sets and attribute descriptions repeat across nearly every
//! entry of a backend. With compression enabled the codec writes a small
//! integer token in their place and the dictionary maps tokens back.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use quarry_core::{Attribute, ObjectClass, Schema};
use tracing::debug;

use crate::ber::{append_ber_length, append_length_prefixed, ByteReader};
use crate::error::{StorageError, StorageResult};

/// Token dictionary shared by the encoder and decoder of a backend
pub trait CompressedSchema: Send + Sync {
    /// Write the token for an object class set
    fn encode_object_classes(
        &self,
        buf: &mut Vec<u8>,
        object_classes: &BTreeMap<Arc<ObjectClass>, String>,
    ) -> StorageResult<()>;

    fn decode_object_classes(
        &self,
        reader: &mut ByteReader<'_>,
        schema: &dyn Schema,
    ) -> StorageResult<BTreeMap<Arc<ObjectClass>, String>>;

    /// Write the description token, then the values
    fn encode_attribute(&self, buf: &mut Vec<u8>, attr: &Attribute) -> StorageResult<()>;

    fn decode_attribute(&self, reader: &mut ByteReader<'_>, schema: &dyn Schema) -> StorageResult<Attribute>;
}

/// Attribute description as stored in the dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
struct Description {
    name: String,
    options: Vec<String>,
}

#[derive(Debug, Default)]
struct Tables {
    object_class_sets: Vec<Vec<String>>,
    object_class_index: HashMap<Vec<String>, usize>,
    descriptions: Vec<Description>,
    description_index: HashMap<String, usize>,
}

/// In-memory dictionary; tokens are assigned on first use
#[derive(Debug, Default)]
pub struct MemoryCompressedSchema {
    tables: RwLock<Tables>,
}

impl MemoryCompressedSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of object class sets and attribute descriptions registered
    pub fn len(&self) -> StorageResult<(usize, usize)> {
        let tables = self.tables.read().map_err(StorageError::lock)?;
        Ok((tables.object_class_sets.len(), tables.descriptions.len()))
    }

    fn object_class_token(&self, names: Vec<String>) -> StorageResult<usize> {
        let key: Vec<String> = {
            let mut key: Vec<String> = names.iter().map(|n| n.to_ascii_lowercase()).collect();
            key.sort();
            key
        };
        if let Some(token) = self.tables.read().map_err(StorageError::lock)?.object_class_index.get(&key) {
            return Ok(*token);
        }

        let mut tables = self.tables.write().map_err(StorageError::lock)?;
        if let Some(token) = tables.object_class_index.get(&key) {
            return Ok(*token);
        }
        let token = tables.object_class_sets.len();
        debug!("Compressed schema: object class set {} -> {}", names.join(","), token);
        tables.object_class_sets.push(names);
        tables.object_class_index.insert(key, token);
        Ok(token)
    }

    fn description_token(&self, attr: &Attribute) -> StorageResult<usize> {
        let key = description_key(attr.name(), attr.options());
        if let Some(token) = self.tables.read().map_err(StorageError::lock)?.description_index.get(&key) {
            return Ok(*token);
        }

        let mut tables = self.tables.write().map_err(StorageError::lock)?;
        if let Some(token) = tables.description_index.get(&key) {
            return Ok(*token);
        }
        let token = tables.descriptions.len();
        debug!("Compressed schema: attribute {} -> {}", attr.name_with_options(), token);
        tables.descriptions.push(Description {
            name: attr.name().to_string(),
            options: attr.options().to_vec(),
        });
        tables.description_index.insert(key, token);
        Ok(token)
    }
}

impl CompressedSchema for MemoryCompressedSchema {
    fn encode_object_classes(
        &self,
        buf: &mut Vec<u8>,
        object_classes: &BTreeMap<Arc<ObjectClass>, String>,
    ) -> StorageResult<()> {
        let token = self.object_class_token(object_classes.values().cloned().collect())?;
        append_ber_length(buf, token)
    }

    fn decode_object_classes(
        &self,
        reader: &mut ByteReader<'_>,
        schema: &dyn Schema,
    ) -> StorageResult<BTreeMap<Arc<ObjectClass>, String>> {
        let token = reader.get_ber_length()?;
        let tables = self.tables.read().map_err(StorageError::lock)?;
        let names = tables.object_class_sets.get(token).ok_or(StorageError::UnknownToken {
            kind: "object class set",
            token,
        })?;
        Ok(names
            .iter()
            .map(|name| (schema.object_class_or_default(&name.to_ascii_lowercase()), name.clone()))
            .collect())
    }

    fn encode_attribute(&self, buf: &mut Vec<u8>, attr: &Attribute) -> StorageResult<()> {
        let token = self.description_token(attr)?;
        append_ber_length(buf, token)?;
        append_ber_length(buf, attr.len())?;
        for value in attr.values() {
            append_length_prefixed(buf, value)?;
        }
        Ok(())
    }

    fn decode_attribute(&self, reader: &mut ByteReader<'_>, schema: &dyn Schema) -> StorageResult<Attribute> {
        let token = reader.get_ber_length()?;
        let description = {
            let tables = self.tables.read().map_err(StorageError::lock)?;
            tables
                .descriptions
                .get(token)
                .cloned()
                .ok_or(StorageError::UnknownToken {
                    kind: "attribute description",
                    token,
                })?
        };

        let mut attr = Attribute::new(schema.attribute_type_or_default(&description.name))
            .with_name(description.name)
            .with_options(description.options);
        let count = reader.get_ber_length()?;
        for _ in 0..count {
            attr.add(reader.get_length_prefixed()?.to_vec());
        }
        Ok(attr)
    }
}

fn description_key(name: &str, options: &[String]) -> String {
    let mut options: Vec<String> = options.iter().map(|o| o.to_ascii_lowercase()).collect();
    options.sort();
    let mut key = name.to_ascii_lowercase();
    for option in options {
        key.push(';');
        key.push_str(&option);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::SchemaRegistry;

    #[test]
    fn test_tokens_are_reused() {
        let schema = SchemaRegistry::core().unwrap();
        let dictionary = MemoryCompressedSchema::new();
        let cn = schema.attribute_type("cn").unwrap();

        let mut buf = Vec::new();
        dictionary
            .encode_attribute(&mut buf, &Attribute::new(cn.clone()).with_option("lang-en").with_value("a"))
            .unwrap();
        dictionary
            .encode_attribute(&mut buf, &Attribute::new(cn.clone()).with_option("LANG-EN").with_value("b"))
            .unwrap();
        dictionary
            .encode_attribute(&mut buf, &Attribute::new(cn).with_value("c"))
            .unwrap();
        assert_eq!(dictionary.len().unwrap(), (0, 2));

        let mut reader = ByteReader::new(&buf);
        let first = dictionary.decode_attribute(&mut reader, &schema).unwrap();
        assert!(first.has_option("lang-en"));
        assert!(first.contains(b"a"));
        dictionary.decode_attribute(&mut reader, &schema).unwrap();
        let third = dictionary.decode_attribute(&mut reader, &schema).unwrap();
        assert!(!third.has_options());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_object_class_sets() {
        let schema = SchemaRegistry::core().unwrap();
        let dictionary = MemoryCompressedSchema::new();
        let classes: BTreeMap<_, _> = ["top", "person"]
            .iter()
            .map(|n| (schema.object_class(n).unwrap(), n.to_string()))
            .collect();

        let mut buf = Vec::new();
        dictionary.encode_object_classes(&mut buf, &classes).unwrap();
        dictionary.encode_object_classes(&mut buf, &classes).unwrap();
        assert_eq!(buf, vec![0, 0]);

        let decoded = dictionary
            .decode_object_classes(&mut ByteReader::new(&buf), &schema)
            .unwrap();
        assert_eq!(decoded, classes);
    }

    #[test]
    fn test_unknown_token() {
        let schema = SchemaRegistry::core().unwrap();
        let dictionary = MemoryCompressedSchema::new();
        let err = dictionary
            .decode_attribute(&mut ByteReader::new(&[7]), &schema)
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownToken { token: 7, .. }));
    }
}
