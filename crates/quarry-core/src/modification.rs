//! LDAP modify changes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;
use crate::error::Error;

/// Kind of change applied to an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationType {
    Add,
    Delete,
    Replace,
    Increment,
}

impl fmt::Display for ModificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Replace => "replace",
            Self::Increment => "increment",
        };
        f.write_str(s)
    }
}

impl FromStr for ModificationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "delete" => Ok(Self::Delete),
            "replace" => Ok(Self::Replace),
            "increment" => Ok(Self::Increment),
            other => Err(Error::Protocol(format!("unknown modification type '{}'", other))),
        }
    }
}

/// A single change: operation plus target attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Modification {
    kind: ModificationType,
    attribute: Attribute,
}

impl Modification {
    pub fn new(kind: ModificationType, attribute: Attribute) -> Self {
        Self { kind, attribute }
    }

    pub fn add(attribute: Attribute) -> Self {
        Self::new(ModificationType::Add, attribute)
    }

    pub fn delete(attribute: Attribute) -> Self {
        Self::new(ModificationType::Delete, attribute)
    }

    pub fn replace(attribute: Attribute) -> Self {
        Self::new(ModificationType::Replace, attribute)
    }

    pub fn increment(attribute: Attribute) -> Self {
        Self::new(ModificationType::Increment, attribute)
    }

    pub fn kind(&self) -> ModificationType {
        self.kind
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modification_type_from_str() {
        assert_eq!("REPLACE".parse::<ModificationType>().unwrap(), ModificationType::Replace);
        assert!("merge".parse::<ModificationType>().is_err());
        assert_eq!(ModificationType::Increment.to_string(), "increment");
    }
}
