//! Search engine traits and request types

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use quarry_core::{Dn, Entry};
use serde::{Deserialize, Serialize};

use crate::filter::Filter;

pub use crate::error::{SearchError, SearchResult as Result};

/// Portion of the tree below the base DN that a search covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Only the base entry
    Base,
    /// Immediate children of the base
    #[serde(rename = "one")]
    OneLevel,
    /// The base and everything beneath it
    #[default]
    Subtree,
}

impl SearchScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::OneLevel => "one",
            Self::Subtree => "sub",
        }
    }

    /// Whether an entry at `dn` is in scope for a search based at `base`
    pub fn contains(&self, base: &Dn, dn: &Dn) -> bool {
        match self {
            Self::Base => dn == base,
            Self::OneLevel => dn.parent().as_ref() == Some(base),
            Self::Subtree => dn.is_descendant_of(base),
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" | "baseobject" => Ok(Self::Base),
            "one" | "onelevel" | "singlelevel" => Ok(Self::OneLevel),
            "sub" | "subtree" | "wholesubtree" => Ok(Self::Subtree),
            other => Err(format!("unknown search scope '{}'", other)),
        }
    }
}

/// Search request builder
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base: Dn,
    pub scope: SearchScope,
    pub filter: Filter,

    /// Maximum entries returned; 0 means no limit
    pub size_limit: usize,

    /// Requested attribute descriptions; empty means all user attributes
    pub attributes: Vec<String>,

    /// Return attribute names without values
    pub types_only: bool,
}

impl SearchRequest {
    pub fn new(base: Dn, filter: Filter) -> Self {
        Self {
            base,
            scope: SearchScope::default(),
            filter,
            size_limit: 0,
            attributes: Vec::new(),
            types_only: false,
        }
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_types_only(mut self, types_only: bool) -> Self {
        self.types_only = types_only;
        self
    }
}

/// Trait for search engines
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Entries in scope that match the request filter, in input order
    async fn search(&self, request: &SearchRequest, entries: &[Entry]) -> Result<Vec<Entry>>;

    /// Number of matching entries, ignoring the size limit
    async fn count(&self, request: &SearchRequest, entries: &[Entry]) -> Result<usize> {
        let unlimited = request.clone().with_size_limit(0);
        Ok(self.search(&unlimited, entries).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parsing() {
        assert_eq!("base".parse::<SearchScope>().unwrap(), SearchScope::Base);
        assert_eq!("ONE".parse::<SearchScope>().unwrap(), SearchScope::OneLevel);
        assert_eq!("subtree".parse::<SearchScope>().unwrap(), SearchScope::Subtree);
        assert!("children".parse::<SearchScope>().is_err());
        assert_eq!(SearchScope::OneLevel.to_string(), "one");
    }

    #[test]
    fn test_scope_contains() {
        let base = Dn::parse("ou=people,dc=example,dc=com").unwrap();
        let child = Dn::parse("uid=bob,ou=people,dc=example,dc=com").unwrap();
        let grandchild = Dn::parse("cn=x,uid=bob,ou=people,dc=example,dc=com").unwrap();
        let other = Dn::parse("ou=groups,dc=example,dc=com").unwrap();

        assert!(SearchScope::Base.contains(&base, &base));
        assert!(!SearchScope::Base.contains(&base, &child));
        assert!(SearchScope::OneLevel.contains(&base, &child));
        assert!(!SearchScope::OneLevel.contains(&base, &grandchild));
        assert!(!SearchScope::OneLevel.contains(&base, &base));
        assert!(SearchScope::Subtree.contains(&base, &grandchild));
        assert!(SearchScope::Subtree.contains(&base, &base));
        assert!(!SearchScope::Subtree.contains(&base, &other));
    }
}
