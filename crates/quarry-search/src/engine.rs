//! Filter search engine - scope, virtual attributes and filter evaluation

use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::{
    ConflictBehavior, Dn, Entry, EntryLookup, Schema, SubEntry, VirtualAttributeResolver, VirtualAttributeRule,
};
use tracing::{debug, warn};

use crate::evaluator::FilterEvaluator;
use crate::filter::Filter;
use crate::traits::{Result, SearchEngine, SearchRequest, SearchScope};

/// Stateless search over a slice of entries.
///
/// Collective attribute subentries found among the entries are applied to
/// the entries beneath them, together with the configured virtual attribute
/// rules, before the filter is evaluated.
pub struct FilterSearchEngine {
    schema: Arc<dyn Schema>,
    rules: Vec<VirtualAttributeRule>,
    conflict_behavior: ConflictBehavior,
}

impl FilterSearchEngine {
    pub fn new(schema: Arc<dyn Schema>) -> Self {
        Self {
            schema,
            rules: Vec::new(),
            conflict_behavior: ConflictBehavior::default(),
        }
    }

    pub fn with_virtual_rule(mut self, rule: VirtualAttributeRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Conflict behavior for collective subentries that do not set one
    pub fn with_default_conflict_behavior(mut self, behavior: ConflictBehavior) -> Self {
        self.conflict_behavior = behavior;
        self
    }

    fn subentries(&self, entries: &[Entry]) -> Vec<SubEntry> {
        entries
            .iter()
            .filter(|e| e.is_subentry())
            .filter_map(|e| match SubEntry::from_entry(self.schema.as_ref(), e) {
                Ok(sub) if sub.is_collective() || sub.is_inherited_collective() => Some(sub),
                Ok(_) => None,
                Err(err) => {
                    warn!("Ignoring subentry {}: {}", e.dn(), err);
                    None
                }
            })
            .collect()
    }
}

/// Subentries are only returned by base searches or filters that ask for them
fn returns_subentries(request: &SearchRequest) -> bool {
    request.scope == SearchScope::Base || mentions_subentry(&request.filter)
}

fn mentions_subentry(filter: &Filter) -> bool {
    match filter {
        Filter::And(components) | Filter::Or(components) => components.iter().any(mentions_subentry),
        Filter::Not(component) => mentions_subentry(component),
        Filter::Equality(a) => {
            a.attribute.attribute_type().is_object_class()
                && (a.value.eq_ignore_ascii_case(b"subentry") || a.value.eq_ignore_ascii_case(b"ldapSubentry"))
        }
        _ => false,
    }
}

/// Entries of one search, addressable by DN for inherited collective attributes
struct EntrySet<'a>(&'a [Entry]);

impl EntryLookup for EntrySet<'_> {
    fn lookup(&self, dn: &Dn) -> Option<Entry> {
        self.0.iter().find(|e| e.dn() == dn).cloned()
    }
}

#[async_trait]
impl SearchEngine for FilterSearchEngine {
    async fn search(&self, request: &SearchRequest, entries: &[Entry]) -> Result<Vec<Entry>> {
        let schema = self.schema.as_ref();
        let subentries = self.subentries(entries);
        let lookup = EntrySet(entries);
        let resolver = VirtualAttributeResolver::new(schema)
            .with_rules(&self.rules)
            .with_subentries(&subentries)
            .with_lookup(&lookup)
            .with_default_conflict_behavior(self.conflict_behavior);
        let evaluator = FilterEvaluator::new(schema);
        let with_subentries = returns_subentries(request);

        let mut results = Vec::new();
        for entry in entries {
            if !request.scope.contains(&request.base, entry.dn()) {
                continue;
            }
            if !with_subentries && (entry.is_subentry() || entry.is_ldap_subentry()) {
                continue;
            }

            let prepared = entry.duplicate(Some(&resolver));
            if !evaluator.matches_entry(&request.filter, &prepared)? {
                continue;
            }
            if request.size_limit > 0 && results.len() >= request.size_limit {
                debug!("Size limit of {} reached for filter {}", request.size_limit, request.filter);
                break;
            }
            results.push(prepared.filter_entry(schema, &request.attributes, request.types_only, false, false));
        }

        debug!(
            "Search {} scope={} filter={} returned {} entries",
            request.base,
            request.scope,
            request.filter,
            results.len()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{ConstantValueProvider, EntryDnProvider, EntryRecord, SchemaRegistry};

    fn schema() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::core().unwrap())
    }

    fn person(schema: &SchemaRegistry, uid: &str, sn: &str) -> Entry {
        EntryRecord::new(format!("uid={},ou=people,dc=example,dc=com", uid))
            .with_attribute("objectClass", ["top", "person", "organizationalPerson", "inetOrgPerson"])
            .with_attribute("uid", [uid])
            .with_attribute("cn", [uid])
            .with_attribute("sn", [sn])
            .into_entry(schema)
            .unwrap()
    }

    fn directory(schema: &SchemaRegistry) -> Vec<Entry> {
        vec![
            EntryRecord::new("dc=example,dc=com")
                .with_attribute("objectClass", ["top", "domain"])
                .with_attribute("dc", ["example"])
                .into_entry(schema)
                .unwrap(),
            EntryRecord::new("ou=people,dc=example,dc=com")
                .with_attribute("objectClass", ["top", "organizationalUnit"])
                .with_attribute("ou", ["people"])
                .into_entry(schema)
                .unwrap(),
            person(schema, "ana", "Smith"),
            person(schema, "bob", "Jones"),
            person(schema, "cy", "Smith"),
        ]
    }

    fn request(schema: &SchemaRegistry, base: &str, filter: &str) -> SearchRequest {
        SearchRequest::new(Dn::parse(base).unwrap(), Filter::parse(schema, filter).unwrap())
    }

    #[tokio::test]
    async fn test_search_by_filter() {
        let schema = schema();
        let engine = FilterSearchEngine::new(schema.clone());
        let entries = directory(&schema);

        let results = engine
            .search(&request(&schema, "dc=example,dc=com", "(sn=smith)"), &entries)
            .await
            .unwrap();
        let uids: Vec<String> = results.iter().map(|e| e.dn().to_string()).collect();
        assert_eq!(
            uids,
            vec![
                "uid=ana,ou=people,dc=example,dc=com",
                "uid=cy,ou=people,dc=example,dc=com"
            ]
        );
    }

    #[tokio::test]
    async fn test_search_scopes() {
        let schema = schema();
        let engine = FilterSearchEngine::new(schema.clone());
        let entries = directory(&schema);
        let all = "(objectClass=*)";

        let base = request(&schema, "ou=people,dc=example,dc=com", all).with_scope(SearchScope::Base);
        assert_eq!(engine.search(&base, &entries).await.unwrap().len(), 1);

        let one = request(&schema, "dc=example,dc=com", all).with_scope(SearchScope::OneLevel);
        assert_eq!(engine.search(&one, &entries).await.unwrap().len(), 1);

        let sub = request(&schema, "dc=example,dc=com", all);
        assert_eq!(engine.search(&sub, &entries).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_size_limit_and_count() {
        let schema = schema();
        let engine = FilterSearchEngine::new(schema.clone());
        let entries = directory(&schema);

        let limited = request(&schema, "dc=example,dc=com", "(objectClass=person)").with_size_limit(2);
        assert_eq!(engine.search(&limited, &entries).await.unwrap().len(), 2);
        assert_eq!(engine.count(&limited, &entries).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_requested_attributes() {
        let schema = schema();
        let engine = FilterSearchEngine::new(schema.clone());
        let entries = directory(&schema);

        let req = request(&schema, "dc=example,dc=com", "(uid=bob)")
            .with_attributes(["sn"])
            .with_types_only(true);
        let results = engine.search(&req, &entries).await.unwrap();
        assert_eq!(results.len(), 1);

        let sn = schema.attribute_type("sn").unwrap();
        let cn = schema.attribute_type("cn").unwrap();
        let attrs = results[0].user_attribute(&sn).unwrap();
        assert!(attrs[0].is_empty());
        assert!(results[0].user_attribute(&cn).is_none());
    }

    #[tokio::test]
    async fn test_virtual_attributes_are_searchable() {
        let schema = schema();
        let entry_dn = schema.attribute_type("entryDN").unwrap();
        let description = schema.attribute_type("description").unwrap();
        let engine = FilterSearchEngine::new(schema.clone())
            .with_virtual_rule(VirtualAttributeRule::new(entry_dn, Arc::new(EntryDnProvider)))
            .with_virtual_rule(
                VirtualAttributeRule::new(description, Arc::new(ConstantValueProvider::new(["staff"])))
                    .with_base_dn(Dn::parse("ou=people,dc=example,dc=com").unwrap()),
            );
        let entries = directory(&schema);

        let req = request(
            &schema,
            "dc=example,dc=com",
            "(entryDN=uid=bob,ou=people,dc=example,dc=com)",
        );
        assert_eq!(engine.search(&req, &entries).await.unwrap().len(), 1);

        let req = request(&schema, "dc=example,dc=com", "(description=staff)");
        assert_eq!(engine.search(&req, &entries).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_collective_subentry() {
        let schema = schema();
        let engine = FilterSearchEngine::new(schema.clone());
        let mut entries = directory(&schema);
        entries.push(
            EntryRecord::new("cn=people attributes,dc=example,dc=com")
                .with_attribute("objectClass", ["top", "subentry", "collectiveAttributeSubentry"])
                .with_attribute("cn", ["people attributes"])
                .with_attribute("subtreeSpecification", ["{}"])
                .with_attribute("c-l", ["Paris"])
                .into_entry(schema.as_ref())
                .unwrap(),
        );

        let req = request(&schema, "ou=people,dc=example,dc=com", "(&(objectClass=person)(l=Paris))");
        assert_eq!(engine.search(&req, &entries).await.unwrap().len(), 3);

        let all = request(&schema, "dc=example,dc=com", "(objectClass=*)");
        assert_eq!(engine.search(&all, &entries).await.unwrap().len(), 5);

        let subentries = request(&schema, "dc=example,dc=com", "(objectClass=subentry)");
        assert_eq!(engine.search(&subentries, &entries).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_collective_subentry_with_base() {
        let schema = schema();
        let engine = FilterSearchEngine::new(schema.clone());
        let mut entries = directory(&schema);
        for record in [
            EntryRecord::new("ou=groups,dc=example,dc=com")
                .with_attribute("objectClass", ["top", "organizationalUnit"])
                .with_attribute("ou", ["groups"]),
            EntryRecord::new("cn=admins,ou=groups,dc=example,dc=com")
                .with_attribute("objectClass", ["top", "groupOfNames"])
                .with_attribute("cn", ["admins"])
                .with_attribute("member", ["uid=ana,ou=people,dc=example,dc=com"]),
            EntryRecord::new("cn=group attributes,dc=example,dc=com")
                .with_attribute("objectClass", ["top", "subentry", "collectiveAttributeSubentry"])
                .with_attribute("cn", ["group attributes"])
                .with_attribute("subtreeSpecification", [r#"{ base "ou=groups" }"#])
                .with_attribute("c-l", ["Paris"]),
        ] {
            entries.push(record.into_entry(schema.as_ref()).unwrap());
        }

        let groups = Dn::parse("ou=groups,dc=example,dc=com").unwrap();
        let req = request(&schema, "dc=example,dc=com", "(l=Paris)");
        let results = engine.search(&req, &entries).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|e| e.dn().is_descendant_of(&groups)));
    }
}
