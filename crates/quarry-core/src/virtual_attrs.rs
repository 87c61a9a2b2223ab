//! Virtual and collective attributes
//!
//! Virtual attribute rules compute values from the entry itself. Collective
//! attribute subentries push values onto every entry their subtree
//! specification covers, either literally or copied from another entry found
//! by DN reference or by RDN templating.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::attribute::Attribute;
use crate::dn::{Dn, Rdn};
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::schema::{names, AttributeType, Schema};
use crate::subtree::SubtreeSpecification;

/// Value of `collectiveExclusions` that turns off every collective attribute
pub const EXCLUDE_ALL_COLLECTIVE: &str = "excludeallcollectiveattributes";

/// OID form of [`EXCLUDE_ALL_COLLECTIVE`]
pub const EXCLUDE_ALL_COLLECTIVE_OID: &str = "2.5.18.0";

/// Option marking a subentry attribute as collective
pub const COLLECTIVE_OPTION: &str = "collective";

/// What happens when a computed attribute meets a real one of the same type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictBehavior {
    /// Keep both, the virtual attribute after the real ones
    MergeRealAndVirtual,
    /// Keep the real attribute and drop the virtual one
    #[default]
    RealOverridesVirtual,
    /// Suppress the real attribute in favor of the virtual one
    VirtualOverridesReal,
}

impl ConflictBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MergeRealAndVirtual => "merge-real-and-virtual",
            Self::RealOverridesVirtual => "real-overrides-virtual",
            Self::VirtualOverridesReal => "virtual-overrides-real",
        }
    }
}

impl fmt::Display for ConflictBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictBehavior {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge-real-and-virtual" => Ok(Self::MergeRealAndVirtual),
            "real-overrides-virtual" => Ok(Self::RealOverridesVirtual),
            "virtual-overrides-real" => Ok(Self::VirtualOverridesReal),
            other => Err(Error::UnwillingToPerform(format!("unknown conflict behavior '{}'", other))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches entries by DN
pub trait EntryLookup: Send + Sync {
    fn lookup(&self, dn: &Dn) -> Option<Entry>;
}

/// Supplies the collective attribute subentries whose scope covers an entry
pub trait SubentrySource: Send + Sync {
    fn collective_subentries(&self, entry: &Entry) -> Vec<&SubEntry>;
}

impl SubentrySource for Vec<SubEntry> {
    fn collective_subentries(&self, entry: &Entry) -> Vec<&SubEntry> {
        self.iter().filter(|sub| sub.covers(entry)).collect()
    }
}

/// Computes the values of a virtual attribute for an entry
pub trait VirtualAttributeProvider: Send + Sync {
    fn values(&self, entry: &Entry) -> Vec<Vec<u8>>;
}

/// The entry's own DN, as `entryDN` carries it
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryDnProvider;

impl VirtualAttributeProvider for EntryDnProvider {
    fn values(&self, entry: &Entry) -> Vec<Vec<u8>> {
        vec![entry.dn().to_string().into_bytes()]
    }
}

/// Fixed values configured by an administrator
#[derive(Debug, Clone, Default)]
pub struct ConstantValueProvider {
    values: Vec<Vec<u8>>,
}

impl ConstantValueProvider {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl VirtualAttributeProvider for ConstantValueProvider {
    fn values(&self, _entry: &Entry) -> Vec<Vec<u8>> {
        self.values.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rules and subentries
// ─────────────────────────────────────────────────────────────────────────────

/// A virtual attribute bound to a type, a provider and a scope
#[derive(Clone)]
pub struct VirtualAttributeRule {
    attr_type: Arc<AttributeType>,
    provider: Arc<dyn VirtualAttributeProvider>,
    base_dns: Vec<Dn>,
    conflict_behavior: ConflictBehavior,
}

impl VirtualAttributeRule {
    pub fn new(attr_type: Arc<AttributeType>, provider: Arc<dyn VirtualAttributeProvider>) -> Self {
        Self {
            attr_type,
            provider,
            base_dns: Vec::new(),
            conflict_behavior: ConflictBehavior::default(),
        }
    }

    /// Restrict the rule to the subtree under `base`
    pub fn with_base_dn(mut self, base: Dn) -> Self {
        self.base_dns.push(base);
        self
    }

    pub fn with_conflict_behavior(mut self, behavior: ConflictBehavior) -> Self {
        self.conflict_behavior = behavior;
        self
    }

    pub fn attribute_type(&self) -> &Arc<AttributeType> {
        &self.attr_type
    }

    pub fn conflict_behavior(&self) -> ConflictBehavior {
        self.conflict_behavior
    }

    /// True when the entry lies under one of the base DNs, or there are none
    pub fn applies_to(&self, entry: &Entry) -> bool {
        self.base_dns.is_empty() || self.base_dns.iter().any(|base| entry.dn().is_descendant_of(base))
    }

    pub fn build_attribute(&self, entry: &Entry) -> Attribute {
        Attribute::new(self.attr_type.clone())
            .with_values(self.provider.values(entry))
            .into_virtual()
    }
}

impl fmt::Debug for VirtualAttributeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualAttributeRule")
            .field("attr_type", &self.attr_type.name_or_oid())
            .field("base_dns", &self.base_dns.iter().map(Dn::to_string).collect::<Vec<_>>())
            .field("conflict_behavior", &self.conflict_behavior)
            .finish()
    }
}

/// Where an inherited collective subentry copies values from
#[derive(Debug, Clone)]
pub enum InheritFrom {
    /// The entry named by a DN-valued attribute of the target
    Dn { attribute: Arc<AttributeType> },
    /// `<rdn_type>=<value of attribute>` beneath `base`
    Rdn {
        attribute: Arc<AttributeType>,
        rdn_type: Arc<AttributeType>,
        base: Dn,
    },
}

/// A collective attribute subentry
#[derive(Debug, Clone)]
pub struct SubEntry {
    dn: Dn,
    subtree: SubtreeSpecification,
    collective: bool,
    inherited: bool,
    inherit_from: Option<InheritFrom>,
    conflict_behavior: Option<ConflictBehavior>,
    collective_attributes: Vec<Attribute>,
}

impl SubEntry {
    /// Read the subentry settings out of a stored entry
    pub fn from_entry(schema: &dyn Schema, entry: &Entry) -> Result<Self> {
        let has_class = |name: &str| {
            let base = schema.object_class(name);
            entry.object_classes().keys().any(|oc| {
                oc.has_name_or_oid(name) || base.as_ref().map_or(false, |base| oc.is_descendant_of(base))
            })
        };
        let admin_point = entry.dn().parent().unwrap_or_default();
        let subtree = match all_values(schema, entry, names::SUBTREE_SPECIFICATION).first() {
            Some(value) => SubtreeSpecification::parse(&admin_point, value)?,
            None => SubtreeSpecification::subtree(admin_point),
        };

        let collective = has_class("collectiveAttributeSubentry");
        let inherited = has_class("inheritedCollectiveAttributeSubentry");
        let from_dn = inherited && has_class("inheritedFromDNCollectiveAttributeSubentry");
        let from_rdn = inherited && has_class("inheritedFromRDNCollectiveAttributeSubentry");

        let mut collective_attributes = Vec::new();
        if collective {
            for attr in entry
                .user_attributes()
                .values()
                .chain(entry.operational_attributes().values())
                .flatten()
            {
                if attr.attribute_type().is_collective() {
                    collective_attributes.push(attr.clone().into_virtual());
                } else if attr.has_option(COLLECTIVE_OPTION) {
                    let options = attr
                        .options()
                        .iter()
                        .filter(|o| !o.eq_ignore_ascii_case(COLLECTIVE_OPTION))
                        .cloned();
                    collective_attributes.push(
                        Attribute::new(attr.attribute_type().clone())
                            .with_name(attr.name())
                            .with_options(options)
                            .with_values(attr.values().iter().cloned())
                            .into_virtual(),
                    );
                }
            }
        }

        let first = |name: &str| first_value(schema, entry, name);
        let mut inherit_from = None;
        if from_dn {
            if let Some(name) = first(names::INHERIT_FROM_DN_ATTRIBUTE) {
                inherit_from = Some(InheritFrom::Dn {
                    attribute: schema.attribute_type_or_default(&name.to_ascii_lowercase()),
                });
            }
        } else if from_rdn {
            let attribute = first(names::INHERIT_FROM_RDN_ATTRIBUTE);
            let rdn_type = first(names::INHERIT_FROM_RDN_TYPE);
            let base = first(names::INHERIT_FROM_BASE_RDN);
            if let (Some(attribute), Some(rdn_type), Some(base)) = (attribute, rdn_type, base) {
                let parent = entry.dn().parent().unwrap_or_default();
                inherit_from = Some(InheritFrom::Rdn {
                    attribute: schema.attribute_type_or_default(&attribute.to_ascii_lowercase()),
                    rdn_type: schema.attribute_type_or_default(&rdn_type.to_ascii_lowercase()),
                    base: parent.append(&Dn::parse(&base)?),
                });
            }
        }

        if inherited {
            for name in all_values(schema, entry, names::INHERIT_ATTRIBUTE) {
                collective_attributes.push(Attribute::new(schema.attribute_type_or_default(&name)).into_virtual());
            }
        }

        let conflict_behavior = if collective || inherited {
            first(names::COLLECTIVE_CONFLICT_BEHAVIOR).and_then(|v| v.parse().ok())
        } else {
            None
        };

        Ok(Self {
            dn: entry.dn().clone(),
            subtree,
            collective,
            inherited,
            inherit_from,
            conflict_behavior,
            collective_attributes,
        })
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn is_collective(&self) -> bool {
        self.collective
    }

    pub fn is_inherited_collective(&self) -> bool {
        self.inherited
    }

    pub fn inherit_from(&self) -> Option<&InheritFrom> {
        self.inherit_from.as_ref()
    }

    /// Explicit behavior from the subentry; the resolver supplies a default
    pub fn conflict_behavior(&self) -> Option<ConflictBehavior> {
        self.conflict_behavior
    }

    /// Literal collective attributes, or empty templates for inherited ones
    pub fn collective_attributes(&self) -> &[Attribute] {
        &self.collective_attributes
    }

    /// Entries governed by the subentry
    pub fn subtree(&self) -> &SubtreeSpecification {
        &self.subtree
    }

    /// True when `dn` falls inside the subtree specification, refinements aside
    pub fn applies_to(&self, dn: &Dn) -> bool {
        self.subtree.contains_dn(dn)
    }

    /// True when the entry falls inside the subtree specification
    pub fn covers(&self, entry: &Entry) -> bool {
        self.subtree.contains(entry)
    }
}

fn all_values(schema: &dyn Schema, entry: &Entry, name: &str) -> Vec<String> {
    entry
        .attribute(schema, name)
        .map(|list| list.iter().flat_map(|a| a.string_values()).collect())
        .unwrap_or_default()
}

fn first_value(schema: &dyn Schema, entry: &Entry, name: &str) -> Option<String> {
    all_values(schema, entry, name).into_iter().next()
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Merges virtual and collective attributes into entries
pub struct VirtualAttributeResolver<'a> {
    schema: &'a dyn Schema,
    rules: &'a [VirtualAttributeRule],
    subentries: Option<&'a dyn SubentrySource>,
    lookup: Option<&'a dyn EntryLookup>,
    default_conflict_behavior: ConflictBehavior,
}

impl<'a> VirtualAttributeResolver<'a> {
    pub fn new(schema: &'a dyn Schema) -> Self {
        Self {
            schema,
            rules: &[],
            subentries: None,
            lookup: None,
            default_conflict_behavior: ConflictBehavior::default(),
        }
    }

    pub fn with_rules(mut self, rules: &'a [VirtualAttributeRule]) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_subentries(mut self, subentries: &'a dyn SubentrySource) -> Self {
        self.subentries = Some(subentries);
        self
    }

    /// Source of the entries inherited collective attributes copy from
    pub fn with_lookup(mut self, lookup: &'a dyn EntryLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Behavior for subentries that do not name one
    pub fn with_default_conflict_behavior(mut self, behavior: ConflictBehavior) -> Self {
        self.default_conflict_behavior = behavior;
        self
    }

    /// Apply every applicable rule, then every collective subentry
    pub fn process(&self, entry: &mut Entry) {
        for rule in self.rules {
            if !rule.applies_to(entry) {
                continue;
            }
            let attr = rule.build_attribute(entry);
            if attr.is_empty() {
                continue;
            }
            trace!("Virtual attribute {} for {}", attr.name(), entry.dn());
            entry.install_virtual_attribute(attr, rule.conflict_behavior());
        }
        self.process_collective(entry);
    }

    fn process_collective(&self, entry: &mut Entry) {
        if entry.is_subentry() || entry.is_ldap_subentry() {
            return;
        }
        let Some(source) = self.subentries else {
            return;
        };
        let subentries = source.collective_subentries(entry);
        if subentries.is_empty() {
            return;
        }

        let Some(exclusions) = self.exclusions(entry) else {
            return;
        };

        for sub in subentries {
            if !sub.is_collective() && !sub.is_inherited_collective() {
                continue;
            }
            let inherited_from = if sub.is_inherited_collective() {
                match self.inherit_source(entry, sub) {
                    Some(source) => Some(source),
                    None => continue,
                }
            } else {
                None
            };
            let behavior = sub.conflict_behavior().unwrap_or(self.default_conflict_behavior);

            for template in sub.collective_attributes() {
                let attr_type = template.attribute_type();
                let excluded = exclusions.iter().any(|name| attr_type.has_name_or_oid(name));
                if excluded {
                    continue;
                }
                let attr = match &inherited_from {
                    Some(source) => match source.get_exact_attribute(attr_type, template.options()) {
                        Some(found) if !found.is_empty() => found.clone().into_virtual(),
                        _ => continue,
                    },
                    None => template.clone(),
                };
                trace!("Collective attribute {} from {} for {}", attr.name(), sub.dn(), entry.dn());
                entry.install_virtual_attribute(attr, behavior);
            }
        }
    }

    /// Excluded type names, or `None` when every collective attribute is excluded
    fn exclusions(&self, entry: &Entry) -> Option<Vec<String>> {
        let Some(exclusions_type) = self.schema.attribute_type(names::COLLECTIVE_EXCLUSIONS) else {
            return Some(Vec::new());
        };
        let mut names = Vec::new();
        for attr in entry.operational_attribute(&exclusions_type).unwrap_or_default() {
            for value in attr.string_values() {
                let name = value.trim().to_ascii_lowercase();
                if name == EXCLUDE_ALL_COLLECTIVE || name == EXCLUDE_ALL_COLLECTIVE_OID {
                    return None;
                }
                names.push(name);
            }
        }
        Some(names)
    }

    fn inherit_source(&self, entry: &Entry, sub: &SubEntry) -> Option<Entry> {
        let lookup = self.lookup?;
        let source_dn = match sub.inherit_from()? {
            InheritFrom::Dn { attribute } => {
                let value = first_raw_value(self.schema, entry, attribute)?;
                let dn = Dn::parse(&String::from_utf8_lossy(&value)).ok()?;
                // Stay inside the subentry's scope
                if !sub.applies_to(&dn) {
                    return None;
                }
                dn
            }
            InheritFrom::Rdn {
                attribute,
                rdn_type,
                base,
            } => {
                let value = first_raw_value(self.schema, entry, attribute)?;
                base.child(Rdn::new(rdn_type.name_or_oid(), String::from_utf8_lossy(&value)))
            }
        };
        lookup.lookup(&source_dn)
    }
}

fn first_raw_value(schema: &dyn Schema, entry: &Entry, attr_type: &AttributeType) -> Option<Vec<u8>> {
    let list = entry.get_attribute(schema, attr_type, true, &[])?;
    let value = list.iter().flat_map(|a| a.values()).next().cloned();
    value
}
