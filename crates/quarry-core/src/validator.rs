//! Schema conformance checks for entries

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dn::Dn;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::schema::{AttributeType, DitContentRule, DitStructureRule, NameForm, ObjectClass, ObjectClassKind, Schema};
use crate::virtual_attrs::EntryLookup;

/// How a policy-governed schema violation is handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptRejectWarn {
    /// Fail validation with the violation as the reason
    #[default]
    Reject,
    /// Log the violation and keep going
    Warn,
    /// Ignore the violation
    Accept,
}

impl fmt::Display for AcceptRejectWarn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reject => "reject",
            Self::Warn => "warn",
            Self::Accept => "accept",
        };
        f.write_str(s)
    }
}

impl FromStr for AcceptRejectWarn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "warn" => Ok(Self::Warn),
            "accept" => Ok(Self::Accept),
            other => Err(Error::UnwillingToPerform(format!(
                "unknown policy '{}' (expected reject, warn or accept)",
                other
            ))),
        }
    }
}

/// Validation settings.
///
/// `single_structural_class` governs entries with several unrelated
/// structural classes; `structural_class` governs a missing structural class
/// and every content rule, name form and structure rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub single_structural_class: AcceptRejectWarn,
    pub structural_class: AcceptRejectWarn,
    pub validate_name_forms: bool,
    pub validate_structure_rules: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            single_structural_class: AcceptRejectWarn::Reject,
            structural_class: AcceptRejectWarn::Reject,
            validate_name_forms: true,
            validate_structure_rules: true,
        }
    }
}

impl ValidationPolicy {
    pub fn with_single_structural_class(mut self, policy: AcceptRejectWarn) -> Self {
        self.single_structural_class = policy;
        self
    }

    pub fn with_structural_class(mut self, policy: AcceptRejectWarn) -> Self {
        self.structural_class = policy;
        self
    }

    pub fn with_name_forms(mut self, enabled: bool) -> Self {
        self.validate_name_forms = enabled;
        self
    }

    pub fn with_structure_rules(mut self, enabled: bool) -> Self {
        self.validate_structure_rules = enabled;
        self
    }
}

/// Checks entries against the object classes, content rules, name forms
/// and structure rules of a schema
pub struct SchemaValidator<'a> {
    schema: &'a dyn Schema,
    policy: ValidationPolicy,
    lookup: Option<&'a dyn EntryLookup>,
    suffixes: Vec<Dn>,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(schema: &'a dyn Schema) -> Self {
        Self {
            schema,
            policy: ValidationPolicy::default(),
            lookup: None,
            suffixes: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Source used to fetch the parent entry when none is provided
    pub fn with_lookup(mut self, lookup: &'a dyn EntryLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Naming context roots; no parent is looked up for an entry at a suffix
    pub fn with_suffix(mut self, suffix: Dn) -> Self {
        self.suffixes.push(suffix);
        self
    }

    pub fn with_suffixes(mut self, suffixes: impl IntoIterator<Item = Dn>) -> Self {
        self.suffixes.extend(suffixes);
        self
    }

    pub fn suffixes(&self) -> &[Dn] {
        &self.suffixes
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Validate with the name form and structure rule switches from the policy
    pub fn validate(&self, entry: &Entry, parent: Option<&Entry>) -> Result<()> {
        self.conforms_to_schema(
            entry,
            parent,
            parent.is_some(),
            self.policy.validate_name_forms,
            self.policy.validate_structure_rules,
        )
    }

    /// Check that `entry` conforms to the schema.
    ///
    /// `parent_provided` means `parent` is authoritative, even when `None`;
    /// otherwise the parent is fetched through the configured lookup when a
    /// structure rule needs it. A failure is an
    /// [`Error::ObjectClassViolation`] carrying the reason.
    pub fn conforms_to_schema(
        &self,
        entry: &Entry,
        parent: Option<&Entry>,
        parent_provided: bool,
        validate_name_forms: bool,
        validate_structure_rules: bool,
    ) -> Result<()> {
        let structural = self.select_structural_class(entry)?;

        let mut content_rule = None;
        let mut structure_rule = None;

        match &structural {
            None => {
                self.enforce(
                    self.policy.structural_class,
                    format!("Entry {} does not include a structural object class", entry.dn()),
                )?;
                self.check_attributes_and_object_classes(entry, None)?;
            }
            Some(structural) => {
                content_rule = self
                    .schema
                    .dit_content_rule(structural)
                    .filter(|rule| !rule.is_obsolete());
                self.check_attributes_and_object_classes(entry, content_rule.as_deref())?;

                if validate_name_forms {
                    let name_form = self.select_name_form(entry, structural)?;
                    if validate_structure_rules {
                        structure_rule = name_form
                            .as_deref()
                            .and_then(|nf| self.schema.dit_structure_rule(nf))
                            .filter(|rule| !rule.is_obsolete());
                    }
                }
            }
        }

        if let Some(rule) = &content_rule {
            self.check_content_rule(entry, rule)?;
        }

        self.check_structure_rule(
            entry,
            structure_rule.as_deref(),
            structural.as_deref(),
            parent,
            parent_provided,
            validate_structure_rules,
        )
    }

    fn enforce(&self, policy: AcceptRejectWarn, reason: String) -> Result<()> {
        match policy {
            AcceptRejectWarn::Reject => Err(Error::ObjectClassViolation(reason)),
            AcceptRejectWarn::Warn => {
                warn!("{}", reason);
                Ok(())
            }
            AcceptRejectWarn::Accept => Ok(()),
        }
    }

    fn select_structural_class(&self, entry: &Entry) -> Result<Option<Arc<ObjectClass>>> {
        let policy = self.policy.single_structural_class;
        let mut structural: Option<&Arc<ObjectClass>> = None;
        let mut warned = false;

        for oc in entry.object_classes().keys() {
            if oc.kind() != ObjectClassKind::Structural {
                continue;
            }
            match structural {
                None => structural = Some(oc),
                Some(current) if oc.is_descendant_of(current) => structural = Some(oc),
                Some(current) if current.is_descendant_of(oc) => {}
                Some(current) => {
                    let reason = format!(
                        "Entry {} has multiple conflicting structural object classes {} and {}",
                        entry.dn(),
                        current.name_or_oid(),
                        oc.name_or_oid()
                    );
                    if policy == AcceptRejectWarn::Reject || !warned {
                        self.enforce(policy, reason)?;
                        warned = policy == AcceptRejectWarn::Warn;
                    }
                }
            }
        }
        Ok(structural.cloned())
    }

    fn check_attributes_and_object_classes(&self, entry: &Entry, content_rule: Option<&DitContentRule>) -> Result<()> {
        let dn = entry.dn();

        for oc in entry.object_classes().keys() {
            if self.schema.object_class(oc.oid()).is_none() {
                return Err(Error::ObjectClassViolation(format!(
                    "Entry {} includes undefined object class {}",
                    dn,
                    oc.name_or_oid()
                )));
            }

            if let Some(rule) = content_rule {
                if oc.kind() == ObjectClassKind::Auxiliary && !rule.allows_auxiliary(oc) {
                    self.enforce(
                        self.policy.structural_class,
                        format!(
                            "Entry {} includes auxiliary object class {} which is not allowed by DIT content rule {}",
                            dn,
                            oc.name_or_oid(),
                            rule.name_or_oid()
                        ),
                    )?;
                }
            }

            if let Some(missing) = oc.required_attributes().iter().find(|t| !has_type(entry, t)) {
                return Err(Error::ObjectClassViolation(format!(
                    "Entry {} is missing attribute {} which is required by object class {}",
                    dn,
                    missing.name_or_oid(),
                    oc.name_or_oid()
                )));
            }
        }

        for (attr_type, list) in entry.user_attributes() {
            let allowed = entry
                .object_classes()
                .keys()
                .any(|oc| oc.is_required_or_optional(attr_type))
                || content_rule.map_or(false, |rule| rule.is_required_or_optional(attr_type));
            if !allowed {
                return Err(Error::ObjectClassViolation(format!(
                    "Entry {} includes attribute {} which is not allowed by any of its object classes",
                    dn,
                    attr_type.name_or_oid()
                )));
            }

            for attr in list {
                if attr.is_empty() {
                    return Err(Error::ObjectClassViolation(format!(
                        "Entry {} has attribute {} with no values",
                        dn,
                        attr.name_with_options()
                    )));
                }
                if attr_type.is_single_value() && attr.len() != 1 {
                    return Err(Error::ObjectClassViolation(format!(
                        "Entry {} has multiple values for single-valued attribute {}",
                        dn,
                        attr.name_with_options()
                    )));
                }
            }
        }

        for (attr_type, list) in entry.operational_attributes() {
            if attr_type.is_single_value() && list.iter().any(|a| a.len() > 1) {
                return Err(Error::ObjectClassViolation(format!(
                    "Entry {} has multiple values for single-valued attribute {}",
                    dn,
                    attr_type.name_or_oid()
                )));
            }
        }

        Ok(())
    }

    fn select_name_form(&self, entry: &Entry, structural: &ObjectClass) -> Result<Option<Arc<NameForm>>> {
        let forms: Vec<Arc<NameForm>> = self
            .schema
            .name_forms(structural)
            .into_iter()
            .filter(|nf| !nf.is_obsolete())
            .collect();
        if forms.is_empty() {
            return Ok(None);
        }

        let mut reasons = Vec::new();
        for nf in forms {
            match self.check_name_form(entry, &nf) {
                Ok(()) => return Ok(Some(nf)),
                Err(Error::ObjectClassViolation(reason)) => reasons.push(reason),
                Err(e) => return Err(e),
            }
        }
        Err(Error::ObjectClassViolation(reasons.join(", ")))
    }

    fn check_name_form(&self, entry: &Entry, name_form: &NameForm) -> Result<()> {
        let dn = entry.dn();
        let Some(rdn) = dn.rdn() else {
            return Ok(());
        };
        let policy = self.policy.structural_class;

        for required in name_form.required_attributes() {
            let in_rdn = rdn
                .avas()
                .iter()
                .any(|ava| self.schema.attribute_type_or_default(ava.attribute_type()).as_ref() == required.as_ref());
            if !in_rdn {
                self.enforce(
                    policy,
                    format!(
                        "Entry {} RDN does not contain attribute {} which is required by name form {}",
                        dn,
                        required.name_or_oid(),
                        name_form.name_or_oid()
                    ),
                )?;
            }
        }

        for ava in rdn.avas() {
            let attr_type = self.schema.attribute_type_or_default(ava.attribute_type());
            if !name_form.is_required_or_optional(&attr_type) {
                self.enforce(
                    policy,
                    format!(
                        "Entry {} RDN contains attribute {} which is not allowed by name form {}",
                        dn,
                        ava.attribute_type(),
                        name_form.name_or_oid()
                    ),
                )?;
            }
        }
        Ok(())
    }

    fn check_content_rule(&self, entry: &Entry, rule: &DitContentRule) -> Result<()> {
        let dn = entry.dn();
        let policy = self.policy.structural_class;

        for t in rule.required_attributes() {
            if !has_type(entry, t) {
                self.enforce(
                    policy,
                    format!(
                        "Entry {} is missing attribute {} which is required by DIT content rule {}",
                        dn,
                        t.name_or_oid(),
                        rule.name_or_oid()
                    ),
                )?;
            }
        }

        for t in rule.prohibited_attributes() {
            if entry.user_attributes().contains_key(t) || entry.operational_attributes().contains_key(t) {
                self.enforce(
                    policy,
                    format!(
                        "Entry {} includes attribute {} which is prohibited by DIT content rule {}",
                        dn,
                        t.name_or_oid(),
                        rule.name_or_oid()
                    ),
                )?;
            }
        }
        Ok(())
    }

    fn check_structure_rule(
        &self,
        entry: &Entry,
        rule: Option<&DitStructureRule>,
        structural: Option<&ObjectClass>,
        parent: Option<&Entry>,
        parent_provided: bool,
        validate_structure_rules: bool,
    ) -> Result<()> {
        let policy = self.policy.structural_class;

        if let Some(rule) = rule.filter(|r| !r.superior_rules().is_empty()) {
            if parent_provided {
                return match parent {
                    Some(parent) => self.check_superior_rule(entry, rule, structural, parent),
                    None => Ok(()),
                };
            }
            let Some(parent_dn) = self.parent_in_suffix(entry.dn()) else {
                return Ok(());
            };
            return match self.fetch_parent(entry, &parent_dn)? {
                Some(parent) => self.check_superior_rule(entry, rule, structural, &parent),
                None => Ok(()),
            };
        }

        if !validate_structure_rules {
            return Ok(());
        }

        // No rule governs this entry, so the parent must not be governed by one
        let fetched;
        let parent = match parent {
            Some(parent) => parent,
            None if parent_provided => return Ok(()),
            None => {
                let Some(parent_dn) = self.parent_in_suffix(entry.dn()) else {
                    return Ok(());
                };
                fetched = self.fetch_parent(entry, &parent_dn)?;
                match &fetched {
                    Some(parent) => parent,
                    None => return Ok(()),
                }
            }
        };

        let Some(parent_structural) = parent.structural_object_class() else {
            return self.enforce(
                policy,
                format!(
                    "Entry {} cannot be checked against DIT structure rules because parent {} has no structural object class",
                    entry.dn(),
                    parent.dn()
                ),
            );
        };

        for parent_form in self.schema.name_forms(&parent_structural) {
            if parent_form.is_obsolete() {
                continue;
            }
            let governed = self
                .schema
                .dit_structure_rule(&parent_form)
                .map_or(false, |r| !r.is_obsolete());
            if governed {
                self.enforce(
                    policy,
                    format!(
                        "Entry {} is not allowed beneath parent {} whose DIT structure rule does not permit it",
                        entry.dn(),
                        parent.dn()
                    ),
                )?;
            }
        }
        Ok(())
    }

    /// Parent from the lookup; a missing parent is reported through the policy
    fn fetch_parent(&self, entry: &Entry, parent_dn: &Dn) -> Result<Option<Entry>> {
        let policy = self.policy.structural_class;
        let Some(lookup) = self.lookup else {
            self.enforce(
                policy,
                format!(
                    "Entry {} cannot be checked against DIT structure rules: no entry source to read parent {}",
                    entry.dn(),
                    parent_dn
                ),
            )?;
            return Ok(None);
        };
        let parent = lookup.lookup(parent_dn);
        if parent.is_none() {
            self.enforce(
                policy,
                format!(
                    "Entry {} cannot be checked against DIT structure rules because parent {} does not exist",
                    entry.dn(),
                    parent_dn
                ),
            )?;
        }
        Ok(parent)
    }

    /// The parent DN, unless the entry is a suffix or sits directly under the root DSE
    fn parent_in_suffix(&self, dn: &Dn) -> Option<Dn> {
        if self.suffixes.contains(dn) {
            return None;
        }
        dn.parent().filter(|parent| !parent.is_root())
    }

    fn check_superior_rule(
        &self,
        entry: &Entry,
        rule: &DitStructureRule,
        structural: Option<&ObjectClass>,
        parent: &Entry,
    ) -> Result<()> {
        let policy = self.policy.structural_class;
        let Some(parent_structural) = parent.structural_object_class() else {
            return self.enforce(
                policy,
                format!(
                    "Entry {} cannot be checked against DIT structure rule {} because parent {} has no structural object class",
                    entry.dn(),
                    rule.name_or_rule_id(),
                    parent.dn()
                ),
            );
        };

        let allowed = rule
            .superior_rules()
            .iter()
            .any(|sup| sup.structural_class().as_ref() == parent_structural.as_ref());
        if !allowed {
            self.enforce(
                policy,
                format!(
                    "Entry {} violates DIT structure rule {}: object class {} is not allowed beneath parent class {}",
                    entry.dn(),
                    rule.name_or_rule_id(),
                    structural.map_or("(none)", |oc| oc.name_or_oid()),
                    parent_structural.name_or_oid()
                ),
            )?;
        }
        Ok(())
    }
}

fn has_type(entry: &Entry, attr_type: &AttributeType) -> bool {
    attr_type.is_object_class()
        || entry.user_attributes().contains_key(attr_type)
        || entry.operational_attributes().contains_key(attr_type)
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::attribute::{parse_attribute_description, Attribute};
    use crate::schema::SchemaRegistry;

    fn entry(schema: &SchemaRegistry, dn: &str, attrs: &[(&str, &[&str])]) -> Entry {
        let mut entry = Entry::new(Dn::parse(dn).unwrap());
        for (name, values) in attrs {
            let (type_name, options) = parse_attribute_description(name);
            let attr = Attribute::new(schema.attribute_type_or_default(type_name))
                .with_options(options)
                .with_values(values.iter().map(|v| v.as_bytes().to_vec()));
            entry.add_attribute(schema, &attr, &mut Vec::new());
        }
        entry
    }

    fn bob(schema: &SchemaRegistry) -> Entry {
        entry(
            schema,
            "uid=bob,ou=people,dc=example,dc=com",
            &[
                ("objectClass", &["top", "person"]),
                ("cn", &["Bob Smith"]),
                ("sn", &["Smith"]),
            ],
        )
    }

    fn people(schema: &SchemaRegistry) -> Entry {
        entry(
            schema,
            "ou=people,dc=example,dc=com",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["people"])],
        )
    }

    fn plain_policy() -> ValidationPolicy {
        ValidationPolicy::default()
            .with_name_forms(false)
            .with_structure_rules(false)
    }

    #[test]
    fn test_person_requires_sn() {
        let schema = SchemaRegistry::core().unwrap();
        let validator = SchemaValidator::new(&schema).with_policy(plain_policy());
        let mut bob = bob(&schema);
        validator.validate(&bob, None).unwrap();

        bob.remove_attribute_type(&schema.attribute_type("sn").unwrap());
        let err = validator.validate(&bob, None).unwrap_err();
        assert!(matches!(err, Error::ObjectClassViolation(_)));
        assert!(err.to_string().contains("missing attribute sn"));
    }

    #[test]
    fn test_multiple_structural_classes_follow_policy() {
        let schema = SchemaRegistry::core().unwrap();
        let mut bob = bob(&schema);
        bob.add_attribute(
            &schema,
            &Attribute::new(schema.object_class_type()).with_value("organizationalUnit"),
            &mut Vec::new(),
        );
        bob.add_attribute(
            &schema,
            &Attribute::new(schema.attribute_type("ou").unwrap()).with_value("x"),
            &mut Vec::new(),
        );

        let reject = SchemaValidator::new(&schema).with_policy(plain_policy());
        assert!(reject.validate(&bob, None).is_err());

        for policy in [AcceptRejectWarn::Warn, AcceptRejectWarn::Accept] {
            let lenient = SchemaValidator::new(&schema).with_policy(plain_policy().with_single_structural_class(policy));
            lenient.validate(&bob, None).unwrap();
        }
    }

    #[test]
    fn test_missing_structural_class_follows_policy() {
        let schema = SchemaRegistry::core().unwrap();
        let aux_only = entry(
            &schema,
            "cn=thing,dc=example,dc=com",
            &[("objectClass", &["top", "extensibleObject"]), ("cn", &["thing"])],
        );
        let reject = SchemaValidator::new(&schema).with_policy(plain_policy());
        assert!(reject.validate(&aux_only, None).is_err());
        let accept =
            SchemaValidator::new(&schema).with_policy(plain_policy().with_structural_class(AcceptRejectWarn::Accept));
        accept.validate(&aux_only, None).unwrap();
    }

    #[test]
    fn test_unknown_class_and_disallowed_attribute() {
        let schema = SchemaRegistry::core().unwrap();
        // Placeholder classes are structural, so allow a second one
        let validator = SchemaValidator::new(&schema)
            .with_policy(plain_policy().with_single_structural_class(AcceptRejectWarn::Accept));

        let mut unknown = bob(&schema);
        unknown.add_attribute(
            &schema,
            &Attribute::new(schema.object_class_type()).with_value("madeUpClass"),
            &mut Vec::new(),
        );
        let err = validator.validate(&unknown, None).unwrap_err();
        assert!(err.to_string().contains("undefined object class madeUpClass"));

        let mut extra = bob(&schema);
        extra.add_attribute(
            &schema,
            &Attribute::new(schema.attribute_type("mail").unwrap()).with_value("bob@example.com"),
            &mut Vec::new(),
        );
        let err = validator.validate(&extra, None).unwrap_err();
        assert!(err.to_string().contains("attribute mail"));
    }

    #[test]
    fn test_single_valued_and_empty_attributes() {
        let schema = SchemaRegistry::core().unwrap();
        let validator = SchemaValidator::new(&schema).with_policy(plain_policy());

        let two_dcs = entry(
            &schema,
            "dc=example,dc=com",
            &[("objectClass", &["top", "domain"]), ("dc", &["example", "sample"])],
        );
        let err = validator.validate(&two_dcs, None).unwrap_err();
        assert!(err.to_string().contains("single-valued"));

        let empty = entry(
            &schema,
            "uid=bob,dc=example,dc=com",
            &[
                ("objectClass", &["top", "person"]),
                ("cn", &["Bob"]),
                ("sn", &["Smith"]),
                ("description", &[]),
            ],
        );
        let err = validator.validate(&empty, None).unwrap_err();
        assert!(err.to_string().contains("no values"));
    }

    #[test]
    fn test_content_rule() {
        let schema = SchemaRegistry::core().unwrap();
        let person = schema.object_class("person").unwrap();
        schema
            .register_dit_content_rule(
                DitContentRule::new(person)
                    .with_name("personContent")
                    .with_optional([schema.attribute_type("mail").unwrap()])
                    .with_prohibited([schema.attribute_type("description").unwrap()]),
            )
            .unwrap();
        let validator = SchemaValidator::new(&schema).with_policy(plain_policy());

        let with_mail = entry(
            &schema,
            "uid=bob,dc=example,dc=com",
            &[
                ("objectClass", &["top", "person"]),
                ("cn", &["Bob"]),
                ("sn", &["Smith"]),
                ("mail", &["bob@example.com"]),
            ],
        );
        validator.validate(&with_mail, None).unwrap();

        let mut posix = with_mail.clone();
        posix.add_attribute(
            &schema,
            &Attribute::new(schema.object_class_type()).with_value("posixAccount"),
            &mut Vec::new(),
        );
        let err = validator.validate(&posix, None).unwrap_err();
        assert!(err.to_string().contains("auxiliary object class posixAccount"));

        let mut described = with_mail;
        described.add_attribute(
            &schema,
            &Attribute::new(schema.attribute_type("description").unwrap()).with_value("x"),
            &mut Vec::new(),
        );
        let err = validator.validate(&described, None).unwrap_err();
        assert!(err.to_string().contains("prohibited"));
    }

    fn register_rules(schema: &SchemaRegistry) {
        let ou_form = schema
            .register_name_form(NameForm::new(
                "1.3.6.1.4.1.60000.9.1",
                "ouNameForm",
                schema.object_class("organizationalUnit").unwrap(),
                vec![schema.attribute_type("ou").unwrap()],
            ))
            .unwrap();
        let person_form = schema
            .register_name_form(NameForm::new(
                "1.3.6.1.4.1.60000.9.2",
                "personNameForm",
                schema.object_class("person").unwrap(),
                vec![schema.attribute_type("uid").unwrap()],
            ))
            .unwrap();
        let ou_rule = schema
            .register_dit_structure_rule(DitStructureRule::new(1, ou_form))
            .unwrap();
        schema
            .register_dit_structure_rule(DitStructureRule::new(2, person_form).with_superior(ou_rule))
            .unwrap();
    }

    #[test]
    fn test_name_forms() {
        let schema = SchemaRegistry::core().unwrap();
        register_rules(&schema);
        let validator = SchemaValidator::new(&schema);
        let parent = people(&schema);

        validator
            .conforms_to_schema(&bob(&schema), Some(&parent), true, true, false)
            .unwrap();

        let by_cn = entry(
            &schema,
            "cn=Bob Smith,ou=people,dc=example,dc=com",
            &[("objectClass", &["top", "person"]), ("cn", &["Bob Smith"]), ("sn", &["Smith"])],
        );
        let err = validator
            .conforms_to_schema(&by_cn, Some(&parent), true, true, false)
            .unwrap_err();
        assert!(err.to_string().contains("personNameForm"));

        let warn = SchemaValidator::new(&schema)
            .with_policy(ValidationPolicy::default().with_structural_class(AcceptRejectWarn::Warn));
        warn.conforms_to_schema(&by_cn, Some(&parent), true, true, false)
            .unwrap();
    }

    #[test]
    fn test_structure_rules_check_parent_class() {
        let schema = SchemaRegistry::core().unwrap();
        register_rules(&schema);
        let validator = SchemaValidator::new(&schema);

        validator
            .conforms_to_schema(&bob(&schema), Some(&people(&schema)), true, true, true)
            .unwrap();

        let domain = entry(
            &schema,
            "dc=example,dc=com",
            &[("objectClass", &["top", "domain"]), ("dc", &["example"])],
        );
        let under_domain = entry(
            &schema,
            "uid=bob,dc=example,dc=com",
            &[("objectClass", &["top", "person"]), ("cn", &["Bob"]), ("sn", &["Smith"])],
        );
        let err = validator
            .conforms_to_schema(&under_domain, Some(&domain), true, true, true)
            .unwrap_err();
        assert!(err.to_string().contains("structure rule 2"));
    }

    #[test]
    fn test_ungoverned_child_of_governed_parent() {
        let schema = SchemaRegistry::core().unwrap();
        register_rules(&schema);
        let validator = SchemaValidator::new(&schema);

        let device_like = entry(
            &schema,
            "o=acme,ou=people,dc=example,dc=com",
            &[("objectClass", &["top", "organization"]), ("o", &["acme"])],
        );
        let err = validator
            .conforms_to_schema(&device_like, Some(&people(&schema)), true, true, true)
            .unwrap_err();
        assert!(err.to_string().contains("beneath parent"));
    }

    struct Directory(HashMap<String, Entry>);

    impl EntryLookup for Directory {
        fn lookup(&self, dn: &Dn) -> Option<Entry> {
            self.0.get(&dn.normalized()).cloned()
        }
    }

    #[test]
    fn test_parent_fetched_through_lookup() {
        let schema = SchemaRegistry::core().unwrap();
        register_rules(&schema);
        let parent = people(&schema);
        let directory = Directory(HashMap::from([(parent.dn().normalized(), parent)]));

        let validator = SchemaValidator::new(&schema).with_lookup(&directory);
        validator.validate(&bob(&schema), None).unwrap();

        let orphan = entry(
            &schema,
            "uid=bob,ou=nowhere,dc=example,dc=com",
            &[("objectClass", &["top", "person"]), ("cn", &["Bob"]), ("sn", &["Smith"])],
        );
        let err = validator.validate(&orphan, None).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_suffix_entry_has_no_parent_to_fetch() {
        let schema = SchemaRegistry::core().unwrap();
        let suffix = entry(
            &schema,
            "dc=example,dc=com",
            &[("objectClass", &["top", "domain"]), ("dc", &["example"])],
        );
        let directory = Directory(HashMap::from([
            (suffix.dn().normalized(), suffix.clone()),
            (people(&schema).dn().normalized(), people(&schema)),
        ]));

        let unanchored = SchemaValidator::new(&schema).with_lookup(&directory);
        let err = unanchored.validate(&suffix, None).unwrap_err();
        assert!(err.to_string().contains("parent dc=com does not exist"));

        let validator = SchemaValidator::new(&schema)
            .with_lookup(&directory)
            .with_suffix(suffix.dn().clone());
        assert_eq!(validator.policy().structural_class, AcceptRejectWarn::Reject);
        validator.validate(&suffix, None).unwrap();
        validator.validate(&people(&schema), None).unwrap();
        validator.validate(&bob(&schema), None).unwrap();
    }
}
