//! Schema element definitions

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::schema::matching::{standard_rule, MatchingRuleRef};

/// OID of the objectClass attribute type
pub const OBJECT_CLASS_OID: &str = "2.5.4.0";

/// How an attribute type is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeUsage {
    #[default]
    UserApplications,
    DirectoryOperation,
    DistributedOperation,
    DsaOperation,
}

/// Attribute type definition
#[derive(Debug, Clone)]
pub struct AttributeType {
    oid: String,
    names: Vec<String>,
    superior: Option<Arc<AttributeType>>,
    equality: Option<MatchingRuleRef>,
    ordering: Option<MatchingRuleRef>,
    substring: Option<MatchingRuleRef>,
    approximate: Option<MatchingRuleRef>,
    single_value: bool,
    collective: bool,
    no_user_modification: bool,
    obsolete: bool,
    usage: AttributeUsage,
    placeholder: bool,
}

impl AttributeType {
    pub fn new(oid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            names: vec![name.into()],
            superior: None,
            equality: None,
            ordering: None,
            substring: None,
            approximate: None,
            single_value: false,
            collective: false,
            no_user_modification: false,
            obsolete: false,
            usage: AttributeUsage::UserApplications,
            placeholder: false,
        }
    }

    /// Type created on the fly for a name the schema does not define.
    /// Uses case-insensitive matching and is never registered.
    pub fn placeholder(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let mut t = Self::new(format!("{}-oid", lower), name);
        t.equality = standard_rule("caseIgnoreMatch");
        t.ordering = standard_rule("caseIgnoreOrderingMatch");
        t.substring = standard_rule("caseIgnoreSubstringsMatch");
        t.approximate = standard_rule("soundexApproximateMatch");
        t.placeholder = true;
        t
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    pub fn with_superior(mut self, superior: Arc<AttributeType>) -> Self {
        self.superior = Some(superior);
        self
    }

    pub fn with_equality(mut self, rule: MatchingRuleRef) -> Self {
        self.equality = Some(rule);
        self
    }

    pub fn with_ordering(mut self, rule: MatchingRuleRef) -> Self {
        self.ordering = Some(rule);
        self
    }

    pub fn with_substring(mut self, rule: MatchingRuleRef) -> Self {
        self.substring = Some(rule);
        self
    }

    pub fn with_approximate(mut self, rule: MatchingRuleRef) -> Self {
        self.approximate = Some(rule);
        self
    }

    pub fn single_valued(mut self) -> Self {
        self.single_value = true;
        self
    }

    pub fn collective(mut self) -> Self {
        self.collective = true;
        self
    }

    pub fn no_user_modification(mut self) -> Self {
        self.no_user_modification = true;
        self
    }

    pub fn obsolete(mut self) -> Self {
        self.obsolete = true;
        self
    }

    pub fn with_usage(mut self, usage: AttributeUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Primary name, or the OID when the type is unnamed
    pub fn name_or_oid(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    pub fn has_name_or_oid(&self, name_or_oid: &str) -> bool {
        self.oid.eq_ignore_ascii_case(name_or_oid)
            || self.names.iter().any(|n| n.eq_ignore_ascii_case(name_or_oid))
    }

    pub fn superior(&self) -> Option<&Arc<AttributeType>> {
        self.superior.as_ref()
    }

    /// True when `ancestor` is this type's superior, directly or transitively
    pub fn is_subtype_of(&self, ancestor: &AttributeType) -> bool {
        let mut current = self.superior.as_ref();
        while let Some(sup) = current {
            if sup.as_ref() == ancestor {
                return true;
            }
            current = sup.superior.as_ref();
        }
        false
    }

    // Matching rules are inherited from the superior chain when not set

    pub fn equality_matching_rule(&self) -> Option<MatchingRuleRef> {
        self.inherited(|t| t.equality.clone())
    }

    pub fn ordering_matching_rule(&self) -> Option<MatchingRuleRef> {
        self.inherited(|t| t.ordering.clone())
    }

    pub fn substring_matching_rule(&self) -> Option<MatchingRuleRef> {
        self.inherited(|t| t.substring.clone())
    }

    pub fn approximate_matching_rule(&self) -> Option<MatchingRuleRef> {
        self.inherited(|t| t.approximate.clone())
    }

    fn inherited(&self, get: impl Fn(&AttributeType) -> Option<MatchingRuleRef>) -> Option<MatchingRuleRef> {
        let mut current = Some(self);
        while let Some(t) = current {
            if let Some(rule) = get(t) {
                return Some(rule);
            }
            current = t.superior.as_deref();
        }
        None
    }

    pub fn is_single_value(&self) -> bool {
        self.single_value
    }

    pub fn is_collective(&self) -> bool {
        self.collective
    }

    pub fn is_no_user_modification(&self) -> bool {
        self.no_user_modification
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }

    pub fn usage(&self) -> AttributeUsage {
        self.usage
    }

    pub fn is_operational(&self) -> bool {
        self.usage != AttributeUsage::UserApplications
    }

    pub fn is_object_class(&self) -> bool {
        self.oid == OBJECT_CLASS_OID
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

impl PartialEq for AttributeType {
    fn eq(&self, other: &Self) -> bool {
        self.oid.eq_ignore_ascii_case(&other.oid)
    }
}

impl Eq for AttributeType {}

impl Hash for AttributeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.oid.to_ascii_lowercase().hash(state);
    }
}

impl PartialOrd for AttributeType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttributeType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.oid
            .to_ascii_lowercase()
            .cmp(&other.oid.to_ascii_lowercase())
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_or_oid())
    }
}

/// Object class kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectClassKind {
    Abstract,
    #[default]
    Structural,
    Auxiliary,
}

impl fmt::Display for ObjectClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Abstract => "ABSTRACT",
            Self::Structural => "STRUCTURAL",
            Self::Auxiliary => "AUXILIARY",
        };
        f.write_str(s)
    }
}

/// Object class definition
#[derive(Debug, Clone)]
pub struct ObjectClass {
    oid: String,
    names: Vec<String>,
    superiors: Vec<Arc<ObjectClass>>,
    kind: ObjectClassKind,
    required: Vec<Arc<AttributeType>>,
    optional: Vec<Arc<AttributeType>>,
    obsolete: bool,
    extensible: bool,
    placeholder: bool,
}

impl ObjectClass {
    pub fn new(oid: impl Into<String>, name: impl Into<String>, kind: ObjectClassKind) -> Self {
        Self {
            oid: oid.into(),
            names: vec![name.into()],
            superiors: Vec::new(),
            kind,
            required: Vec::new(),
            optional: Vec::new(),
            obsolete: false,
            extensible: false,
            placeholder: false,
        }
    }

    /// Class created on the fly for an unknown name; never registered
    pub fn placeholder(name: &str, top: Option<Arc<ObjectClass>>) -> Self {
        let mut oc = Self::new(
            format!("{}-oid", name.to_ascii_lowercase()),
            name,
            ObjectClassKind::Structural,
        );
        oc.superiors.extend(top);
        oc.placeholder = true;
        oc
    }

    pub fn with_superior(mut self, superior: Arc<ObjectClass>) -> Self {
        self.superiors.push(superior);
        self
    }

    pub fn with_required(mut self, attrs: impl IntoIterator<Item = Arc<AttributeType>>) -> Self {
        self.required.extend(attrs);
        self
    }

    pub fn with_optional(mut self, attrs: impl IntoIterator<Item = Arc<AttributeType>>) -> Self {
        self.optional.extend(attrs);
        self
    }

    /// Every user attribute type is optional for this class
    pub fn extensible(mut self) -> Self {
        self.extensible = true;
        self
    }

    pub fn obsolete(mut self) -> Self {
        self.obsolete = true;
        self
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name_or_oid(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    pub fn has_name_or_oid(&self, name_or_oid: &str) -> bool {
        self.oid.eq_ignore_ascii_case(name_or_oid)
            || self.names.iter().any(|n| n.eq_ignore_ascii_case(name_or_oid))
    }

    pub fn kind(&self) -> ObjectClassKind {
        self.kind
    }

    pub fn superiors(&self) -> &[Arc<ObjectClass>] {
        &self.superiors
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }

    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// True when `ancestor` is reachable through the superior chain
    pub fn is_descendant_of(&self, ancestor: &ObjectClass) -> bool {
        self.superiors
            .iter()
            .any(|sup| sup.as_ref() == ancestor || sup.is_descendant_of(ancestor))
    }

    /// Required attributes, including those of superior classes
    pub fn required_attributes(&self) -> Vec<Arc<AttributeType>> {
        let mut out = Vec::new();
        self.collect(&mut out, |oc| &oc.required);
        out
    }

    /// Optional attributes, including those of superior classes
    pub fn optional_attributes(&self) -> Vec<Arc<AttributeType>> {
        let mut out = Vec::new();
        self.collect(&mut out, |oc| &oc.optional);
        out
    }

    fn collect<'a>(
        &'a self,
        out: &mut Vec<Arc<AttributeType>>,
        get: impl Fn(&'a ObjectClass) -> &'a Vec<Arc<AttributeType>> + Copy,
    ) {
        for t in get(self) {
            if !out.contains(t) {
                out.push(t.clone());
            }
        }
        for sup in &self.superiors {
            sup.collect(out, get);
        }
    }

    pub fn is_required(&self, attr_type: &AttributeType) -> bool {
        self.required.iter().any(|t| t.as_ref() == attr_type)
            || self.superiors.iter().any(|sup| sup.is_required(attr_type))
    }

    pub fn is_optional(&self, attr_type: &AttributeType) -> bool {
        if self.optional.iter().any(|t| t.as_ref() == attr_type) {
            return true;
        }
        if self.extensible && !attr_type.is_operational() {
            return true;
        }
        self.superiors.iter().any(|sup| sup.is_optional(attr_type))
    }

    pub fn is_required_or_optional(&self, attr_type: &AttributeType) -> bool {
        self.is_required(attr_type) || self.is_optional(attr_type)
    }
}

impl PartialEq for ObjectClass {
    fn eq(&self, other: &Self) -> bool {
        self.oid.eq_ignore_ascii_case(&other.oid)
    }
}

impl Eq for ObjectClass {}

impl Hash for ObjectClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.oid.to_ascii_lowercase().hash(state);
    }
}

impl PartialOrd for ObjectClass {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectClass {
    fn cmp(&self, other: &Self) -> Ordering {
        self.oid
            .to_ascii_lowercase()
            .cmp(&other.oid.to_ascii_lowercase())
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_or_oid())
    }
}

/// Name form: which attributes may appear in the RDN of entries of a
/// structural class
#[derive(Debug, Clone)]
pub struct NameForm {
    oid: String,
    names: Vec<String>,
    structural_class: Arc<ObjectClass>,
    required: Vec<Arc<AttributeType>>,
    optional: Vec<Arc<AttributeType>>,
    obsolete: bool,
}

impl NameForm {
    pub fn new(
        oid: impl Into<String>,
        name: impl Into<String>,
        structural_class: Arc<ObjectClass>,
        required: Vec<Arc<AttributeType>>,
    ) -> Self {
        Self {
            oid: oid.into(),
            names: vec![name.into()],
            structural_class,
            required,
            optional: Vec::new(),
            obsolete: false,
        }
    }

    pub fn with_optional(mut self, attrs: impl IntoIterator<Item = Arc<AttributeType>>) -> Self {
        self.optional.extend(attrs);
        self
    }

    pub fn obsolete(mut self) -> Self {
        self.obsolete = true;
        self
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }

    pub fn name_or_oid(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    pub fn has_name_or_oid(&self, name_or_oid: &str) -> bool {
        self.oid.eq_ignore_ascii_case(name_or_oid)
            || self.names.iter().any(|n| n.eq_ignore_ascii_case(name_or_oid))
    }

    pub fn structural_class(&self) -> &Arc<ObjectClass> {
        &self.structural_class
    }

    pub fn required_attributes(&self) -> &[Arc<AttributeType>] {
        &self.required
    }

    pub fn optional_attributes(&self) -> &[Arc<AttributeType>] {
        &self.optional
    }

    pub fn is_required(&self, attr_type: &AttributeType) -> bool {
        self.required.iter().any(|t| t.as_ref() == attr_type)
    }

    pub fn is_required_or_optional(&self, attr_type: &AttributeType) -> bool {
        self.is_required(attr_type) || self.optional.iter().any(|t| t.as_ref() == attr_type)
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }
}

/// DIT content rule for one structural class
#[derive(Debug, Clone)]
pub struct DitContentRule {
    structural_class: Arc<ObjectClass>,
    names: Vec<String>,
    auxiliary: Vec<Arc<ObjectClass>>,
    required: Vec<Arc<AttributeType>>,
    optional: Vec<Arc<AttributeType>>,
    prohibited: Vec<Arc<AttributeType>>,
    obsolete: bool,
}

impl DitContentRule {
    pub fn new(structural_class: Arc<ObjectClass>) -> Self {
        Self {
            structural_class,
            names: Vec::new(),
            auxiliary: Vec::new(),
            required: Vec::new(),
            optional: Vec::new(),
            prohibited: Vec::new(),
            obsolete: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    pub fn with_auxiliary(mut self, classes: impl IntoIterator<Item = Arc<ObjectClass>>) -> Self {
        self.auxiliary.extend(classes);
        self
    }

    pub fn with_required(mut self, attrs: impl IntoIterator<Item = Arc<AttributeType>>) -> Self {
        self.required.extend(attrs);
        self
    }

    pub fn with_optional(mut self, attrs: impl IntoIterator<Item = Arc<AttributeType>>) -> Self {
        self.optional.extend(attrs);
        self
    }

    pub fn with_prohibited(mut self, attrs: impl IntoIterator<Item = Arc<AttributeType>>) -> Self {
        self.prohibited.extend(attrs);
        self
    }

    pub fn obsolete(mut self) -> Self {
        self.obsolete = true;
        self
    }

    pub fn structural_class(&self) -> &Arc<ObjectClass> {
        &self.structural_class
    }

    pub fn name_or_oid(&self) -> &str {
        self.names
            .first()
            .map(String::as_str)
            .unwrap_or_else(|| self.structural_class.oid())
    }

    pub fn auxiliary_classes(&self) -> &[Arc<ObjectClass>] {
        &self.auxiliary
    }

    pub fn required_attributes(&self) -> &[Arc<AttributeType>] {
        &self.required
    }

    pub fn prohibited_attributes(&self) -> &[Arc<AttributeType>] {
        &self.prohibited
    }

    pub fn allows_auxiliary(&self, oc: &ObjectClass) -> bool {
        self.auxiliary.iter().any(|a| a.as_ref() == oc)
    }

    pub fn is_required(&self, attr_type: &AttributeType) -> bool {
        self.required.iter().any(|t| t.as_ref() == attr_type)
    }

    pub fn is_optional(&self, attr_type: &AttributeType) -> bool {
        self.optional.iter().any(|t| t.as_ref() == attr_type)
    }

    pub fn is_required_or_optional(&self, attr_type: &AttributeType) -> bool {
        self.is_required(attr_type) || self.is_optional(attr_type)
    }

    pub fn is_prohibited(&self, attr_type: &AttributeType) -> bool {
        self.prohibited.iter().any(|t| t.as_ref() == attr_type)
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }
}

/// DIT structure rule: which superior rules an entry's parent must follow
#[derive(Debug, Clone)]
pub struct DitStructureRule {
    rule_id: u32,
    names: Vec<String>,
    name_form: Arc<NameForm>,
    superiors: Vec<Arc<DitStructureRule>>,
    obsolete: bool,
}

impl DitStructureRule {
    pub fn new(rule_id: u32, name_form: Arc<NameForm>) -> Self {
        Self {
            rule_id,
            names: Vec::new(),
            name_form,
            superiors: Vec::new(),
            obsolete: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    pub fn with_superior(mut self, rule: Arc<DitStructureRule>) -> Self {
        self.superiors.push(rule);
        self
    }

    pub fn obsolete(mut self) -> Self {
        self.obsolete = true;
        self
    }

    pub fn rule_id(&self) -> u32 {
        self.rule_id
    }

    pub fn name_or_rule_id(&self) -> String {
        self.names
            .first()
            .cloned()
            .unwrap_or_else(|| self.rule_id.to_string())
    }

    pub fn name_form(&self) -> &Arc<NameForm> {
        &self.name_form
    }

    pub fn structural_class(&self) -> &Arc<ObjectClass> {
        self.name_form.structural_class()
    }

    pub fn superior_rules(&self) -> &[Arc<DitStructureRule>] {
        &self.superiors
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }
}

/// Matching rule use: the attribute types an extensible match rule applies to
#[derive(Debug, Clone)]
pub struct MatchingRuleUse {
    matching_rule_oid: String,
    attributes: Vec<Arc<AttributeType>>,
}

impl MatchingRuleUse {
    pub fn new(matching_rule_oid: impl Into<String>, attributes: Vec<Arc<AttributeType>>) -> Self {
        Self {
            matching_rule_oid: matching_rule_oid.into(),
            attributes,
        }
    }

    pub fn matching_rule_oid(&self) -> &str {
        &self.matching_rule_oid
    }

    pub fn applies_to(&self, attr_type: &AttributeType) -> bool {
        self.attributes.iter().any(|t| t.as_ref() == attr_type)
    }
}
