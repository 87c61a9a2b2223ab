//! Schema read interface and the in-memory registry

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::schema::matching::{standard_rules, MatchingRule, MatchingRuleRef};
use crate::schema::types::{
    AttributeType, DitContentRule, DitStructureRule, MatchingRuleUse, NameForm, ObjectClass, OBJECT_CLASS_OID,
};

/// Read access to schema definitions.
///
/// Every component that resolves attribute types, object classes or
/// matching rules takes a `&dyn Schema` explicitly.
pub trait Schema: Send + Sync {
    /// Attribute type by name or OID
    fn attribute_type(&self, name_or_oid: &str) -> Option<Arc<AttributeType>>;

    /// Object class by name or OID
    fn object_class(&self, name_or_oid: &str) -> Option<Arc<ObjectClass>>;

    /// Matching rule by name or OID
    fn matching_rule(&self, name_or_oid: &str) -> Option<MatchingRuleRef>;

    /// Name forms registered for a structural class
    fn name_forms(&self, structural_class: &ObjectClass) -> Vec<Arc<NameForm>>;

    /// DIT content rule for a structural class
    fn dit_content_rule(&self, structural_class: &ObjectClass) -> Option<Arc<DitContentRule>>;

    /// DIT structure rule governing a name form
    fn dit_structure_rule(&self, name_form: &NameForm) -> Option<Arc<DitStructureRule>>;

    /// Matching rule use for an extensible match rule
    fn matching_rule_use(&self, rule: &dyn MatchingRule) -> Option<Arc<MatchingRuleUse>>;

    /// Every registered type whose superior chain includes `attr_type`
    fn subtypes(&self, attr_type: &AttributeType) -> Vec<Arc<AttributeType>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Provided methods
    // ─────────────────────────────────────────────────────────────────────────

    fn may_have_subtypes(&self, attr_type: &AttributeType) -> bool {
        !self.subtypes(attr_type).is_empty()
    }

    /// Registered type, or an unregistered placeholder for unknown names
    fn attribute_type_or_default(&self, name: &str) -> Arc<AttributeType> {
        self.attribute_type(name)
            .unwrap_or_else(|| Arc::new(AttributeType::placeholder(name)))
    }

    /// Registered class, or an unregistered placeholder for unknown names
    fn object_class_or_default(&self, name: &str) -> Arc<ObjectClass> {
        self.object_class(name)
            .unwrap_or_else(|| Arc::new(ObjectClass::placeholder(name, self.object_class("top"))))
    }

    /// The objectClass attribute type
    fn object_class_type(&self) -> Arc<AttributeType> {
        self.attribute_type(OBJECT_CLASS_OID).unwrap_or_else(|| {
            let mut t = AttributeType::new(OBJECT_CLASS_OID, "objectClass");
            if let Some(rule) = self.matching_rule("objectIdentifierMatch") {
                t = t.with_equality(rule);
            }
            Arc::new(t)
        })
    }
}

/// In-memory schema registry.
///
/// Each table sits behind its own lock; registration takes the write lock
/// while lookups share the read lock.
pub struct SchemaRegistry {
    attribute_types: RwLock<HashMap<String, Arc<AttributeType>>>,
    object_classes: RwLock<HashMap<String, Arc<ObjectClass>>>,
    matching_rules: RwLock<HashMap<String, MatchingRuleRef>>,
    name_forms: RwLock<HashMap<String, Vec<Arc<NameForm>>>>,
    content_rules: RwLock<HashMap<String, Arc<DitContentRule>>>,
    structure_rules: RwLock<HashMap<String, Arc<DitStructureRule>>>,
    matching_rule_uses: RwLock<HashMap<String, Arc<MatchingRuleUse>>>,
}

impl SchemaRegistry {
    /// Registry holding only the built-in matching rules
    pub fn new() -> Self {
        let mut rules = HashMap::new();
        for rule in standard_rules() {
            rules.insert(rule.oid().to_ascii_lowercase(), rule.clone());
            rules.insert(rule.name().to_ascii_lowercase(), rule);
        }
        Self {
            attribute_types: RwLock::new(HashMap::new()),
            object_classes: RwLock::new(HashMap::new()),
            matching_rules: RwLock::new(rules),
            name_forms: RwLock::new(HashMap::new()),
            content_rules: RwLock::new(HashMap::new()),
            structure_rules: RwLock::new(HashMap::new()),
            matching_rule_uses: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_attribute_type(&self, attr_type: AttributeType) -> Result<Arc<AttributeType>> {
        let attr_type = Arc::new(attr_type);
        let mut table = self.attribute_types.write().map_err(lock_error)?;
        let keys = keys_for(attr_type.oid(), attr_type.names());
        check_conflicts(&table, &keys, attr_type.oid(), |t| t.oid())?;
        for key in keys {
            table.insert(key, attr_type.clone());
        }
        Ok(attr_type)
    }

    pub fn register_object_class(&self, object_class: ObjectClass) -> Result<Arc<ObjectClass>> {
        let object_class = Arc::new(object_class);
        let mut table = self.object_classes.write().map_err(lock_error)?;
        let keys = keys_for(object_class.oid(), object_class.names());
        check_conflicts(&table, &keys, object_class.oid(), |oc| oc.oid())?;
        for key in keys {
            table.insert(key, object_class.clone());
        }
        Ok(object_class)
    }

    pub fn register_matching_rule(&self, rule: MatchingRuleRef) -> Result<()> {
        let mut table = self.matching_rules.write().map_err(lock_error)?;
        let names = [rule.name().to_string()];
        let keys = keys_for(rule.oid(), &names);
        check_conflicts(&table, &keys, rule.oid(), |r| r.oid())?;
        for key in keys {
            table.insert(key, rule.clone());
        }
        Ok(())
    }

    pub fn register_name_form(&self, name_form: NameForm) -> Result<Arc<NameForm>> {
        let name_form = Arc::new(name_form);
        let mut table = self.name_forms.write().map_err(lock_error)?;
        let forms = table
            .entry(name_form.structural_class().oid().to_ascii_lowercase())
            .or_default();
        if forms.iter().any(|f| f.oid().eq_ignore_ascii_case(name_form.oid())) {
            return Err(Error::Schema(format!(
                "name form {} is already registered",
                name_form.name_or_oid()
            )));
        }
        forms.push(name_form.clone());
        Ok(name_form)
    }

    pub fn register_dit_content_rule(&self, rule: DitContentRule) -> Result<Arc<DitContentRule>> {
        let rule = Arc::new(rule);
        let key = rule.structural_class().oid().to_ascii_lowercase();
        let mut table = self.content_rules.write().map_err(lock_error)?;
        if table.contains_key(&key) {
            return Err(Error::Schema(format!(
                "a DIT content rule for {} is already registered",
                rule.structural_class().name_or_oid()
            )));
        }
        table.insert(key, rule.clone());
        Ok(rule)
    }

    pub fn register_dit_structure_rule(&self, rule: DitStructureRule) -> Result<Arc<DitStructureRule>> {
        let rule = Arc::new(rule);
        let key = rule.name_form().oid().to_ascii_lowercase();
        let mut table = self.structure_rules.write().map_err(lock_error)?;
        if table.contains_key(&key) {
            return Err(Error::Schema(format!(
                "a DIT structure rule for name form {} is already registered",
                rule.name_form().name_or_oid()
            )));
        }
        table.insert(key, rule.clone());
        Ok(rule)
    }

    pub fn register_matching_rule_use(&self, rule_use: MatchingRuleUse) -> Result<Arc<MatchingRuleUse>> {
        let rule_use = Arc::new(rule_use);
        let mut table = self.matching_rule_uses.write().map_err(lock_error)?;
        table.insert(rule_use.matching_rule_oid().to_ascii_lowercase(), rule_use.clone());
        Ok(rule_use)
    }

    /// Remove an attribute type under all its names. Returns whether it existed.
    pub fn deregister_attribute_type(&self, name_or_oid: &str) -> Result<bool> {
        let mut table = self.attribute_types.write().map_err(lock_error)?;
        let Some(existing) = table.get(&name_or_oid.to_ascii_lowercase()).cloned() else {
            return Ok(false);
        };
        table.retain(|_, t| t != &existing);
        Ok(true)
    }

    /// Remove an object class under all its names. Returns whether it existed.
    pub fn deregister_object_class(&self, name_or_oid: &str) -> Result<bool> {
        let mut table = self.object_classes.write().map_err(lock_error)?;
        let Some(existing) = table.get(&name_or_oid.to_ascii_lowercase()).cloned() else {
            return Ok(false);
        };
        table.retain(|_, oc| oc != &existing);
        Ok(true)
    }

    /// Distinct registered attribute types
    pub fn attribute_types(&self) -> Vec<Arc<AttributeType>> {
        let table = self.attribute_types.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Arc<AttributeType>> = Vec::new();
        for t in table.values() {
            if !out.contains(t) {
                out.push(t.clone());
            }
        }
        out.sort();
        out
    }

    /// Distinct registered object classes
    pub fn object_classes(&self) -> Vec<Arc<ObjectClass>> {
        let table = self.object_classes.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Arc<ObjectClass>> = Vec::new();
        for oc in table.values() {
            if !out.contains(oc) {
                out.push(oc.clone());
            }
        }
        out.sort();
        out
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema for SchemaRegistry {
    fn attribute_type(&self, name_or_oid: &str) -> Option<Arc<AttributeType>> {
        let table = self.attribute_types.read().unwrap_or_else(PoisonError::into_inner);
        table.get(&name_or_oid.to_ascii_lowercase()).cloned()
    }

    fn object_class(&self, name_or_oid: &str) -> Option<Arc<ObjectClass>> {
        let table = self.object_classes.read().unwrap_or_else(PoisonError::into_inner);
        table.get(&name_or_oid.to_ascii_lowercase()).cloned()
    }

    fn matching_rule(&self, name_or_oid: &str) -> Option<MatchingRuleRef> {
        let table = self.matching_rules.read().unwrap_or_else(PoisonError::into_inner);
        table.get(&name_or_oid.to_ascii_lowercase()).cloned()
    }

    fn name_forms(&self, structural_class: &ObjectClass) -> Vec<Arc<NameForm>> {
        let table = self.name_forms.read().unwrap_or_else(PoisonError::into_inner);
        table
            .get(&structural_class.oid().to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    fn dit_content_rule(&self, structural_class: &ObjectClass) -> Option<Arc<DitContentRule>> {
        let table = self.content_rules.read().unwrap_or_else(PoisonError::into_inner);
        table.get(&structural_class.oid().to_ascii_lowercase()).cloned()
    }

    fn dit_structure_rule(&self, name_form: &NameForm) -> Option<Arc<DitStructureRule>> {
        let table = self.structure_rules.read().unwrap_or_else(PoisonError::into_inner);
        table.get(&name_form.oid().to_ascii_lowercase()).cloned()
    }

    fn matching_rule_use(&self, rule: &dyn MatchingRule) -> Option<Arc<MatchingRuleUse>> {
        let table = self.matching_rule_uses.read().unwrap_or_else(PoisonError::into_inner);
        table.get(&rule.oid().to_ascii_lowercase()).cloned()
    }

    fn subtypes(&self, attr_type: &AttributeType) -> Vec<Arc<AttributeType>> {
        let table = self.attribute_types.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Arc<AttributeType>> = Vec::new();
        for t in table.values() {
            if t.is_subtype_of(attr_type) && !out.contains(t) {
                out.push(t.clone());
            }
        }
        out.sort();
        out
    }
}

fn lock_error<T>(e: PoisonError<T>) -> Error {
    Error::Schema(format!("Lock error: {}", e))
}

fn keys_for(oid: &str, names: &[String]) -> Vec<String> {
    let mut keys = vec![oid.to_ascii_lowercase()];
    for name in names {
        let key = name.to_ascii_lowercase();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

fn check_conflicts<T: ?Sized>(
    table: &HashMap<String, Arc<T>>,
    keys: &[String],
    oid: &str,
    oid_of: impl Fn(&T) -> &str,
) -> Result<()> {
    for key in keys {
        if let Some(existing) = table.get(key) {
            if !oid_of(existing).eq_ignore_ascii_case(oid) {
                return Err(Error::Schema(format!(
                    "'{}' is already registered for {}",
                    key,
                    oid_of(existing)
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::ObjectClassKind;

    #[test]
    fn test_register_and_lookup() {
        let registry = SchemaRegistry::new();
        let rule = registry.matching_rule("caseIgnoreMatch").unwrap();
        registry
            .register_attribute_type(AttributeType::new("1.2.3.4", "fooAttr").with_equality(rule))
            .unwrap();

        assert!(registry.attribute_type("FOOATTR").is_some());
        assert!(registry.attribute_type("1.2.3.4").is_some());
        assert!(registry.attribute_type("barAttr").is_none());
    }

    #[test]
    fn test_conflicting_names_are_rejected() {
        let registry = SchemaRegistry::new();
        registry
            .register_attribute_type(AttributeType::new("1.2.3.4", "fooAttr"))
            .unwrap();
        let err = registry
            .register_attribute_type(AttributeType::new("1.2.3.5", "fooattr"))
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_subtypes() {
        let registry = SchemaRegistry::new();
        let name = registry
            .register_attribute_type(AttributeType::new("2.5.4.41", "name"))
            .unwrap();
        let cn = registry
            .register_attribute_type(AttributeType::new("2.5.4.3", "cn").with_superior(name.clone()))
            .unwrap();
        registry
            .register_attribute_type(AttributeType::new("2.5.4.3.9", "cnChild").with_superior(cn.clone()))
            .unwrap();

        assert_eq!(registry.subtypes(&name).len(), 2);
        assert_eq!(registry.subtypes(&cn).len(), 1);
        assert!(!registry.may_have_subtypes(&registry.subtypes(&cn)[0]));
    }

    #[test]
    fn test_defaults_for_unknown_names() {
        let registry = SchemaRegistry::new();
        registry
            .register_object_class(ObjectClass::new("2.5.6.0", "top", ObjectClassKind::Abstract))
            .unwrap();

        let oc = registry.object_class_or_default("unknownClass");
        assert!(oc.is_placeholder());
        assert_eq!(oc.superiors().len(), 1);
        assert!(registry.object_class(oc.oid()).is_none());

        let t = registry.attribute_type_or_default("unknownAttr");
        assert!(t.is_placeholder());
        assert!(registry.object_class_type().is_object_class());
    }

    #[test]
    fn test_deregister() {
        let registry = SchemaRegistry::new();
        registry
            .register_attribute_type(AttributeType::new("1.2.3.4", "fooAttr").with_name("foo"))
            .unwrap();
        assert!(registry.deregister_attribute_type("foo").unwrap());
        assert!(registry.attribute_type("fooAttr").is_none());
        assert!(!registry.deregister_attribute_type("foo").unwrap());
    }
}
