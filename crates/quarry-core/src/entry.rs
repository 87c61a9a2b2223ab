//! Directory entries and their attribute store
//!
//! An [`Entry`] holds its object classes apart from the other attributes,
//! and keeps user and operational attributes in two maps keyed by attribute
//! type. Each map value is a list with one [`Attribute`] per distinct
//! option set. Mutating operations follow LDAP modify semantics and clear
//! the entry's attachment.

use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::attribute::{parse_attribute_description, Attribute};
use crate::dn::Dn;
use crate::error::{Error, Result};
use crate::modification::{Modification, ModificationType};
use crate::schema::{AttributeType, ObjectClass, ObjectClassKind, Schema};
use crate::virtual_attrs::{ConflictBehavior, VirtualAttributeResolver};

/// Attribute lists keyed by type
pub type AttributeMap = BTreeMap<Arc<AttributeType>, Vec<Attribute>>;

/// Opaque object derived from an entry's content
pub type Attachment = Arc<dyn Any + Send + Sync>;

/// A directory entry
#[derive(Clone, Default)]
pub struct Entry {
    pub(crate) dn: Dn,
    pub(crate) object_classes: BTreeMap<Arc<ObjectClass>, String>,
    pub(crate) user_attributes: AttributeMap,
    pub(crate) operational_attributes: AttributeMap,
    pub(crate) suppressed_attributes: AttributeMap,
    pub(crate) attachment: Option<Attachment>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            ..Default::default()
        }
    }

    pub fn from_parts(
        dn: Dn,
        object_classes: BTreeMap<Arc<ObjectClass>, String>,
        user_attributes: AttributeMap,
        operational_attributes: AttributeMap,
    ) -> Self {
        Self {
            dn,
            object_classes,
            user_attributes,
            operational_attributes,
            suppressed_attributes: AttributeMap::new(),
            attachment: None,
        }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn set_dn(&mut self, dn: Dn) {
        self.attachment = None;
        self.dn = dn;
    }

    pub fn object_classes(&self) -> &BTreeMap<Arc<ObjectClass>, String> {
        &self.object_classes
    }

    /// Names of the object classes as they were given to this entry
    pub fn object_class_names(&self) -> Vec<&str> {
        self.object_classes.values().map(String::as_str).collect()
    }

    pub fn has_object_class(&self, object_class: &ObjectClass) -> bool {
        self.object_classes.contains_key(object_class)
    }

    pub fn user_attributes(&self) -> &AttributeMap {
        &self.user_attributes
    }

    pub fn operational_attributes(&self) -> &AttributeMap {
        &self.operational_attributes
    }

    /// Real attributes displaced by a virtual attribute override
    pub fn suppressed_attributes(&self) -> &AttributeMap {
        &self.suppressed_attributes
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn set_attachment(&mut self, attachment: Option<Attachment>) {
        self.attachment = attachment;
    }

    pub fn is_subentry(&self) -> bool {
        self.object_classes
            .keys()
            .any(|oc| oc.has_name_or_oid("subentry") || oc.has_name_or_oid("2.5.17.0"))
    }

    pub fn is_ldap_subentry(&self) -> bool {
        self.object_classes
            .keys()
            .any(|oc| oc.has_name_or_oid("ldapSubentry"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Object classes
    // ─────────────────────────────────────────────────────────────────────────

    /// The objectClass attribute built from the object class map
    pub fn object_class_attribute(&self, schema: &dyn Schema) -> Option<Attribute> {
        if self.object_classes.is_empty() {
            return None;
        }
        Some(Attribute::new(schema.object_class_type()).with_values(self.object_classes.values().cloned()))
    }

    pub fn set_object_classes<I>(&mut self, classes: I)
    where
        I: IntoIterator<Item = (Arc<ObjectClass>, String)>,
    {
        self.attachment = None;
        self.object_classes = classes.into_iter().collect();
    }

    pub fn add_object_class(&mut self, object_class: Arc<ObjectClass>) -> Result<()> {
        self.attachment = None;
        if self.object_classes.contains_key(&object_class) {
            return Err(Error::ObjectClassViolation(format!(
                "Entry {} already contains object class {}",
                self.dn, object_class
            )));
        }
        let name = object_class.name_or_oid().to_string();
        self.object_classes.insert(object_class, name);
        Ok(())
    }

    /// The most specific structural object class, if any
    pub fn structural_object_class(&self) -> Option<Arc<ObjectClass>> {
        let mut structural: Option<&Arc<ObjectClass>> = None;
        for oc in self.object_classes.keys() {
            if oc.kind() != ObjectClassKind::Structural {
                continue;
            }
            match structural {
                Some(current) if !oc.is_descendant_of(current) => {}
                _ => structural = Some(oc),
            }
        }
        structural.cloned()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Attributes of the given type carrying all requested options.
    ///
    /// With `include_subordinates` the result also covers every registered
    /// subtype. Returns `None` when nothing matches.
    pub fn get_attribute(
        &self,
        schema: &dyn Schema,
        attr_type: &AttributeType,
        include_subordinates: bool,
        options: &[String],
    ) -> Option<Vec<Cow<'_, Attribute>>> {
        if attr_type.is_object_class() {
            if !options.is_empty() {
                return None;
            }
            return self
                .object_class_attribute(schema)
                .map(|attr| vec![Cow::Owned(attr)]);
        }

        let subtypes = if include_subordinates {
            schema.subtypes(attr_type)
        } else {
            Vec::new()
        };

        let mut found = Vec::new();
        for t in std::iter::once(attr_type).chain(subtypes.iter().map(|t| &**t)) {
            for map in [&self.user_attributes, &self.operational_attributes] {
                if let Some(list) = map.get(t) {
                    found.extend(
                        list.iter()
                            .filter(|a| a.has_all_options(options))
                            .map(Cow::Borrowed),
                    );
                }
            }
        }

        if found.is_empty() {
            None
        } else {
            Some(found)
        }
    }

    /// Lookup by attribute description such as `cn;lang-en`, including subtypes
    pub fn attribute(&self, schema: &dyn Schema, description: &str) -> Option<Vec<Cow<'_, Attribute>>> {
        let (name, options) = parse_attribute_description(description);
        let attr_type = schema.attribute_type_or_default(name);
        self.get_attribute(schema, &attr_type, true, &options)
    }

    /// The attribute with exactly this type and option set
    pub fn get_exact_attribute(&self, attr_type: &AttributeType, options: &[String]) -> Option<&Attribute> {
        self.attribute_list(attr_type)?
            .iter()
            .find(|a| a.options_equal(options))
    }

    pub fn user_attribute(&self, attr_type: &AttributeType) -> Option<&[Attribute]> {
        self.user_attributes.get(attr_type).map(Vec::as_slice)
    }

    pub fn operational_attribute(&self, attr_type: &AttributeType) -> Option<&[Attribute]> {
        self.operational_attributes.get(attr_type).map(Vec::as_slice)
    }

    /// Presence check; attributes with no values count as absent
    pub fn has_attribute(&self, schema: &dyn Schema, attr_type: &AttributeType, options: &[String]) -> bool {
        if attr_type.is_object_class() {
            return !self.object_classes.is_empty() && options.is_empty();
        }
        self.get_attribute(schema, attr_type, true, options)
            .map_or(false, |list| list.iter().any(|a| !a.is_empty()))
    }

    pub fn has_value(
        &self,
        schema: &dyn Schema,
        attr_type: &AttributeType,
        options: &[String],
        value: &[u8],
    ) -> bool {
        if attr_type.is_object_class() {
            let name = String::from_utf8_lossy(value);
            return options.is_empty()
                && self
                    .object_classes
                    .keys()
                    .any(|oc| oc.has_name_or_oid(name.trim()));
        }
        self.get_attribute(schema, attr_type, true, options)
            .map_or(false, |list| list.iter().any(|a| a.contains(value)))
    }

    fn attribute_list(&self, attr_type: &AttributeType) -> Option<&Vec<Attribute>> {
        self.user_attributes
            .get(attr_type)
            .or_else(|| self.operational_attributes.get(attr_type))
    }

    fn map_for_mut(&mut self, attr_type: &AttributeType) -> &mut AttributeMap {
        if attr_type.is_operational() {
            &mut self.operational_attributes
        } else {
            &mut self.user_attributes
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Modify-add: merge values into the attribute with the same options.
    ///
    /// Values already present are pushed onto `duplicates` instead of
    /// failing. An attribute with no values is stored as given.
    pub fn add_attribute(&mut self, schema: &dyn Schema, attr: &Attribute, duplicates: &mut Vec<Vec<u8>>) {
        self.attachment = None;
        if attr.attribute_type().is_object_class() {
            self.set_object_class_values(schema, attr, false, duplicates);
        } else {
            self.set_attribute(attr, false, duplicates);
        }
    }

    /// Modify-replace: overwrite the attribute with the same options, or
    /// remove it when `attr` has no values
    pub fn replace_attribute(&mut self, schema: &dyn Schema, attr: &Attribute) {
        self.attachment = None;
        let mut ignored = Vec::new();
        if attr.attribute_type().is_object_class() {
            self.set_object_class_values(schema, attr, true, &mut ignored);
        } else {
            self.set_attribute(attr, true, &mut ignored);
        }
    }

    /// Store a whole attribute list for a type, replacing what was there
    pub fn put_attribute(&mut self, attr_type: Arc<AttributeType>, list: Vec<Attribute>) {
        self.attachment = None;
        let map = self.map_for_mut(&attr_type);
        if list.is_empty() {
            map.remove(&attr_type);
        } else {
            map.insert(attr_type, list);
        }
    }

    fn set_object_class_values(
        &mut self,
        schema: &dyn Schema,
        attr: &Attribute,
        replace: bool,
        duplicates: &mut Vec<Vec<u8>>,
    ) {
        if replace {
            self.object_classes.clear();
        }
        for value in attr.values() {
            let name = String::from_utf8_lossy(value).trim().to_string();
            let oc = schema.object_class_or_default(&name);
            if self.object_classes.contains_key(&oc) {
                if !replace {
                    duplicates.push(value.clone());
                }
            } else {
                self.object_classes.insert(oc, name);
            }
        }
    }

    fn set_attribute(&mut self, attr: &Attribute, replace: bool, duplicates: &mut Vec<Vec<u8>>) {
        let attr_type = attr.attribute_type().clone();
        let map = self.map_for_mut(&attr_type);

        let Some(list) = map.get_mut(&attr_type) else {
            if !(replace && attr.is_empty()) {
                map.insert(attr_type, vec![attr.clone()]);
            }
            return;
        };

        match list.iter().position(|a| a.options_equal(attr.options())) {
            Some(idx) if replace => {
                if attr.is_empty() {
                    list.remove(idx);
                    if list.is_empty() {
                        map.remove(&attr_type);
                    }
                } else {
                    list[idx] = attr.clone();
                }
            }
            Some(idx) => duplicates.extend(list[idx].add_all(attr)),
            None => {
                if !(replace && attr.is_empty()) {
                    list.push(attr.clone());
                }
            }
        }
    }

    /// Modify-delete: remove the listed values, or the whole attribute when
    /// `attr` has no values. Values that were not present are pushed onto
    /// `missing`. Returns false when no attribute with the same options
    /// exists.
    pub fn remove_attribute(&mut self, schema: &dyn Schema, attr: &Attribute, missing: &mut Vec<Vec<u8>>) -> bool {
        self.attachment = None;
        let attr_type = attr.attribute_type().clone();

        if attr_type.is_object_class() {
            if attr.is_empty() {
                let had_classes = !self.object_classes.is_empty();
                self.object_classes.clear();
                return had_classes;
            }
            for value in attr.values() {
                let name = String::from_utf8_lossy(value);
                let name = name.trim();
                let key = self
                    .object_classes
                    .keys()
                    .find(|oc| oc.has_name_or_oid(name))
                    .cloned()
                    .or_else(|| {
                        let oc = schema.object_class_or_default(name);
                        self.object_classes.contains_key(&oc).then_some(oc)
                    });
                match key {
                    Some(oc) => {
                        self.object_classes.remove(&oc);
                    }
                    None => missing.push(value.clone()),
                }
            }
            return true;
        }

        let map = self.map_for_mut(&attr_type);
        let Some(list) = map.get_mut(&attr_type) else {
            missing.extend(attr.values().iter().cloned());
            return false;
        };
        let Some(idx) = list.iter().position(|a| a.options_equal(attr.options())) else {
            return false;
        };

        if attr.is_empty() {
            list.remove(idx);
        } else {
            let existing = &mut list[idx];
            for value in attr.values() {
                if !existing.remove(value) {
                    missing.push(value.clone());
                }
            }
            if existing.is_empty() {
                list.remove(idx);
            }
        }
        if list.is_empty() {
            map.remove(&attr_type);
        }
        true
    }

    /// Remove every attribute of a type, whatever its options
    pub fn remove_attribute_type(&mut self, attr_type: &AttributeType) -> bool {
        self.attachment = None;
        if attr_type.is_object_class() {
            let had_classes = !self.object_classes.is_empty();
            self.object_classes.clear();
            return had_classes;
        }
        let user = self.user_attributes.remove(attr_type).is_some();
        let operational = self.operational_attributes.remove(attr_type).is_some();
        user || operational
    }

    /// Modify-increment: add the single integer in `attr` to every value of
    /// the attribute with the same options
    pub fn increment_attribute(&mut self, attr: &Attribute) -> Result<()> {
        let attr_type = attr.attribute_type();
        if attr_type.is_object_class() {
            return Err(Error::ConstraintViolation(format!(
                "Entry {} cannot increment the objectClass attribute",
                self.dn
            )));
        }

        let existing = self
            .get_exact_attribute(attr_type, attr.options())
            .ok_or_else(|| {
                Error::NoSuchAttribute(format!(
                    "Entry {} cannot be incremented because it does not contain attribute {}",
                    self.dn,
                    attr.name_with_options()
                ))
            })?;

        let [increment] = attr.values() else {
            return Err(Error::ConstraintViolation(format!(
                "Increment of attribute {} in entry {} requires exactly one value",
                attr.name_with_options(),
                self.dn
            )));
        };
        let increment = parse_integer(increment).ok_or_else(|| {
            Error::ConstraintViolation(format!(
                "Increment value '{}' for attribute {} is not an integer",
                String::from_utf8_lossy(increment),
                attr.name_with_options()
            ))
        })?;

        let mut updated = existing.empty_copy();
        for value in existing.values() {
            let current = parse_integer(value).ok_or_else(|| {
                Error::ConstraintViolation(format!(
                    "Value '{}' of attribute {} in entry {} is not an integer",
                    String::from_utf8_lossy(value),
                    existing.name_with_options(),
                    self.dn
                ))
            })?;
            let next = current.checked_add(increment).ok_or_else(|| {
                Error::ConstraintViolation(format!(
                    "Incrementing attribute {} in entry {} overflows",
                    existing.name_with_options(),
                    self.dn
                ))
            })?;
            updated.add(next.to_string().into_bytes());
        }

        self.attachment = None;
        let mut ignored = Vec::new();
        self.set_attribute(&updated, true, &mut ignored);
        Ok(())
    }

    /// Apply one modify change.
    ///
    /// With `relax_constraints`, adding a value that is already present and
    /// deleting a value that is absent are silently ignored.
    pub fn apply_modification(&mut self, schema: &dyn Schema, modification: &Modification, relax_constraints: bool) -> Result<()> {
        let attr = modification.attribute();

        if attr.attribute_type().is_object_class() {
            return self.apply_object_class_modification(schema, modification, relax_constraints);
        }

        match modification.kind() {
            ModificationType::Add => {
                let mut duplicates = Vec::new();
                self.add_attribute(schema, attr, &mut duplicates);
                if !duplicates.is_empty() && !relax_constraints {
                    return Err(Error::AttributeOrValueExists(format!(
                        "Entry {} already contains value(s) {} for attribute {}",
                        self.dn,
                        render_values(&duplicates),
                        attr.name_with_options()
                    )));
                }
            }
            ModificationType::Delete => {
                let mut missing = Vec::new();
                let found = self.remove_attribute(schema, attr, &mut missing);
                if relax_constraints {
                    return Ok(());
                }
                if !found {
                    return Err(Error::NoSuchAttribute(format!(
                        "Entry {} does not contain attribute {}",
                        self.dn,
                        attr.name_with_options()
                    )));
                }
                if !missing.is_empty() {
                    return Err(Error::NoSuchAttribute(format!(
                        "Entry {} does not contain value(s) {} for attribute {}",
                        self.dn,
                        render_values(&missing),
                        attr.name_with_options()
                    )));
                }
            }
            ModificationType::Replace => self.replace_attribute(schema, attr),
            ModificationType::Increment => self.increment_attribute(attr)?,
        }
        Ok(())
    }

    fn apply_object_class_modification(
        &mut self,
        schema: &dyn Schema,
        modification: &Modification,
        relax_constraints: bool,
    ) -> Result<()> {
        let attr = modification.attribute();
        match modification.kind() {
            ModificationType::Add => {
                let mut duplicates = Vec::new();
                self.add_attribute(schema, attr, &mut duplicates);
                if !duplicates.is_empty() && !relax_constraints {
                    return Err(Error::AttributeOrValueExists(format!(
                        "Entry {} already contains object class(es) {}",
                        self.dn,
                        render_values(&duplicates)
                    )));
                }
            }
            ModificationType::Delete => {
                let mut missing = Vec::new();
                self.remove_attribute(schema, attr, &mut missing);
                if !missing.is_empty() && !relax_constraints {
                    return Err(Error::NoSuchAttribute(format!(
                        "Entry {} does not contain object class(es) {}",
                        self.dn,
                        render_values(&missing)
                    )));
                }
            }
            ModificationType::Replace => self.replace_attribute(schema, attr),
            ModificationType::Increment => {
                return Err(Error::ConstraintViolation(format!(
                    "Entry {} cannot increment the objectClass attribute",
                    self.dn
                )))
            }
        }
        Ok(())
    }

    /// Apply changes in order, stopping at the first failure
    pub fn apply_modifications(
        &mut self,
        schema: &dyn Schema,
        modifications: &[Modification],
        relax_constraints: bool,
    ) -> Result<()> {
        for modification in modifications {
            self.apply_modification(schema, modification, relax_constraints)?;
        }
        Ok(())
    }

    /// Merge a computed attribute into the entry.
    ///
    /// With no real attribute of the same type the virtual one is installed
    /// directly. An existing virtual attribute is left alone, so the first
    /// source wins. Otherwise `behavior` settles the conflict.
    pub fn install_virtual_attribute(&mut self, attr: Attribute, behavior: ConflictBehavior) {
        self.attachment = None;
        let attr_type = attr.attribute_type().clone();
        let present = |map: &AttributeMap| map.get(&attr_type).map_or(false, |list| !list.is_empty());

        let map = if present(&self.user_attributes) {
            &mut self.user_attributes
        } else if present(&self.operational_attributes) {
            &mut self.operational_attributes
        } else {
            self.map_for_mut(&attr_type).insert(attr_type, vec![attr]);
            return;
        };
        let Some(list) = map.get_mut(&attr_type) else {
            return;
        };
        if list.first().map_or(false, Attribute::is_virtual) {
            return;
        }

        match behavior {
            ConflictBehavior::RealOverridesVirtual => {}
            ConflictBehavior::VirtualOverridesReal => {
                let real = std::mem::replace(list, vec![attr]);
                self.suppressed_attributes.insert(attr_type, real);
            }
            ConflictBehavior::MergeRealAndVirtual => list.push(attr),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Copies
    // ─────────────────────────────────────────────────────────────────────────

    /// Deep copy without virtual attributes.
    ///
    /// Real attributes that a virtual override had suppressed are restored.
    /// When a resolver is given, virtual attributes are recomputed on the copy.
    pub fn duplicate(&self, resolver: Option<&VirtualAttributeResolver<'_>>) -> Entry {
        let mut copy = Entry {
            dn: self.dn.clone(),
            object_classes: self.object_classes.clone(),
            user_attributes: without_virtual(&self.user_attributes),
            operational_attributes: without_virtual(&self.operational_attributes),
            suppressed_attributes: AttributeMap::new(),
            attachment: None,
        };
        for (attr_type, list) in &self.suppressed_attributes {
            copy.map_for_mut(attr_type).insert(attr_type.clone(), list.clone());
        }
        if let Some(resolver) = resolver {
            resolver.process(&mut copy);
        }
        copy
    }

    /// Copy restricted to the requested attribute descriptions.
    ///
    /// An empty request or `*` selects all user attributes, `+` selects all
    /// operational attributes, and other names select that type (with its
    /// subtypes) carrying the given options. `omit_values` yields a
    /// types-only copy.
    pub fn filter_entry(
        &self,
        schema: &dyn Schema,
        requested: &[String],
        omit_values: bool,
        omit_real: bool,
        omit_virtual: bool,
    ) -> Entry {
        let flags = CopyFlags {
            omit_values,
            omit_real,
            omit_virtual,
        };
        let mut filtered = Entry::new(self.dn.clone());

        if requested.is_empty() {
            if !omit_real {
                self.copy_object_classes(schema, None, omit_values, &mut filtered);
            }
            deep_copy(&self.user_attributes, &mut filtered.user_attributes, flags);
            return filtered;
        }

        for description in requested {
            match description.as_str() {
                "*" => {
                    if !omit_real {
                        self.copy_object_classes(schema, None, omit_values, &mut filtered);
                    }
                    deep_copy(&self.user_attributes, &mut filtered.user_attributes, flags);
                }
                "+" => deep_copy(&self.operational_attributes, &mut filtered.operational_attributes, flags),
                _ => {
                    let (name, options) = parse_attribute_description(description);
                    match schema.attribute_type(name) {
                        Some(t) if t.is_object_class() => {
                            if !omit_real {
                                self.copy_object_classes(schema, Some(name), omit_values, &mut filtered);
                            }
                        }
                        Some(t) => {
                            let mut types = vec![t.clone()];
                            types.extend(schema.subtypes(&t));
                            let user: Vec<&Attribute> = types
                                .iter()
                                .filter_map(|st| self.user_attributes.get(st))
                                .flatten()
                                .collect();
                            if !user.is_empty() {
                                merge_attributes(&user, &mut filtered.user_attributes, &t, name, &options, flags);
                            } else {
                                let operational: Vec<&Attribute> = types
                                    .iter()
                                    .filter_map(|st| self.operational_attributes.get(st))
                                    .flatten()
                                    .collect();
                                merge_attributes(
                                    &operational,
                                    &mut filtered.operational_attributes,
                                    &t,
                                    name,
                                    &options,
                                    flags,
                                );
                            }
                        }
                        None => {
                            // Unknown to the schema: match stored types by name
                            for (source, target) in [
                                (&self.user_attributes, &mut filtered.user_attributes),
                                (&self.operational_attributes, &mut filtered.operational_attributes),
                            ] {
                                for (t, list) in source {
                                    if t.has_name_or_oid(name) {
                                        let refs: Vec<&Attribute> = list.iter().collect();
                                        merge_attributes(&refs, target, t, name, &options, flags);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        filtered
    }

    fn copy_object_classes(&self, schema: &dyn Schema, name: Option<&str>, omit_values: bool, target: &mut Entry) {
        if omit_values {
            let oc_type = schema.object_class_type();
            let mut attr = Attribute::new(oc_type.clone());
            if let Some(name) = name {
                attr = attr.with_name(name);
            }
            target.user_attributes.insert(oc_type, vec![attr]);
        } else {
            target.object_classes = self.object_classes.clone();
        }
    }
}

#[derive(Clone, Copy)]
struct CopyFlags {
    omit_values: bool,
    omit_real: bool,
    omit_virtual: bool,
}

impl CopyFlags {
    fn skips(&self, attr: &Attribute) -> bool {
        attr.is_empty() || (self.omit_real && !attr.is_virtual()) || (self.omit_virtual && attr.is_virtual())
    }
}

fn deep_copy(source: &AttributeMap, target: &mut AttributeMap, flags: CopyFlags) {
    for attr in source.values().flatten() {
        if flags.skips(attr) {
            continue;
        }
        let copy = if flags.omit_values {
            attr.empty_copy()
        } else {
            attr.clone()
        };
        merge_into(target, copy);
    }
}

fn merge_attributes(
    source: &[&Attribute],
    target: &mut AttributeMap,
    requested_type: &AttributeType,
    requested_name: &str,
    options: &[String],
    flags: CopyFlags,
) {
    for attr in source {
        if flags.skips(attr) || !attr.has_all_options(options) {
            continue;
        }
        let mut copy = if flags.omit_values {
            attr.empty_copy()
        } else {
            (*attr).clone()
        };
        // Subtypes keep their own name; "name" must not rename "cn"
        if attr.attribute_type().as_ref() == requested_type && attr.name() != requested_name {
            copy = copy.with_name(requested_name);
        }
        merge_into(target, copy);
    }
}

fn merge_into(target: &mut AttributeMap, attr: Attribute) {
    let list = target.entry(attr.attribute_type().clone()).or_default();
    match list.iter_mut().find(|a| a.options_equal(attr.options())) {
        Some(existing) => {
            existing.add_all(&attr);
        }
        None => list.push(attr),
    }
}

fn without_virtual(map: &AttributeMap) -> AttributeMap {
    map.iter()
        .filter_map(|(t, list)| {
            let real: Vec<Attribute> = list.iter().filter(|a| !a.is_virtual()).cloned().collect();
            if real.is_empty() {
                None
            } else {
                Some((t.clone(), real))
            }
        })
        .collect()
}

fn parse_integer(value: &[u8]) -> Option<i64> {
    std::str::from_utf8(value).ok()?.trim().parse().ok()
}

fn render_values(values: &[Vec<u8>]) -> String {
    values
        .iter()
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

fn maps_equal(a: &AttributeMap, b: &AttributeMap) -> bool {
    a.len() == b.len()
        && a.iter().all(|(t, list)| {
            b.get(t).map_or(false, |other| {
                list.len() == other.len() && list.iter().all(|attr| other.contains(attr))
            })
        })
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.dn == other.dn
            && self.object_classes.len() == other.object_classes.len()
            && self
                .object_classes
                .keys()
                .all(|oc| other.object_classes.contains_key(oc))
            && maps_equal(&self.user_attributes, &other.user_attributes)
            && maps_equal(&self.operational_attributes, &other.operational_attributes)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("dn", &self.dn.to_string())
            .field("object_classes", &self.object_class_names())
            .field("user_attributes", &self.user_attributes.values().flatten().collect::<Vec<_>>())
            .field(
                "operational_attributes",
                &self.operational_attributes.values().flatten().collect::<Vec<_>>(),
            )
            .field("has_attachment", &self.attachment.is_some())
            .finish()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "dn: {}", self.dn)?;
        for name in self.object_classes.values() {
            writeln!(f, "objectClass: {}", name)?;
        }
        for map in [&self.user_attributes, &self.operational_attributes] {
            for attr in map.values().flatten() {
                let name = attr.name_with_options();
                for value in attr.string_values() {
                    writeln!(f, "{}: {}", name, value)?;
                }
            }
        }
        Ok(())
    }
}
