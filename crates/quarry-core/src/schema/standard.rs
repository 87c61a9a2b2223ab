//! Standard schema elements loaded by [`SchemaRegistry::core`]

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::registry::{Schema, SchemaRegistry};
use crate::schema::types::{AttributeType, AttributeUsage, ObjectClass, ObjectClassKind, OBJECT_CLASS_OID};

/// Names of the attributes that configure a subentry
pub mod names {
    pub const SUBTREE_SPECIFICATION: &str = "subtreeSpecification";
    pub const COLLECTIVE_EXCLUSIONS: &str = "collectiveExclusions";
    pub const COLLECTIVE_CONFLICT_BEHAVIOR: &str = "collectiveConflictBehavior";
    pub const INHERIT_FROM_DN_ATTRIBUTE: &str = "inheritFromDNAttribute";
    pub const INHERIT_FROM_RDN_ATTRIBUTE: &str = "inheritFromRDNAttribute";
    pub const INHERIT_FROM_RDN_TYPE: &str = "inheritFromRDNType";
    pub const INHERIT_FROM_BASE_RDN: &str = "inheritFromBaseRDN";
    pub const INHERIT_ATTRIBUTE: &str = "inheritAttribute";
    pub const ENTRY_DN: &str = "entryDN";
}

/// Rule names used when declaring types
struct Rules<'a> {
    eq: &'a str,
    ord: Option<&'a str>,
    sub: Option<&'a str>,
    approx: Option<&'a str>,
}

const CASE_IGNORE: Rules<'static> = Rules {
    eq: "caseIgnoreMatch",
    ord: Some("caseIgnoreOrderingMatch"),
    sub: Some("caseIgnoreSubstringsMatch"),
    approx: Some("soundexApproximateMatch"),
};

const CASE_EXACT: Rules<'static> = Rules {
    eq: "caseExactMatch",
    ord: Some("caseExactOrderingMatch"),
    sub: Some("caseExactSubstringsMatch"),
    approx: None,
};

const DN: Rules<'static> = Rules {
    eq: "distinguishedNameMatch",
    ord: None,
    sub: None,
    approx: None,
};

const OID: Rules<'static> = Rules {
    eq: "objectIdentifierMatch",
    ord: None,
    sub: None,
    approx: None,
};

const INTEGER: Rules<'static> = Rules {
    eq: "integerMatch",
    ord: Some("integerOrderingMatch"),
    sub: None,
    approx: None,
};

const OCTETS: Rules<'static> = Rules {
    eq: "octetStringMatch",
    ord: Some("octetStringOrderingMatch"),
    sub: None,
    approx: None,
};

const TIME: Rules<'static> = Rules {
    eq: "generalizedTimeMatch",
    ord: Some("generalizedTimeOrderingMatch"),
    sub: None,
    approx: None,
};

const PHONE: Rules<'static> = Rules {
    eq: "telephoneNumberMatch",
    ord: None,
    sub: Some("telephoneNumberSubstringsMatch"),
    approx: None,
};

impl SchemaRegistry {
    /// Registry preloaded with the standard user, operational and
    /// collective attribute types and object classes
    pub fn core() -> Result<Self> {
        let registry = Self::new();
        load_attribute_types(&registry)?;
        load_object_classes(&registry)?;
        tracing::debug!(
            "Loaded core schema: {} attribute types, {} object classes",
            registry.attribute_types().len(),
            registry.object_classes().len()
        );
        Ok(registry)
    }
}

fn typed(registry: &SchemaRegistry, oid: &str, names: &[&str], rules: &Rules<'_>) -> Result<AttributeType> {
    let mut t = AttributeType::new(oid, names[0]);
    for name in &names[1..] {
        t = t.with_name(*name);
    }
    t = t.with_equality(rule(registry, rules.eq)?);
    if let Some(ord) = rules.ord {
        t = t.with_ordering(rule(registry, ord)?);
    }
    if let Some(sub) = rules.sub {
        t = t.with_substring(rule(registry, sub)?);
    }
    if let Some(approx) = rules.approx {
        t = t.with_approximate(rule(registry, approx)?);
    }
    Ok(t)
}

fn rule(registry: &SchemaRegistry, name: &str) -> Result<crate::schema::MatchingRuleRef> {
    registry
        .matching_rule(name)
        .ok_or_else(|| Error::Schema(format!("unknown matching rule {}", name)))
}

fn sub_of(registry: &SchemaRegistry, oid: &str, names: &[&str], superior: &str) -> Result<AttributeType> {
    let sup = attr(registry, superior)?;
    let mut t = AttributeType::new(oid, names[0]).with_superior(sup);
    for name in &names[1..] {
        t = t.with_name(*name);
    }
    Ok(t)
}

fn attr(registry: &SchemaRegistry, name: &str) -> Result<Arc<AttributeType>> {
    registry
        .attribute_type(name)
        .ok_or_else(|| Error::Schema(format!("unknown attribute type {}", name)))
}

fn attrs(registry: &SchemaRegistry, names: &[&str]) -> Result<Vec<Arc<AttributeType>>> {
    names.iter().map(|n| attr(registry, n)).collect()
}

fn load_attribute_types(r: &SchemaRegistry) -> Result<()> {
    use AttributeUsage::DirectoryOperation;

    r.register_attribute_type(typed(r, OBJECT_CLASS_OID, &["objectClass"], &OID)?)?;
    r.register_attribute_type(typed(r, "2.5.4.41", &["name"], &CASE_IGNORE)?)?;
    r.register_attribute_type(typed(r, "2.5.4.49", &["distinguishedName"], &DN)?)?;

    let named: [(&str, &[&str]); 9] = [
        ("2.5.4.3", &["cn", "commonName"]),
        ("2.5.4.4", &["sn", "surname"]),
        ("2.5.4.42", &["givenName", "gn"]),
        ("2.5.4.43", &["initials"]),
        ("2.5.4.10", &["o", "organizationName"]),
        ("2.5.4.11", &["ou", "organizationalUnitName"]),
        ("2.5.4.7", &["l", "localityName"]),
        ("2.5.4.8", &["st", "stateOrProvinceName"]),
        ("2.5.4.12", &["title"]),
    ];
    for (oid, names) in named {
        r.register_attribute_type(sub_of(r, oid, names, "name")?)?;
    }

    for (oid, name) in [("2.5.4.31", "member"), ("2.5.4.32", "owner"), ("2.5.4.34", "seeAlso")] {
        r.register_attribute_type(sub_of(r, oid, &[name], "distinguishedName")?)?;
    }

    r.register_attribute_type(typed(r, "2.5.4.6", &["c", "countryName"], &CASE_IGNORE)?.single_valued())?;
    r.register_attribute_type(
        typed(r, "0.9.2342.19200300.100.1.25", &["dc", "domainComponent"], &CASE_IGNORE)?.single_valued(),
    )?;
    r.register_attribute_type(typed(r, "0.9.2342.19200300.100.1.1", &["uid", "userid"], &CASE_IGNORE)?)?;
    r.register_attribute_type(typed(r, "0.9.2342.19200300.100.1.3", &["mail", "rfc822Mailbox"], &CASE_IGNORE)?)?;
    r.register_attribute_type(typed(r, "2.5.4.13", &["description"], &CASE_IGNORE)?)?;
    r.register_attribute_type(typed(r, "2.5.4.9", &["street", "streetAddress"], &CASE_IGNORE)?)?;
    r.register_attribute_type(typed(r, "2.5.4.17", &["postalCode"], &CASE_IGNORE)?)?;
    r.register_attribute_type(typed(r, "2.5.4.20", &["telephoneNumber"], &PHONE)?)?;
    r.register_attribute_type(typed(r, "2.5.4.35", &["userPassword"], &OCTETS)?)?;
    r.register_attribute_type(
        typed(r, "2.16.840.1.113730.3.1.3", &["employeeNumber"], &CASE_IGNORE)?.single_valued(),
    )?;
    r.register_attribute_type(typed(r, "1.3.6.1.1.1.1.0", &["uidNumber"], &INTEGER)?.single_valued())?;
    r.register_attribute_type(typed(r, "1.3.6.1.1.1.1.1", &["gidNumber"], &INTEGER)?.single_valued())?;
    r.register_attribute_type(typed(r, "1.3.6.1.1.1.1.3", &["homeDirectory"], &CASE_EXACT)?.single_valued())?;
    r.register_attribute_type(typed(r, "1.3.6.1.4.1.60000.1.2.1", &["loginCount"], &INTEGER)?)?;

    // Operational
    for (oid, name) in [("2.5.18.1", "createTimestamp"), ("2.5.18.2", "modifyTimestamp")] {
        r.register_attribute_type(
            typed(r, oid, &[name], &TIME)?
                .single_valued()
                .no_user_modification()
                .with_usage(DirectoryOperation),
        )?;
    }
    for (oid, name) in [("2.5.18.3", "creatorsName"), ("2.5.18.4", "modifiersName")] {
        r.register_attribute_type(
            typed(r, oid, &[name], &DN)?
                .single_valued()
                .no_user_modification()
                .with_usage(DirectoryOperation),
        )?;
    }
    r.register_attribute_type(
        typed(r, "2.5.18.10", &["subschemaSubentry"], &DN)?
            .single_valued()
            .no_user_modification()
            .with_usage(DirectoryOperation),
    )?;
    r.register_attribute_type(
        typed(r, "1.3.6.1.1.20", &[names::ENTRY_DN], &DN)?
            .single_valued()
            .no_user_modification()
            .with_usage(DirectoryOperation),
    )?;
    r.register_attribute_type(
        typed(r, "1.3.6.1.1.16.4", &["entryUUID"], &CASE_IGNORE)?
            .single_valued()
            .no_user_modification()
            .with_usage(DirectoryOperation),
    )?;
    r.register_attribute_type(
        typed(r, "2.5.18.7", &[names::COLLECTIVE_EXCLUSIONS], &OID)?.with_usage(DirectoryOperation),
    )?;
    r.register_attribute_type(
        typed(r, "2.5.18.12", &["collectiveAttributeSubentries"], &DN)?
            .no_user_modification()
            .with_usage(DirectoryOperation),
    )?;
    r.register_attribute_type(typed(r, "2.5.18.6", &[names::SUBTREE_SPECIFICATION], &OCTETS)?.single_valued())?;

    // Collective
    for (oid, name, sup) in [
        ("2.5.4.7.1", "c-l", "l"),
        ("2.5.4.8.1", "c-st", "st"),
        ("2.5.4.10.1", "c-o", "o"),
        ("2.5.4.11.1", "c-ou", "ou"),
        ("2.5.4.20.1", "c-TelephoneNumber", "telephoneNumber"),
    ] {
        r.register_attribute_type(sub_of(r, oid, &[name], sup)?.collective())?;
    }

    // Subentry configuration
    r.register_attribute_type(
        typed(r, "1.3.6.1.4.1.60000.1.2.10", &[names::COLLECTIVE_CONFLICT_BEHAVIOR], &CASE_IGNORE)?
            .single_valued(),
    )?;
    for (oid, name) in [
        ("1.3.6.1.4.1.60000.1.2.11", names::INHERIT_FROM_DN_ATTRIBUTE),
        ("1.3.6.1.4.1.60000.1.2.12", names::INHERIT_FROM_RDN_ATTRIBUTE),
        ("1.3.6.1.4.1.60000.1.2.13", names::INHERIT_FROM_RDN_TYPE),
    ] {
        r.register_attribute_type(typed(r, oid, &[name], &OID)?.single_valued())?;
    }
    r.register_attribute_type(
        typed(r, "1.3.6.1.4.1.60000.1.2.14", &[names::INHERIT_FROM_BASE_RDN], &DN)?.single_valued(),
    )?;
    r.register_attribute_type(typed(r, "1.3.6.1.4.1.60000.1.2.15", &[names::INHERIT_ATTRIBUTE], &OID)?)?;

    Ok(())
}

fn load_object_classes(r: &SchemaRegistry) -> Result<()> {
    use ObjectClassKind::{Abstract, Auxiliary, Structural};

    let top = r.register_object_class(
        ObjectClass::new("2.5.6.0", "top", Abstract).with_required(attrs(r, &["objectClass"])?),
    )?;

    let person = r.register_object_class(
        ObjectClass::new("2.5.6.6", "person", Structural)
            .with_superior(top.clone())
            .with_required(attrs(r, &["sn", "cn"])?)
            .with_optional(attrs(r, &["userPassword", "telephoneNumber", "seeAlso", "description"])?),
    )?;
    let org_person = r.register_object_class(
        ObjectClass::new("2.5.6.7", "organizationalPerson", Structural)
            .with_superior(person)
            .with_optional(attrs(r, &["title", "ou", "l", "st", "postalCode", "street"])?),
    )?;
    r.register_object_class(
        ObjectClass::new("2.16.840.1.113730.3.2.2", "inetOrgPerson", Structural)
            .with_superior(org_person)
            .with_optional(attrs(r, &["uid", "mail", "givenName", "initials", "employeeNumber", "o"])?),
    )?;

    let place = ["description", "l", "st", "telephoneNumber", "seeAlso", "userPassword", "postalCode", "street"];
    r.register_object_class(
        ObjectClass::new("2.5.6.4", "organization", Structural)
            .with_superior(top.clone())
            .with_required(attrs(r, &["o"])?)
            .with_optional(attrs(r, &place)?),
    )?;
    r.register_object_class(
        ObjectClass::new("2.5.6.5", "organizationalUnit", Structural)
            .with_superior(top.clone())
            .with_required(attrs(r, &["ou"])?)
            .with_optional(attrs(r, &place)?),
    )?;
    r.register_object_class(
        ObjectClass::new("0.9.2342.19200300.100.4.13", "domain", Structural)
            .with_superior(top.clone())
            .with_required(attrs(r, &["dc"])?)
            .with_optional(attrs(r, &["description", "o", "l", "st", "telephoneNumber", "seeAlso"])?),
    )?;
    r.register_object_class(
        ObjectClass::new("2.5.6.2", "country", Structural)
            .with_superior(top.clone())
            .with_required(attrs(r, &["c"])?)
            .with_optional(attrs(r, &["description"])?),
    )?;
    r.register_object_class(
        ObjectClass::new("2.5.6.9", "groupOfNames", Structural)
            .with_superior(top.clone())
            .with_required(attrs(r, &["member", "cn"])?)
            .with_optional(attrs(r, &["description", "o", "ou", "owner", "seeAlso"])?),
    )?;
    r.register_object_class(
        ObjectClass::new("1.3.6.1.4.1.1466.101.120.111", "extensibleObject", Auxiliary)
            .with_superior(top.clone())
            .extensible(),
    )?;
    r.register_object_class(
        ObjectClass::new("1.3.6.1.1.1.2.0", "posixAccount", Auxiliary)
            .with_superior(top.clone())
            .with_required(attrs(r, &["cn", "uid", "uidNumber", "gidNumber", "homeDirectory"])?)
            .with_optional(attrs(r, &["userPassword", "description", "loginCount"])?),
    )?;

    // Subentries
    r.register_object_class(
        ObjectClass::new("2.5.17.0", "subentry", Structural)
            .with_superior(top.clone())
            .with_required(attrs(r, &["cn", "subtreeSpecification"])?),
    )?;
    r.register_object_class(
        ObjectClass::new("2.16.840.1.113719.2.142.6.1.1", "ldapSubentry", Structural)
            .with_superior(top.clone())
            .with_optional(attrs(r, &["cn"])?),
    )?;
    r.register_object_class(
        ObjectClass::new("2.5.17.2", "collectiveAttributeSubentry", Auxiliary)
            .with_superior(top.clone())
            .with_optional(attrs(r, &[names::COLLECTIVE_CONFLICT_BEHAVIOR])?)
            .extensible(),
    )?;
    let inherited = r.register_object_class(
        ObjectClass::new("1.3.6.1.4.1.60000.1.3.1", "inheritedCollectiveAttributeSubentry", Auxiliary)
            .with_superior(top)
            .with_optional(attrs(r, &[names::INHERIT_ATTRIBUTE, names::COLLECTIVE_CONFLICT_BEHAVIOR])?),
    )?;
    r.register_object_class(
        ObjectClass::new("1.3.6.1.4.1.60000.1.3.2", "inheritedFromDNCollectiveAttributeSubentry", Auxiliary)
            .with_superior(inherited.clone())
            .with_required(attrs(r, &[names::INHERIT_FROM_DN_ATTRIBUTE])?),
    )?;
    r.register_object_class(
        ObjectClass::new("1.3.6.1.4.1.60000.1.3.3", "inheritedFromRDNCollectiveAttributeSubentry", Auxiliary)
            .with_superior(inherited)
            .with_required(attrs(
                r,
                &[names::INHERIT_FROM_RDN_ATTRIBUTE, names::INHERIT_FROM_RDN_TYPE, names::INHERIT_FROM_BASE_RDN],
            )?),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_schema_loads() {
        let schema = SchemaRegistry::core().unwrap();
        let cn = schema.attribute_type("commonName").unwrap();
        assert_eq!(cn.oid(), "2.5.4.3");
        assert_eq!(cn.equality_matching_rule().unwrap().name(), "caseIgnoreMatch");

        let name = schema.attribute_type("name").unwrap();
        assert!(schema.subtypes(&name).iter().any(|t| t.has_name_or_oid("sn")));

        let inet = schema.object_class("inetOrgPerson").unwrap();
        let person = schema.object_class("person").unwrap();
        assert!(inet.is_descendant_of(&person));
        assert!(inet.is_required(&schema.attribute_type("sn").unwrap()));

        assert!(schema.attribute_type("createTimestamp").unwrap().is_operational());
        assert!(schema.attribute_type("c-l").unwrap().is_collective());
    }
}
