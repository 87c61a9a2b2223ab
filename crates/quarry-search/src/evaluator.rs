//! Filter evaluation against entries
//!
//! Evaluation is three-valued. `Undefined` comes from assertions that
//! cannot be decided (no matching rule, a value that fails to normalize, a
//! matching rule use that excludes the attribute) and is a normal outcome.
//! Errors are reserved for filter trees that cannot be evaluated at all.

use std::borrow::Cow;
use std::cmp::Ordering;

use quarry_core::limits::validate_filter_depth;
use quarry_core::schema::matching::{ordering_match, substring_match, values_match};
use quarry_core::{
    Attribute, ConditionResult, Entry, MatchingRule, MatchingRuleKind, MatchingRuleRef, Result as CoreResult, Schema,
};
use tracing::trace;

use crate::error::{SearchError, SearchResult};
use crate::filter::{AttributeDescription, ExtensibleAssertion, Filter, SubstringAssertion, ValueAssertion};

/// Evaluates filters against entries using a schema's matching rules
pub struct FilterEvaluator<'a> {
    schema: &'a dyn Schema,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(schema: &'a dyn Schema) -> Self {
        Self { schema }
    }

    /// Three-valued outcome of `filter` for `entry`
    pub fn matches(&self, filter: &Filter, entry: &Entry) -> SearchResult<ConditionResult> {
        self.evaluate(filter, filter, entry, 0)
    }

    /// Whether `entry` belongs in search results; `Undefined` does not
    pub fn matches_entry(&self, filter: &Filter, entry: &Entry) -> SearchResult<bool> {
        Ok(self.matches(filter, entry)?.is_true())
    }

    fn evaluate(&self, complete: &Filter, filter: &Filter, entry: &Entry, depth: usize) -> SearchResult<ConditionResult> {
        match filter {
            Filter::And(components) => self.evaluate_and(complete, components, entry, depth),
            Filter::Or(components) => self.evaluate_or(complete, components, entry, depth),
            Filter::Not(component) => {
                self.check_depth(complete, entry, depth)?;
                let result = self.evaluate(complete, component, entry, depth + 1)?.not();
                trace!("Returning {} for NOT component {} for entry {}", result, filter, entry.dn());
                Ok(result)
            }
            Filter::Equality(assertion) => Ok(self.evaluate_equality(assertion, entry)),
            Filter::Substring(assertion) => self.evaluate_substring(complete, assertion, entry),
            Filter::GreaterOrEqual(assertion) => Ok(self.evaluate_ordering(assertion, entry, Ordering::Greater)),
            Filter::LessOrEqual(assertion) => Ok(self.evaluate_ordering(assertion, entry, Ordering::Less)),
            Filter::Present(attribute) => Ok(ConditionResult::from(entry.has_attribute(
                self.schema,
                attribute.attribute_type(),
                attribute.options(),
            ))),
            Filter::Approximate(assertion) => Ok(self.evaluate_approximate(assertion, entry)),
            Filter::Extensible(assertion) => self.evaluate_extensible(complete, assertion, entry),
        }
    }

    fn check_depth(&self, complete: &Filter, entry: &Entry, depth: usize) -> SearchResult<()> {
        validate_filter_depth(depth).map_err(|_| SearchError::NestedTooDeep {
            filter: complete.to_string(),
            dn: entry.dn().to_string(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Compound Filters
    // ─────────────────────────────────────────────────────────────────────────

    fn evaluate_and(
        &self,
        complete: &Filter,
        components: &[Filter],
        entry: &Entry,
        depth: usize,
    ) -> SearchResult<ConditionResult> {
        if components.is_empty() {
            trace!("Returning TRUE for the absolute true filter (&)");
            return Ok(ConditionResult::True);
        }
        self.check_depth(complete, entry, depth)?;

        let mut result = ConditionResult::True;
        for component in components {
            match self.evaluate(complete, component, entry, depth + 1)? {
                ConditionResult::True => {}
                ConditionResult::False => {
                    trace!("Returning FALSE for AND component {} for entry {}", component, entry.dn());
                    return Ok(ConditionResult::False);
                }
                ConditionResult::Undefined => {
                    trace!("Undefined result for AND component {} for entry {}", component, entry.dn());
                    result = ConditionResult::Undefined;
                }
            }
        }
        Ok(result)
    }

    fn evaluate_or(
        &self,
        complete: &Filter,
        components: &[Filter],
        entry: &Entry,
        depth: usize,
    ) -> SearchResult<ConditionResult> {
        if components.is_empty() {
            trace!("Returning FALSE for the absolute false filter (|)");
            return Ok(ConditionResult::False);
        }
        self.check_depth(complete, entry, depth)?;

        let mut result = ConditionResult::False;
        for component in components {
            match self.evaluate(complete, component, entry, depth + 1)? {
                ConditionResult::True => {
                    trace!("Returning TRUE for OR component {} for entry {}", component, entry.dn());
                    return Ok(ConditionResult::True);
                }
                ConditionResult::False => {}
                ConditionResult::Undefined => {
                    trace!("Undefined result for OR component {} for entry {}", component, entry.dn());
                    result = ConditionResult::Undefined;
                }
            }
        }
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Value Assertions
    // ─────────────────────────────────────────────────────────────────────────

    fn evaluate_equality(&self, assertion: &ValueAssertion, entry: &Entry) -> ConditionResult {
        let rule = assertion.attribute.attribute_type().equality_matching_rule();
        self.compare_values(assertion, entry, rule, |rule, value, normalized| {
            values_match(rule, value, normalized)
        })
    }

    fn evaluate_ordering(&self, assertion: &ValueAssertion, entry: &Entry, wanted: Ordering) -> ConditionResult {
        let rule = assertion.attribute.attribute_type().ordering_matching_rule();
        self.compare_values(assertion, entry, rule, |rule, value, normalized| {
            ordering_match(rule, value, normalized, wanted)
        })
    }

    fn evaluate_approximate(&self, assertion: &ValueAssertion, entry: &Entry) -> ConditionResult {
        let rule = assertion.attribute.attribute_type().approximate_matching_rule();
        self.compare_values(assertion, entry, rule, |rule, value, normalized| {
            values_match(rule, value, normalized)
        })
    }

    /// FALSE without the attribute, UNDEFINED without a rule or when the
    /// assertion does not normalize, otherwise folded over every value
    fn compare_values(
        &self,
        assertion: &ValueAssertion,
        entry: &Entry,
        rule: Option<MatchingRuleRef>,
        check: impl Fn(&dyn MatchingRule, &[u8], &[u8]) -> ConditionResult,
    ) -> ConditionResult {
        let attribute = &assertion.attribute;
        let Some(attrs) = self.lookup(attribute, entry) else {
            trace!("Entry {} has no attribute {}", entry.dn(), attribute);
            return ConditionResult::False;
        };
        let Some(rule) = rule else {
            trace!("Attribute type {} has no suitable matching rule", attribute.attribute_type());
            return ConditionResult::Undefined;
        };
        let Ok(normalized) = rule.normalize_assertion(&assertion.value) else {
            trace!("Assertion value for {} does not normalize with {}", attribute, rule.name());
            return ConditionResult::Undefined;
        };

        fold_values(
            attrs.iter().flat_map(|a| a.values().iter().map(Vec::as_slice)),
            |value| check(rule.as_ref(), value, &normalized),
        )
    }

    fn evaluate_substring(
        &self,
        complete: &Filter,
        assertion: &SubstringAssertion,
        entry: &Entry,
    ) -> SearchResult<ConditionResult> {
        if !assertion.has_components() {
            return Err(SearchError::malformed(complete, "substring filter has no components"));
        }
        let attribute = &assertion.attribute;
        let Some(attrs) = self.lookup(attribute, entry) else {
            return Ok(ConditionResult::False);
        };
        let Some(rule) = attribute.attribute_type().substring_matching_rule() else {
            trace!("Attribute type {} has no substring matching rule", attribute.attribute_type());
            return Ok(ConditionResult::Undefined);
        };

        let Ok((initial, any, final_value)) = normalize_components(rule.as_ref(), assertion) else {
            trace!("Substring components for {} do not normalize with {}", attribute, rule.name());
            return Ok(ConditionResult::Undefined);
        };

        Ok(fold_values(
            attrs.iter().flat_map(|a| a.values().iter().map(Vec::as_slice)),
            |value| match rule.normalize_value(value) {
                Ok(normalized) => ConditionResult::from(substring_match(
                    &normalized,
                    initial.as_deref(),
                    &any,
                    final_value.as_deref(),
                )),
                Err(_) => ConditionResult::Undefined,
            },
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Extensible Match
    // ─────────────────────────────────────────────────────────────────────────

    fn evaluate_extensible(
        &self,
        complete: &Filter,
        assertion: &ExtensibleAssertion,
        entry: &Entry,
    ) -> SearchResult<ConditionResult> {
        let rule = match (&assertion.matching_rule, &assertion.attribute) {
            (Some(id), _) => match self.schema.matching_rule(id) {
                Some(rule) => rule,
                None => {
                    trace!("Unknown matching rule {} in filter {}", id, complete);
                    return Ok(ConditionResult::Undefined);
                }
            },
            (None, Some(attribute)) => match attribute.attribute_type().equality_matching_rule() {
                Some(rule) => rule,
                None => {
                    trace!("Attribute type {} has no equality matching rule", attribute.attribute_type());
                    return Ok(ConditionResult::Undefined);
                }
            },
            (None, None) => {
                return Err(SearchError::malformed(
                    complete,
                    "extensible match needs a matching rule or an attribute type",
                ))
            }
        };

        if let Some(attribute) = &assertion.attribute {
            if let Some(rule_use) = self.schema.matching_rule_use(rule.as_ref()) {
                if !rule_use.applies_to(attribute.attribute_type()) {
                    trace!(
                        "Matching rule {} may not be used with attribute type {}",
                        rule.name(),
                        attribute.attribute_type()
                    );
                    return Ok(ConditionResult::Undefined);
                }
            }
        }

        let Ok(normalized) = rule.normalize_assertion(&assertion.value) else {
            return Ok(ConditionResult::Undefined);
        };
        let check = |value: &[u8]| extensible_check(rule.as_ref(), value, &normalized);

        let mut result = match &assertion.attribute {
            Some(attribute) => match self.lookup(attribute, entry) {
                Some(attrs) => fold_values(attrs.iter().flat_map(|a| a.values().iter().map(Vec::as_slice)), check),
                None => ConditionResult::False,
            },
            None => {
                let object_classes = entry.object_class_attribute(self.schema);
                let values = entry
                    .user_attributes()
                    .values()
                    .chain(entry.operational_attributes().values())
                    .flatten()
                    .chain(object_classes.iter())
                    .flat_map(|a| a.values().iter().map(Vec::as_slice));
                fold_values(values, check)
            }
        };
        if result.is_true() || !assertion.dn_attributes {
            return Ok(result);
        }

        let wanted = assertion.attribute.as_ref().map(AttributeDescription::attribute_type);
        let dn_values = entry
            .dn()
            .rdns()
            .iter()
            .flat_map(|rdn| rdn.avas().iter())
            .filter(|ava| wanted.map_or(true, |t| **t == *self.schema.attribute_type_or_default(ava.attribute_type())))
            .map(|ava| ava.value().as_bytes());
        match fold_values(dn_values, check) {
            ConditionResult::True => result = ConditionResult::True,
            ConditionResult::Undefined => result = ConditionResult::Undefined,
            ConditionResult::False => {}
        }
        Ok(result)
    }

    fn lookup<'e>(&self, attribute: &AttributeDescription, entry: &'e Entry) -> Option<Vec<Cow<'e, Attribute>>> {
        entry.get_attribute(self.schema, attribute.attribute_type(), true, attribute.options())
    }
}

type SubstringComponents = (Option<Vec<u8>>, Vec<Vec<u8>>, Option<Vec<u8>>);

fn normalize_components(rule: &dyn MatchingRule, assertion: &SubstringAssertion) -> CoreResult<SubstringComponents> {
    let initial = assertion
        .initial
        .as_deref()
        .map(|c| rule.normalize_substring(c))
        .transpose()?;
    let any = assertion
        .any
        .iter()
        .map(|c| rule.normalize_substring(c))
        .collect::<CoreResult<Vec<_>>>()?;
    let final_value = assertion
        .final_value
        .as_deref()
        .map(|c| rule.normalize_substring(c))
        .transpose()?;
    Ok((initial, any, final_value))
}

/// Extensible assertions with an ordering rule mean "less than"; every
/// other rule kind compares for equality
fn extensible_check(rule: &dyn MatchingRule, value: &[u8], normalized: &[u8]) -> ConditionResult {
    match rule.kind() {
        MatchingRuleKind::Ordering => match rule.normalize_value(value) {
            Ok(v) => ConditionResult::from(rule.compare_normalized(&v, normalized) == Ordering::Less),
            Err(_) => ConditionResult::Undefined,
        },
        _ => values_match(rule, value, normalized),
    }
}

/// TRUE on the first matching value; otherwise UNDEFINED if any value was
/// indeterminate, else FALSE
fn fold_values<'v>(
    values: impl IntoIterator<Item = &'v [u8]>,
    check: impl Fn(&[u8]) -> ConditionResult,
) -> ConditionResult {
    let mut result = ConditionResult::False;
    for value in values {
        match check(value) {
            ConditionResult::True => return ConditionResult::True,
            ConditionResult::Undefined => result = ConditionResult::Undefined,
            ConditionResult::False => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterType;
    use quarry_core::{EntryRecord, MatchingRuleUse, SchemaRegistry};

    fn bob(schema: &SchemaRegistry, sn: &str) -> Entry {
        EntryRecord::new("uid=bob,ou=people,dc=example,dc=com")
            .with_attribute("objectClass", ["top", "person", "organizationalPerson", "inetOrgPerson"])
            .with_attribute("uid", ["bob"])
            .with_attribute("cn", ["bob", "Bob Smith"])
            .with_attribute("sn", [sn])
            .with_attribute("uidNumber", ["1000"])
            .into_entry(schema)
            .unwrap()
    }

    fn eval(schema: &SchemaRegistry, filter: &str, entry: &Entry) -> ConditionResult {
        let filter = Filter::parse(schema, filter).unwrap();
        FilterEvaluator::new(schema).matches(&filter, entry).unwrap()
    }

    #[test]
    fn test_compound_scenario() {
        let schema = SchemaRegistry::core().unwrap();
        let filter = "(&(objectClass=person)(!(sn=Jones)))";
        assert_eq!(eval(&schema, filter, &bob(&schema, "Smith")), ConditionResult::True);
        assert_eq!(eval(&schema, filter, &bob(&schema, "Jones")), ConditionResult::False);
    }

    #[test]
    fn test_substring() {
        let schema = SchemaRegistry::core().unwrap();
        let entry = EntryRecord::new("cn=Alexander,dc=example,dc=com")
            .with_attribute("objectClass", ["top", "person"])
            .with_attribute("cn", ["Alexander"])
            .with_attribute("sn", ["Great"])
            .into_entry(&schema)
            .unwrap();

        assert_eq!(eval(&schema, "(cn=al*er)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn=al*z)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(cn=*XAN*)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn=*x*a*)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(description=al*)", &entry), ConditionResult::False);
    }

    #[test]
    fn test_presence_ignores_empty_attribute() {
        let schema = SchemaRegistry::core().unwrap();
        let mut entry = bob(&schema, "Smith");
        let description = schema.attribute_type("description").unwrap();
        entry.put_attribute(description.clone(), vec![Attribute::new(description)]);

        assert_eq!(eval(&schema, "(description=*)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(sn=*)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(objectClass=*)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn;lang-fr=*)", &entry), ConditionResult::False);
    }

    #[test]
    fn test_equality_includes_subtypes() {
        let schema = SchemaRegistry::core().unwrap();
        let entry = bob(&schema, "Smith");
        assert_eq!(eval(&schema, "(name=smith)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(CN=BOB SMITH)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn=alice)", &entry), ConditionResult::False);
    }

    #[test]
    fn test_ordering_and_approximate() {
        let schema = SchemaRegistry::core().unwrap();
        let entry = bob(&schema, "Smith");
        assert_eq!(eval(&schema, "(uidNumber>=999)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(uidNumber>=1000)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(uidNumber<=999)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(sn~=Smyth)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(sn~=Jones)", &entry), ConditionResult::False);
    }

    #[test]
    fn test_undefined_when_assertion_does_not_normalize() {
        let schema = SchemaRegistry::core().unwrap();
        let entry = bob(&schema, "Smith");
        assert_eq!(eval(&schema, "(uidNumber=abc)", &entry), ConditionResult::Undefined);
        assert_eq!(eval(&schema, "(!(uidNumber=abc))", &entry), ConditionResult::Undefined);
        assert!(!FilterEvaluator::new(&schema)
            .matches_entry(&Filter::parse(&schema, "(uidNumber=abc)").unwrap(), &entry)
            .unwrap());
    }

    #[test]
    fn test_three_valued_laws() {
        let schema = SchemaRegistry::core().unwrap();
        let entry = bob(&schema, "Smith");
        let undefined = "(uidNumber=abc)";
        let t = "(sn=Smith)";
        let f = "(sn=Jones)";

        assert_eq!(eval(&schema, "(&)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(|)", &entry), ConditionResult::False);

        let and = |a: &str, b: &str| format!("(&{}{})", a, b);
        let or = |a: &str, b: &str| format!("(|{}{})", a, b);
        assert_eq!(eval(&schema, &and(undefined, f), &entry), ConditionResult::False);
        assert_eq!(eval(&schema, &and(f, undefined), &entry), ConditionResult::False);
        assert_eq!(eval(&schema, &and(t, undefined), &entry), ConditionResult::Undefined);
        assert_eq!(eval(&schema, &or(undefined, t), &entry), ConditionResult::True);
        assert_eq!(eval(&schema, &or(undefined, f), &entry), ConditionResult::Undefined);
        assert_eq!(eval(&schema, &or(f, f), &entry), ConditionResult::False);

        assert_eq!(eval(&schema, &format!("(!(!{}))", t), &entry), ConditionResult::True);
        assert_eq!(eval(&schema, &format!("(!(!{}))", f), &entry), ConditionResult::False);
    }

    #[test]
    fn test_extensible_match() {
        let schema = SchemaRegistry::core().unwrap();
        let entry = EntryRecord::new("uid=bob,ou=people,dc=example,dc=com")
            .with_attribute("objectClass", ["top", "person"])
            .with_attribute("cn", ["bob"])
            .with_attribute("sn", ["Smith"])
            .into_entry(&schema)
            .unwrap();

        assert_eq!(eval(&schema, "(cn:caseExactMatch:=Bob)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(cn:caseExactMatch:=bob)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn:=Bob)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(:caseIgnoreMatch:=SMITH)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(:caseIgnoreMatch:=person)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn:noSuchRule:=bob)", &entry), ConditionResult::Undefined);
    }

    #[test]
    fn test_extensible_dn_attributes() {
        let schema = SchemaRegistry::core().unwrap();
        let entry = bob(&schema, "Smith");

        assert_eq!(eval(&schema, "(ou:=people)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(ou:dn:=People)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(:dn:caseIgnoreMatch:=example)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn:dn:=people)", &entry), ConditionResult::False);
    }

    #[test]
    fn test_matching_rule_use_restricts_extensible_match() {
        let schema = SchemaRegistry::core().unwrap();
        let sn = schema.attribute_type("sn").unwrap();
        schema
            .register_matching_rule_use(MatchingRuleUse::new("2.5.13.5", vec![sn]))
            .unwrap();
        let entry = bob(&schema, "Smith");

        assert_eq!(eval(&schema, "(cn:2.5.13.5:=bob)", &entry), ConditionResult::Undefined);
        assert_eq!(eval(&schema, "(sn:2.5.13.5:=Smith)", &entry), ConditionResult::True);
    }

    #[test]
    fn test_malformed_trees_are_errors() {
        let schema = SchemaRegistry::core().unwrap();
        let entry = bob(&schema, "Smith");
        let evaluator = FilterEvaluator::new(&schema);

        let empty_substring = Filter::Substring(SubstringAssertion {
            attribute: AttributeDescription::parse(&schema, "cn"),
            initial: None,
            any: Vec::new(),
            final_value: None,
        });
        assert!(matches!(
            evaluator.matches(&empty_substring, &entry),
            Err(SearchError::Malformed { .. })
        ));

        let no_rule = Filter::Extensible(ExtensibleAssertion {
            attribute: None,
            matching_rule: None,
            value: b"x".to_vec(),
            dn_attributes: false,
        });
        assert!(evaluator.matches(&no_rule, &entry).is_err());
    }

    #[test]
    fn test_nesting_limit_is_fatal() {
        let schema = SchemaRegistry::core().unwrap();
        let entry = bob(&schema, "Smith");
        let evaluator = FilterEvaluator::new(&schema);

        let mut filter = Filter::equality(AttributeDescription::parse(&schema, "sn"), "Smith");
        for _ in 0..150 {
            filter = Filter::not(filter);
        }
        assert_eq!(filter.filter_type(), FilterType::Not);
        assert!(matches!(
            evaluator.matches(&filter, &entry),
            Err(SearchError::NestedTooDeep { .. })
        ));

        let mut filter = Filter::equality(AttributeDescription::parse(&schema, "sn"), "Smith");
        for _ in 0..50 {
            filter = Filter::not(Filter::not(filter));
        }
        assert_eq!(evaluator.matches(&filter, &entry).unwrap(), ConditionResult::True);
    }
}
