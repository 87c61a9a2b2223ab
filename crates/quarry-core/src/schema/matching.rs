//! Matching rules
//!
//! A matching rule normalizes attribute and assertion values and decides how
//! two normalized values relate. Equality and approximate rules compare
//! normalized bytes for equality, ordering rules order them, and substring
//! rules match components against a normalized value. A normalization
//! failure is reported as an error so callers can turn it into an
//! `Undefined` filter outcome.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use crate::condition::ConditionResult;
use crate::dn::Dn;
use crate::error::{Error, Result};

/// Which kind of assertion a matching rule supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchingRuleKind {
    Equality,
    Ordering,
    Substring,
    Approximate,
}

/// A pluggable comparison function
pub trait MatchingRule: Send + Sync + fmt::Debug {
    fn oid(&self) -> &str;

    fn name(&self) -> &str;

    fn kind(&self) -> MatchingRuleKind;

    fn has_name_or_oid(&self, name_or_oid: &str) -> bool {
        self.name().eq_ignore_ascii_case(name_or_oid) || self.oid().eq_ignore_ascii_case(name_or_oid)
    }

    /// Normalize a stored attribute value
    fn normalize_value(&self, value: &[u8]) -> Result<Vec<u8>>;

    /// Normalize an assertion value supplied in a filter
    fn normalize_assertion(&self, value: &[u8]) -> Result<Vec<u8>> {
        self.normalize_value(value)
    }

    /// Normalize one substring component; leading and trailing spaces are kept
    fn normalize_substring(&self, value: &[u8]) -> Result<Vec<u8>> {
        self.normalize_value(value)
    }

    /// Order two normalized values
    fn compare_normalized(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Shared handle to a matching rule
pub type MatchingRuleRef = Arc<dyn MatchingRule>;

/// Value preparation used by the built-in rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Normalizer {
    CaseIgnore,
    CaseExact,
    Integer,
    OctetString,
    DistinguishedName,
    GeneralizedTime,
    ObjectIdentifier,
    TelephoneNumber,
    Soundex,
}

/// Built-in matching rule
#[derive(Debug)]
pub struct StandardMatchingRule {
    oid: &'static str,
    name: &'static str,
    kind: MatchingRuleKind,
    normalizer: Normalizer,
}

impl MatchingRule for StandardMatchingRule {
    fn oid(&self) -> &str {
        self.oid
    }

    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> MatchingRuleKind {
        self.kind
    }

    fn normalize_value(&self, value: &[u8]) -> Result<Vec<u8>> {
        match self.normalizer {
            Normalizer::CaseIgnore => Ok(fold_whitespace(utf8(self.name, value)?, true).into_bytes()),
            Normalizer::CaseExact => Ok(fold_whitespace(utf8(self.name, value)?, false).into_bytes()),
            Normalizer::Integer => normalize_integer(utf8(self.name, value)?).map(String::into_bytes),
            Normalizer::OctetString => Ok(value.to_vec()),
            Normalizer::DistinguishedName => Dn::parse(utf8(self.name, value)?)
                .map(|dn| dn.normalized().into_bytes())
                .map_err(|e| Error::InvalidAttributeSyntax(e.to_string())),
            Normalizer::GeneralizedTime => {
                let text = utf8(self.name, value)?;
                parse_generalized_time(text)
                    .map(|dt| dt.format("%Y%m%d%H%M%S%.3fZ").to_string().into_bytes())
                    .ok_or_else(|| {
                        Error::InvalidAttributeSyntax(format!("'{}' is not a valid generalized time", text))
                    })
            }
            Normalizer::ObjectIdentifier => Ok(utf8(self.name, value)?.trim().to_ascii_lowercase().into_bytes()),
            Normalizer::TelephoneNumber => Ok(utf8(self.name, value)?
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect::<String>()
                .into_bytes()),
            Normalizer::Soundex => Ok(soundex_key(utf8(self.name, value)?).into_bytes()),
        }
    }

    fn normalize_substring(&self, value: &[u8]) -> Result<Vec<u8>> {
        match self.normalizer {
            Normalizer::CaseIgnore => Ok(collapse_runs(utf8(self.name, value)?).to_lowercase().into_bytes()),
            Normalizer::CaseExact => Ok(collapse_runs(utf8(self.name, value)?).into_bytes()),
            _ => self.normalize_value(value),
        }
    }

    fn compare_normalized(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.normalizer {
            Normalizer::Integer => compare_integers(a, b),
            _ => a.cmp(b),
        }
    }
}

const STANDARD_RULES: &[(&str, &str, MatchingRuleKind, Normalizer)] = &[
    ("2.5.13.0", "objectIdentifierMatch", MatchingRuleKind::Equality, Normalizer::ObjectIdentifier),
    ("2.5.13.1", "distinguishedNameMatch", MatchingRuleKind::Equality, Normalizer::DistinguishedName),
    ("2.5.13.2", "caseIgnoreMatch", MatchingRuleKind::Equality, Normalizer::CaseIgnore),
    ("2.5.13.3", "caseIgnoreOrderingMatch", MatchingRuleKind::Ordering, Normalizer::CaseIgnore),
    ("2.5.13.4", "caseIgnoreSubstringsMatch", MatchingRuleKind::Substring, Normalizer::CaseIgnore),
    ("2.5.13.5", "caseExactMatch", MatchingRuleKind::Equality, Normalizer::CaseExact),
    ("2.5.13.6", "caseExactOrderingMatch", MatchingRuleKind::Ordering, Normalizer::CaseExact),
    ("2.5.13.7", "caseExactSubstringsMatch", MatchingRuleKind::Substring, Normalizer::CaseExact),
    ("2.5.13.14", "integerMatch", MatchingRuleKind::Equality, Normalizer::Integer),
    ("2.5.13.15", "integerOrderingMatch", MatchingRuleKind::Ordering, Normalizer::Integer),
    ("2.5.13.17", "octetStringMatch", MatchingRuleKind::Equality, Normalizer::OctetString),
    ("2.5.13.18", "octetStringOrderingMatch", MatchingRuleKind::Ordering, Normalizer::OctetString),
    ("2.5.13.20", "telephoneNumberMatch", MatchingRuleKind::Equality, Normalizer::TelephoneNumber),
    ("2.5.13.21", "telephoneNumberSubstringsMatch", MatchingRuleKind::Substring, Normalizer::TelephoneNumber),
    ("2.5.13.27", "generalizedTimeMatch", MatchingRuleKind::Equality, Normalizer::GeneralizedTime),
    ("2.5.13.28", "generalizedTimeOrderingMatch", MatchingRuleKind::Ordering, Normalizer::GeneralizedTime),
    ("1.3.6.1.4.1.60000.1.1.1", "soundexApproximateMatch", MatchingRuleKind::Approximate, Normalizer::Soundex),
];

/// All built-in matching rules
pub fn standard_rules() -> Vec<MatchingRuleRef> {
    STANDARD_RULES
        .iter()
        .map(|&(oid, name, kind, normalizer)| {
            Arc::new(StandardMatchingRule {
                oid,
                name,
                kind,
                normalizer,
            }) as MatchingRuleRef
        })
        .collect()
}

/// Look up a built-in rule by name or OID
pub fn standard_rule(name_or_oid: &str) -> Option<MatchingRuleRef> {
    standard_rules()
        .into_iter()
        .find(|rule| rule.has_name_or_oid(name_or_oid))
}

/// Compare one stored value against an already-normalized assertion
pub fn values_match(rule: &dyn MatchingRule, value: &[u8], normalized_assertion: &[u8]) -> ConditionResult {
    match rule.normalize_value(value) {
        Ok(normalized) => ConditionResult::from(normalized == normalized_assertion),
        Err(_) => ConditionResult::Undefined,
    }
}

/// Ordering assertion: TRUE when `value` is on the `wanted` side of the
/// assertion or equal to it
pub fn ordering_match(
    rule: &dyn MatchingRule,
    value: &[u8],
    normalized_assertion: &[u8],
    wanted: Ordering,
) -> ConditionResult {
    match rule.normalize_value(value) {
        Ok(normalized) => {
            let ord = rule.compare_normalized(&normalized, normalized_assertion);
            ConditionResult::from(ord == wanted || ord == Ordering::Equal)
        }
        Err(_) => ConditionResult::Undefined,
    }
}

/// Match normalized substring components against a normalized value
pub fn substring_match(value: &[u8], initial: Option<&[u8]>, any: &[Vec<u8>], final_: Option<&[u8]>) -> bool {
    let mut pos = 0;

    if let Some(initial) = initial {
        if !value.starts_with(initial) {
            return false;
        }
        pos = initial.len();
    }

    for component in any {
        if component.is_empty() {
            continue;
        }
        match find(&value[pos..], component) {
            Some(idx) => pos += idx + component.len(),
            None => return false,
        }
    }

    if let Some(final_) = final_ {
        if value.len() < pos + final_.len() || !value.ends_with(final_) {
            return false;
        }
    }

    true
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn utf8<'a>(rule: &str, value: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(value)
        .map_err(|_| Error::InvalidAttributeSyntax(format!("value is not valid UTF-8 for {}", rule)))
}

fn fold_whitespace(value: &str, lower: bool) -> String {
    let folded = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if lower {
        folded.to_lowercase()
    } else {
        folded
    }
}

fn collapse_runs(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_space = false;
    for c in value.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn normalize_integer(value: &str) -> Result<String> {
    let text = value.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidAttributeSyntax(format!("'{}' is not a valid integer", value)));
    }
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok("0".to_string());
    }
    Ok(if negative {
        format!("-{}", trimmed)
    } else {
        trimmed.to_string()
    })
}

/// Numeric order of two canonical integer strings of any length
fn compare_integers(a: &[u8], b: &[u8]) -> Ordering {
    let a_neg = a.first() == Some(&b'-');
    let b_neg = b.first() == Some(&b'-');
    match (a_neg, b_neg) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        (true, true) => {
            let (a, b) = (&a[1..], &b[1..]);
            b.len().cmp(&a.len()).then_with(|| b.cmp(a))
        }
    }
}

/// Parse `YYYYMMDDHH[MM[SS]][(.|,)fraction](Z|(+|-)HH[MM])`
pub fn parse_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let text = value.trim();
    let (body, offset_secs) = if let Some(body) = text.strip_suffix(['Z', 'z']) {
        (body, 0i64)
    } else {
        let idx = text.rfind(['+', '-'])?;
        let (body, offset) = text.split_at(idx);
        let sign = if offset.starts_with('-') { -1 } else { 1 };
        let digits = &offset[1..];
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let (hours, minutes) = match digits.len() {
            2 => (digits.parse::<i64>().ok()?, 0),
            4 => (digits[..2].parse::<i64>().ok()?, digits[2..].parse::<i64>().ok()?),
            _ => return None,
        };
        if hours > 23 || minutes > 59 {
            return None;
        }
        (body, sign * (hours * 3600 + minutes * 60))
    };

    let (main, fraction) = match body.find(['.', ',']) {
        Some(i) => (&body[..i], Some(&body[i + 1..])),
        None => (body, None),
    };
    if !main.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (padded, unit_ms) = match main.len() {
        10 => (format!("{}0000", main), 3_600_000.0),
        12 => (format!("{}00", main), 60_000.0),
        14 => (main.to_string(), 1_000.0),
        _ => return None,
    };
    let naive = NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S").ok()?;

    let mut millis = 0i64;
    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let frac: f64 = format!("0.{}", fraction).parse().ok()?;
        millis = (frac * unit_ms).round() as i64;
    }

    let adjusted = naive + Duration::milliseconds(millis) - Duration::seconds(offset_secs);
    Some(Utc.from_utc_datetime(&adjusted))
}

/// Space-separated Soundex codes, one per word; values without letters
/// fall back to their case-ignore form
fn soundex_key(value: &str) -> String {
    let key = value
        .split_whitespace()
        .filter_map(soundex_word)
        .collect::<Vec<_>>()
        .join(" ");
    if key.is_empty() {
        fold_whitespace(value, true)
    } else {
        key
    }
}

fn soundex_word(word: &str) -> Option<String> {
    fn code(c: char) -> Option<char> {
        match c {
            'B' | 'F' | 'P' | 'V' => Some('1'),
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
            'D' | 'T' => Some('3'),
            'L' => Some('4'),
            'M' | 'N' => Some('5'),
            'R' => Some('6'),
            _ => None,
        }
    }

    let mut letters = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase());
    let first = letters.next()?;
    let mut out = String::with_capacity(4);
    out.push(first);
    let mut last = code(first);
    for c in letters {
        let current = code(c);
        if current.is_some() && current != last {
            if let Some(digit) = current {
                out.push(digit);
            }
            if out.len() == 4 {
                break;
            }
        }
        // H and W do not separate equal codes
        if c != 'H' && c != 'W' {
            last = current;
        }
    }
    while out.len() < 4 {
        out.push('0');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> MatchingRuleRef {
        standard_rule(name).unwrap()
    }

    #[test]
    fn test_case_ignore_normalization() {
        let r = rule("caseIgnoreMatch");
        assert_eq!(r.normalize_value(b"  Bob   SMITH ").unwrap(), b"bob smith");
        assert!(values_match(r.as_ref(), b"BOB smith", b"bob smith").is_true());
    }

    #[test]
    fn test_case_exact() {
        let r = rule("2.5.13.5");
        assert_eq!(r.name(), "caseExactMatch");
        assert!(values_match(r.as_ref(), b"bob", b"Bob").is_false());
    }

    #[test]
    fn test_integer_rules() {
        let eq = rule("integerMatch");
        assert_eq!(eq.normalize_value(b"007").unwrap(), b"7");
        assert!(eq.normalize_value(b"12a").is_err());
        assert!(values_match(eq.as_ref(), b"abc", b"7").is_undefined());

        let ord = rule("integerOrderingMatch");
        assert_eq!(ord.compare_normalized(b"9", b"10"), Ordering::Less);
        assert_eq!(ord.compare_normalized(b"-9", b"-10"), Ordering::Greater);
        assert_eq!(ord.compare_normalized(b"-1", b"0"), Ordering::Less);
        assert!(ordering_match(ord.as_ref(), b"100", b"20", Ordering::Greater).is_true());
        assert!(ordering_match(ord.as_ref(), b"20", b"20", Ordering::Less).is_true());
    }

    #[test]
    fn test_generalized_time() {
        let r = rule("generalizedTimeMatch");
        let utc = r.normalize_value(b"20240102030405Z").unwrap();
        let offset = r.normalize_value(b"20240102050405+0200").unwrap();
        assert_eq!(utc, offset);
        assert_eq!(utc, b"20240102030405.000Z");
        assert!(r.normalize_value(b"2024-01-02").is_err());
        assert!(parse_generalized_time("2024010203Z").is_some());
        assert!(parse_generalized_time("20240102030405.5Z").is_some());
    }

    #[test]
    fn test_substring_match() {
        assert!(substring_match(b"alexander", Some(b"al"), &[], Some(b"er")));
        assert!(!substring_match(b"alexander", Some(b"al"), &[], Some(b"z")));
        assert!(substring_match(b"alexander", None, &[b"xan".to_vec()], None));
        assert!(!substring_match(b"abc", Some(b"ab"), &[], Some(b"bc")));
        assert!(substring_match(b"abcabc", Some(b"ab"), &[b"ca".to_vec()], Some(b"bc")));
    }

    #[test]
    fn test_soundex() {
        assert_eq!(soundex_word("Robert").as_deref(), Some("R163"));
        assert_eq!(soundex_word("Rupert").as_deref(), Some("R163"));
        assert_eq!(soundex_word("Tymczak").as_deref(), Some("T522"));
        let r = rule("soundexApproximateMatch");
        assert_eq!(r.kind(), MatchingRuleKind::Approximate);
        assert_eq!(r.normalize_value(b"Robert Smith").unwrap(), r.normalize_value(b"rupert smyth").unwrap());

        assert_ne!(r.normalize_value(b"1234").unwrap(), r.normalize_value(b"5678").unwrap());
        assert_eq!(r.normalize_value(b" 1234 ").unwrap(), r.normalize_value(b"1234").unwrap());
        assert_eq!(values_match(r.as_ref(), b"1234", &r.normalize_value(b"5678").unwrap()), ConditionResult::False);
    }

    #[test]
    fn test_dn_match() {
        let r = rule("distinguishedNameMatch");
        assert_eq!(
            r.normalize_value(b"UID=Bob, OU=People").unwrap(),
            r.normalize_value(b"uid=bob,ou=people").unwrap()
        );
    }
}
