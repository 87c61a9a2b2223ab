//! Filter string parser
//!
//! Accepts RFC 4515 filter text. The outer parentheses are optional for a
//! single simple filter. Compound filters are split by scanning for
//! balanced parentheses and parsing each top-level span recursively. Every
//! failure reports the byte offset it was detected at.

use quarry_core::limits::{validate_filter_depth, validate_filter_length};
use quarry_core::Schema;
use tracing::trace;

use crate::error::{SearchError, SearchResult};
use crate::filter::{AttributeDescription, Filter};

/// Which simple filter an operator selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equality,
    Approximate,
    GreaterOrEqual,
    LessOrEqual,
    Extensible,
}

/// Parses filter text, resolving attribute types against a schema
pub struct FilterParser<'a> {
    schema: &'a dyn Schema,
}

impl<'a> FilterParser<'a> {
    pub fn new(schema: &'a dyn Schema) -> Self {
        Self { schema }
    }

    pub fn parse(&self, text: &str) -> SearchResult<Filter> {
        validate_filter_length(text.len())?;
        let filter = self.parse_range(text, 0, text.len(), 0)?;
        trace!("Parsed filter {} as {}", text, filter);
        Ok(filter)
    }

    fn parse_range(&self, text: &str, start: usize, end: usize, depth: usize) -> SearchResult<Filter> {
        let bytes = text.as_bytes();
        if start >= end {
            return Err(SearchError::parse(start, "empty filter"));
        }

        let (start, end) = match (bytes[start], bytes[end - 1]) {
            (b'(', b')') => (start + 1, end - 1),
            (b'(', _) => {
                return Err(SearchError::parse(
                    start,
                    "filter starts with '(' but does not end with ')'",
                ))
            }
            _ => (start, end),
        };
        if start >= end {
            return Err(SearchError::parse(start, "empty filter"));
        }

        match bytes[start] {
            b'&' | b'|' | b'!' => self.parse_compound(text, start, end, depth),
            _ => self.parse_simple(text, start, end),
        }
    }

    fn parse_compound(&self, text: &str, start: usize, end: usize, depth: usize) -> SearchResult<Filter> {
        validate_filter_depth(depth).map_err(|e| SearchError::parse(start, e.to_string()))?;

        let bytes = text.as_bytes();
        let op = bytes[start];
        let body = start + 1;

        let mut components = Vec::new();
        if body < end {
            if bytes[body] != b'(' {
                return Err(SearchError::parse(
                    body,
                    "components of a compound filter must be enclosed in parentheses",
                ));
            }

            let mut open = 0usize;
            let mut span_start = body;
            for (i, &b) in bytes.iter().enumerate().take(end).skip(body) {
                match b {
                    b'(' => {
                        if open == 0 {
                            span_start = i;
                        }
                        open += 1;
                    }
                    b')' => {
                        if open == 0 {
                            return Err(SearchError::parse(i, "')' without a matching '('"));
                        }
                        open -= 1;
                        if open == 0 {
                            components.push(self.parse_range(text, span_start, i + 1, depth + 1)?);
                        }
                    }
                    _ if open == 0 => {
                        return Err(SearchError::parse(
                            i,
                            "unexpected character between compound filter components",
                        ));
                    }
                    _ => {}
                }
            }
            if open != 0 {
                return Err(SearchError::parse(span_start, "'(' without a matching ')'"));
            }
        }

        match op {
            b'&' => Ok(Filter::and(components)),
            b'|' => Ok(Filter::or(components)),
            _ => {
                if components.len() != 1 {
                    return Err(SearchError::parse(
                        start,
                        format!("NOT filter must have exactly one component, found {}", components.len()),
                    ));
                }
                let component = components.remove(0);
                Ok(Filter::not(component))
            }
        }
    }

    fn parse_simple(&self, text: &str, start: usize, end: usize) -> SearchResult<Filter> {
        let bytes = text.as_bytes();
        let eq = bytes[start..end]
            .iter()
            .position(|&b| b == b'=')
            .map(|pos| start + pos)
            .ok_or_else(|| SearchError::parse(start, "no '=' in filter component"))?;
        if eq == start {
            return Err(SearchError::parse(start, "filter component has no attribute description"));
        }

        let (attr_end, op) = match bytes[eq - 1] {
            b'~' => (eq - 1, Operator::Approximate),
            b'>' => (eq - 1, Operator::GreaterOrEqual),
            b'<' => (eq - 1, Operator::LessOrEqual),
            b':' => (eq - 1, Operator::Extensible),
            _ => (eq, Operator::Equality),
        };
        let value_start = eq + 1;

        if op == Operator::Extensible {
            return self.parse_extensible(text, start, attr_end, value_start, end);
        }

        let attribute = self.attribute(text, start, attr_end)?;
        let raw = &bytes[value_start..end];

        if raw == b"*" {
            return Ok(Filter::present(attribute));
        }
        if raw.contains(&b'*') {
            return self.parse_substring(attribute, raw, value_start);
        }

        let value = unescape(raw, value_start)?;
        Ok(match op {
            Operator::Approximate => Filter::approximate(attribute, value),
            Operator::GreaterOrEqual => Filter::greater_or_equal(attribute, value),
            Operator::LessOrEqual => Filter::less_or_equal(attribute, value),
            _ => Filter::equality(attribute, value),
        })
    }

    fn parse_substring(&self, attribute: AttributeDescription, raw: &[u8], offset: usize) -> SearchResult<Filter> {
        let mut pieces = Vec::new();
        let mut piece_start = 0;
        for (i, &b) in raw.iter().enumerate() {
            if b == b'*' {
                pieces.push((piece_start, &raw[piece_start..i]));
                piece_start = i + 1;
            }
        }
        pieces.push((piece_start, &raw[piece_start..]));

        let last = pieces.len() - 1;
        let mut initial = None;
        let mut any = Vec::new();
        let mut final_value = None;
        for (index, (at, piece)) in pieces.into_iter().enumerate() {
            if index == 0 {
                if !piece.is_empty() {
                    initial = Some(unescape(piece, offset + at)?);
                }
            } else if index == last {
                if !piece.is_empty() {
                    final_value = Some(unescape(piece, offset + at)?);
                }
            } else {
                any.push(unescape(piece, offset + at)?);
            }
        }

        Filter::substring(attribute, initial, any, final_value)
            .map_err(|e| SearchError::parse(offset, e.to_string()))
    }

    /// `attr[:dn][:rule]` or `[:dn]:rule`, ending just before `:=`
    fn parse_extensible(
        &self,
        text: &str,
        start: usize,
        colon: usize,
        value_start: usize,
        end: usize,
    ) -> SearchResult<Filter> {
        let head = &text[start..colon];
        let mut parts = head.split(':');
        let name = parts.next().unwrap_or_default();
        let attribute = if name.is_empty() {
            None
        } else {
            Some(self.attribute(text, start, start + name.len())?)
        };
        let mut at = start + name.len() + 1;

        let mut dn_attributes = false;
        let mut matching_rule: Option<String> = None;
        for part in parts {
            if part.is_empty() {
                return Err(SearchError::parse(at, "empty element in extensible match"));
            }
            if matching_rule.is_some() {
                return Err(SearchError::parse(at, format!("unexpected '{}' after the matching rule", part)));
            }
            if part.eq_ignore_ascii_case("dn") && !dn_attributes {
                dn_attributes = true;
            } else {
                matching_rule = Some(part.to_string());
            }
            at += part.len() + 1;
        }

        match (&attribute, &matching_rule) {
            (None, None) => {
                return Err(SearchError::parse(
                    start,
                    "extensible match needs a matching rule or an attribute type",
                ))
            }
            (None, Some(rule)) if self.schema.matching_rule(rule).is_none() => {
                return Err(SearchError::parse(start, format!("unknown matching rule '{}'", rule)));
            }
            _ => {}
        }

        let value = unescape(&text.as_bytes()[value_start..end], value_start)?;
        Filter::extensible(attribute, matching_rule, value, dn_attributes)
            .map_err(|e| SearchError::parse(start, e.to_string()))
    }

    fn attribute(&self, text: &str, start: usize, end: usize) -> SearchResult<AttributeDescription> {
        let description = &text[start..end];
        if description.is_empty() || description.starts_with(';') {
            return Err(SearchError::parse(start, "filter component has no attribute description"));
        }
        if let Some(pos) = description.find(|c: char| c.is_whitespace() || c == '(' || c == ')') {
            return Err(SearchError::parse(
                start + pos,
                format!("invalid character in attribute description '{}'", description),
            ));
        }
        Ok(AttributeDescription::parse(self.schema, description))
    }
}

/// Decode `\XX` escapes in an assertion value starting at `offset`
fn unescape(raw: &[u8], offset: usize) -> SearchResult<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'\\' => {
                let hex = raw
                    .get(i + 1..i + 3)
                    .and_then(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
                    .ok_or_else(|| SearchError::parse(offset + i, "invalid escape sequence in filter value"))?;
                out.push(hex);
                i += 3;
            }
            b'(' | b')' => {
                return Err(SearchError::parse(offset + i, "unescaped parenthesis in filter value"));
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    char::from(b).to_digit(16).map(|d| d as u8)
}

impl Filter {
    /// Parse filter text against a schema
    pub fn parse(schema: &dyn Schema, text: &str) -> SearchResult<Filter> {
        FilterParser::new(schema).parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterType;
    use quarry_core::SchemaRegistry;

    fn parse(text: &str) -> SearchResult<Filter> {
        let schema = SchemaRegistry::core().unwrap();
        Filter::parse(&schema, text)
    }

    fn offset(result: SearchResult<Filter>) -> usize {
        match result {
            Err(SearchError::Parse { offset, .. }) => offset,
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_compound() {
        let filter = parse("(&(objectClass=person)(!(sn=Jones)))").unwrap();
        assert_eq!(filter.filter_type(), FilterType::And);
        let components = filter.components();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].filter_type(), FilterType::Equality);
        match &components[1] {
            Filter::Not(inner) => assert_eq!(inner.to_string(), "(sn=Jones)"),
            other => panic!("expected NOT, got {}", other),
        }
        assert_eq!(filter.to_string(), "(&(objectClass=person)(!(sn=Jones)))");
    }

    #[test]
    fn test_parse_simple_operators() {
        assert_eq!(parse("cn=Bob").unwrap().filter_type(), FilterType::Equality);
        assert_eq!(parse("(cn~=Bob)").unwrap().filter_type(), FilterType::ApproximateMatch);
        assert_eq!(parse("(uidNumber>=10)").unwrap().filter_type(), FilterType::GreaterOrEqual);
        assert_eq!(parse("(uidNumber<=10)").unwrap().filter_type(), FilterType::LessOrEqual);
        assert_eq!(parse("(mail=*)").unwrap().filter_type(), FilterType::Present);
        match parse("(cn=)").unwrap() {
            Filter::Equality(a) => assert!(a.value.is_empty()),
            other => panic!("expected equality, got {}", other),
        }
    }

    #[test]
    fn test_parse_substring() {
        match parse("(cn=al*er)").unwrap() {
            Filter::Substring(s) => {
                assert_eq!(s.initial.as_deref(), Some(&b"al"[..]));
                assert!(s.any.is_empty());
                assert_eq!(s.final_value.as_deref(), Some(&b"er"[..]));
            }
            other => panic!("expected substring, got {}", other),
        }

        match parse("(cn=*a**b*)").unwrap() {
            Filter::Substring(s) => {
                assert!(s.initial.is_none());
                assert_eq!(s.any, vec![b"a".to_vec(), Vec::new(), b"b".to_vec()]);
                assert!(s.final_value.is_none());
            }
            other => panic!("expected substring, got {}", other),
        }
    }

    #[test]
    fn test_parse_escapes() {
        let filter = parse("(cn=a\\28b\\29\\2A\\5c)").unwrap();
        match &filter {
            Filter::Equality(a) => assert_eq!(a.value, b"a(b)*\\"),
            other => panic!("expected equality, got {}", other),
        }
        assert_eq!(filter.to_string(), "(cn=a\\28b\\29\\2a\\5c)");

        assert_eq!(offset(parse("(cn=ab\\2)")), 6);
        assert_eq!(offset(parse("(cn=ab\\zz)")), 6);
    }

    #[test]
    fn test_parse_extensible() {
        match parse("(cn:dn:caseExactMatch:=Bob)").unwrap() {
            Filter::Extensible(e) => {
                assert!(e.attribute.is_some());
                assert!(e.dn_attributes);
                assert_eq!(e.matching_rule.as_deref(), Some("caseExactMatch"));
                assert_eq!(e.value, b"Bob");
            }
            other => panic!("expected extensible, got {}", other),
        }

        match parse("(:2.5.13.5:=Bob)").unwrap() {
            Filter::Extensible(e) => {
                assert!(e.attribute.is_none());
                assert!(!e.dn_attributes);
            }
            other => panic!("expected extensible, got {}", other),
        }

        assert!(parse("(cn:=Bob)").is_ok());
        assert!(parse("(:dn:caseIgnoreMatch:=x)").is_ok());
        assert!(parse("(:=x)").is_err());
        assert!(parse("(:dn:=x)").is_err());
        assert!(parse("(:noSuchRule:=x)").is_err());
        assert!(parse("(cn:a:b:=x)").is_err());
    }

    #[test]
    fn test_parse_empty_compounds() {
        assert_eq!(parse("(&)").unwrap(), Filter::and([]));
        assert_eq!(parse("(|)").unwrap(), Filter::or([]));
        assert!(parse("(!)").is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(offset(parse("")), 0);
        assert_eq!(offset(parse("()")), 1);
        assert_eq!(offset(parse("(cn=bob")), 0);
        assert_eq!(offset(parse("(cnbob)")), 1);
        assert_eq!(offset(parse("(=bob)")), 1);
        assert_eq!(offset(parse("(&(cn=a)x(sn=b))")), 8);
        assert_eq!(offset(parse("(&cn=a)")), 2);
        assert_eq!(offset(parse("(&(cn=a)))")), 8);
        assert_eq!(offset(parse("(&(cn=a)(sn=b)")), 8);
        assert!(parse("(!(cn=a)(sn=b))").is_err());
        assert!(parse("(cn=a))").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}(cn=a){}", "(!".repeat(150), ")".repeat(150));
        assert!(matches!(parse(&deep), Err(SearchError::Parse { .. })));

        let shallow = format!("{}(cn=a){}", "(!".repeat(20), ")".repeat(20));
        assert_eq!(parse(&shallow).unwrap().depth(), 20);
    }

    #[test]
    fn test_too_long() {
        let long = format!("(cn={})", "a".repeat(70 * 1024));
        assert!(matches!(parse(&long), Err(SearchError::Limit(_))));
    }
}
