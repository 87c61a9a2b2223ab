//! RFC 3672 subtree specifications
//!
//! A subentry's `subtreeSpecification` picks out the entries it governs,
//! relative to its administrative point (the subentry's parent):
//!
//! ```text
//! { base "ou=people", minimum 1, maximum 2,
//!   specificExclusions { chopBefore:"ou=retired", chopAfter:"ou=contractors" },
//!   specificationFilter and:{ item:person, not:item:extensibleObject } }
//! ```
//!
//! Every component is optional; `{}` covers the whole subtree beneath the
//! administrative point.

use std::fmt;

use crate::dn::Dn;
use crate::entry::Entry;
use crate::error::{Error, Result};

/// Object class refinement from `specificationFilter`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refinement {
    Item(String),
    And(Vec<Refinement>),
    Or(Vec<Refinement>),
    Not(Box<Refinement>),
}

impl Refinement {
    /// True when the entry's object classes satisfy the refinement
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Self::Item(name) => entry
                .object_classes()
                .iter()
                .any(|(oc, value)| oc.has_name_or_oid(name) || value.eq_ignore_ascii_case(name)),
            Self::And(parts) => parts.iter().all(|r| r.matches(entry)),
            Self::Or(parts) => parts.iter().any(|r| r.matches(entry)),
            Self::Not(inner) => !inner.matches(entry),
        }
    }
}

impl fmt::Display for Refinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |f: &mut fmt::Formatter<'_>, op: &str, parts: &[Refinement]| {
            write!(f, "{}:{{ ", op)?;
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", part)?;
            }
            f.write_str(" }")
        };
        match self {
            Self::Item(name) => write!(f, "item:{}", name),
            Self::And(parts) => list(f, "and", parts),
            Self::Or(parts) => list(f, "or", parts),
            Self::Not(inner) => write!(f, "not:{}", inner),
        }
    }
}

/// The set of entries a subentry governs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeSpecification {
    /// Absolute DN of the subtree root
    base: Dn,
    minimum: usize,
    maximum: Option<usize>,
    chop_before: Vec<Dn>,
    chop_after: Vec<Dn>,
    refinement: Option<Refinement>,
}

impl SubtreeSpecification {
    /// The whole subtree beneath `root`
    pub fn subtree(root: Dn) -> Self {
        Self {
            base: root,
            minimum: 0,
            maximum: None,
            chop_before: Vec::new(),
            chop_after: Vec::new(),
            refinement: None,
        }
    }

    /// Parse the string form, resolving DNs against the administrative point
    pub fn parse(admin_point: &Dn, value: &str) -> Result<Self> {
        Parser::new(value).specification(admin_point).map_err(|reason| {
            Error::InvalidAttributeSyntax(format!("invalid subtree specification '{}': {}", value, reason))
        })
    }

    pub fn base(&self) -> &Dn {
        &self.base
    }

    pub fn minimum(&self) -> usize {
        self.minimum
    }

    pub fn maximum(&self) -> Option<usize> {
        self.maximum
    }

    pub fn refinement(&self) -> Option<&Refinement> {
        self.refinement.as_ref()
    }

    /// Scope test on the DN alone, ignoring any refinement
    pub fn contains_dn(&self, dn: &Dn) -> bool {
        if !dn.is_descendant_of(&self.base) {
            return false;
        }
        let depth = dn.len() - self.base.len();
        if depth < self.minimum || self.maximum.map_or(false, |max| depth > max) {
            return false;
        }
        if self.chop_before.iter().any(|chop| dn.is_descendant_of(chop)) {
            return false;
        }
        !self.chop_after.iter().any(|chop| dn != chop && dn.is_descendant_of(chop))
    }

    pub fn contains(&self, entry: &Entry) -> bool {
        self.contains_dn(entry.dn()) && self.refinement.as_ref().map_or(true, |r| r.matches(entry))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parser
// ─────────────────────────────────────────────────────────────────────────────

type ParseResult<T> = std::result::Result<T, String>;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn specification(mut self, admin_point: &Dn) -> ParseResult<SubtreeSpecification> {
        let mut relative_base = None;
        let mut minimum = None;
        let mut maximum = None;
        let mut exclusions = None;
        let mut refinement = None;

        self.expect('{')?;
        if !self.eat('}') {
            loop {
                let keyword = self.word()?;
                match keyword.as_str() {
                    "base" => set_once(&mut relative_base, self.quoted_dn()?, "base")?,
                    "minimum" => set_once(&mut minimum, self.number()?, "minimum")?,
                    "maximum" => set_once(&mut maximum, self.number()?, "maximum")?,
                    "specificExclusions" => set_once(&mut exclusions, self.exclusions()?, "specificExclusions")?,
                    "specificationFilter" => set_once(&mut refinement, self.refinement(0)?, "specificationFilter")?,
                    other => return Err(format!("unknown component '{}' at offset {}", other, self.pos)),
                }
                if self.eat('}') {
                    break;
                }
                self.expect(',')?;
            }
        }
        self.skip_space();
        if self.pos != self.input.len() {
            return Err(format!("trailing text at offset {}", self.pos));
        }

        let base = admin_point.append(&relative_base.unwrap_or_default());
        let (chop_before, chop_after) = exclusions.unwrap_or_default();
        Ok(SubtreeSpecification {
            chop_before: chop_before.iter().map(|dn| base.append(dn)).collect(),
            chop_after: chop_after.iter().map(|dn| base.append(dn)).collect(),
            base,
            minimum: minimum.unwrap_or(0),
            maximum,
            refinement,
        })
    }

    fn exclusions(&mut self) -> ParseResult<(Vec<Dn>, Vec<Dn>)> {
        let mut before = Vec::new();
        let mut after = Vec::new();
        self.expect('{')?;
        if self.eat('}') {
            return Ok((before, after));
        }
        loop {
            let keyword = self.word()?;
            self.expect(':')?;
            match keyword.as_str() {
                "chopBefore" => before.push(self.quoted_dn()?),
                "chopAfter" => after.push(self.quoted_dn()?),
                other => return Err(format!("unknown exclusion '{}'", other)),
            }
            if self.eat('}') {
                return Ok((before, after));
            }
            self.expect(',')?;
        }
    }

    fn refinement(&mut self, depth: usize) -> ParseResult<Refinement> {
        if depth > crate::limits::MAX_NESTED_FILTER_DEPTH {
            return Err("specificationFilter nested too deeply".to_string());
        }
        let keyword = self.word()?;
        self.expect(':')?;
        match keyword.as_str() {
            "item" => Ok(Refinement::Item(self.word()?)),
            "not" => Ok(Refinement::Not(Box::new(self.refinement(depth + 1)?))),
            "and" | "or" => {
                let mut parts = Vec::new();
                self.expect('{')?;
                if !self.eat('}') {
                    loop {
                        parts.push(self.refinement(depth + 1)?);
                        if self.eat('}') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                Ok(if keyword == "and" {
                    Refinement::And(parts)
                } else {
                    Refinement::Or(parts)
                })
            }
            other => Err(format!("unknown refinement '{}'", other)),
        }
    }

    fn quoted_dn(&mut self) -> ParseResult<Dn> {
        self.skip_space();
        if !self.eat_raw('"') {
            return Err(format!("expected '\"' at offset {}", self.pos));
        }
        let mut value = String::new();
        loop {
            let c = self.next().ok_or_else(|| "unterminated string".to_string())?;
            if c == '"' {
                // "" is an escaped quote
                if self.eat_raw('"') {
                    value.push('"');
                    continue;
                }
                break;
            }
            value.push(c);
        }
        Dn::parse(&value).map_err(|e| e.to_string())
    }

    fn number(&mut self) -> ParseResult<usize> {
        self.skip_space();
        let start = self.pos;
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| format!("expected a number at offset {}", start))
    }

    /// Keyword, object class name or OID
    fn word(&mut self) -> ParseResult<String> {
        self.skip_space();
        let start = self.pos;
        while self
            .peek()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(format!("expected a name at offset {}", start));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn expect(&mut self, c: char) -> ParseResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(format!("expected '{}' at offset {}", c, self.pos))
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_space();
        self.eat_raw(c)
    }

    fn eat_raw(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_space(&mut self) {
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, name: &str) -> ParseResult<()> {
    if slot.is_some() {
        return Err(format!("'{}' given twice", name));
    }
    *slot = Some(value);
    Ok(())
}
