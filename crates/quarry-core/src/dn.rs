//! Distinguished names
//!
//! A [`Dn`] is an ordered list of [`Rdn`]s, leaf first. Parsing follows the
//! RFC 4514 string form (`,` between RDNs, `+` between AVAs, `\` escapes
//! including `\XX` hex pairs). Two DNs are equal when their attribute types
//! match case-insensitively and their values match after lower-casing and
//! whitespace folding.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::limits::validate_dn_components;

/// Attribute value assertion, one `type=value` pair inside an RDN
#[derive(Debug, Clone)]
pub struct Ava {
    attribute_type: String,
    value: String,
}

impl Ava {
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_type: attribute_type.into(),
            value: value.into(),
        }
    }

    pub fn attribute_type(&self) -> &str {
        &self.attribute_type
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn normalized(&self) -> String {
        format!(
            "{}={}",
            self.attribute_type.to_ascii_lowercase(),
            fold_value(&self.value)
        )
    }
}

impl PartialEq for Ava {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Ava {}

impl fmt::Display for Ava {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute_type, escape_value(&self.value))
    }
}

/// Relative distinguished name: one or more AVAs joined by `+`
#[derive(Debug, Clone)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            avas: vec![Ava::new(attribute_type, value)],
        }
    }

    /// Build a multi-valued RDN. Returns `None` when `avas` is empty.
    pub fn from_avas(avas: Vec<Ava>) -> Option<Self> {
        if avas.is_empty() {
            None
        } else {
            Some(Self { avas })
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut rdns = Dn::parse(s)?.rdns;
        if rdns.len() == 1 {
            Ok(rdns.remove(0))
        } else {
            Err(Error::invalid_dn(s, "expected exactly one RDN"))
        }
    }

    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    /// Whether this RDN has an AVA for the given type name (case-insensitive)
    pub fn has_attribute_type(&self, name: &str) -> bool {
        self.avas
            .iter()
            .any(|ava| ava.attribute_type.eq_ignore_ascii_case(name))
    }

    /// Value of the AVA for the given type name
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.avas
            .iter()
            .find(|ava| ava.attribute_type.eq_ignore_ascii_case(name))
            .map(|ava| ava.value.as_str())
    }

    fn normalized(&self) -> String {
        let mut parts: Vec<String> = self.avas.iter().map(Ava::normalized).collect();
        parts.sort();
        parts.join("+")
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Rdn {}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}", ava)?;
        }
        Ok(())
    }
}

/// Distinguished name; the empty DN is the root DSE
#[derive(Debug, Clone, Default)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The root (null) DN
    pub fn root() -> Self {
        Self { rdns: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn parse(s: &str) -> Result<Self> {
        let text = s.trim();
        if text.is_empty() {
            return Ok(Self::root());
        }

        let bytes = text.as_bytes();
        let mut pos = 0;
        let mut rdns = Vec::new();
        let mut avas = Vec::new();

        loop {
            while pos < bytes.len() && bytes[pos] == b' ' {
                pos += 1;
            }
            let start = pos;
            while pos < bytes.len() && bytes[pos] != b'=' {
                if matches!(bytes[pos], b',' | b'+' | b';') {
                    return Err(Error::invalid_dn(s, format!("missing '=' at offset {}", pos)));
                }
                pos += 1;
            }
            if pos >= bytes.len() {
                return Err(Error::invalid_dn(s, "missing '=' in last RDN"));
            }
            let attribute_type = text[start..pos].trim();
            if attribute_type.is_empty() {
                return Err(Error::invalid_dn(s, format!("empty attribute type at offset {}", start)));
            }
            if !attribute_type
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
            {
                return Err(Error::invalid_dn(
                    s,
                    format!("illegal attribute type '{}'", attribute_type),
                ));
            }
            pos += 1;
            while pos < bytes.len() && bytes[pos] == b' ' {
                pos += 1;
            }

            let (value, next) = parse_value(s, bytes, pos)?;
            pos = next;
            avas.push(Ava::new(attribute_type, value));

            if pos >= bytes.len() {
                rdns.push(Rdn {
                    avas: std::mem::take(&mut avas),
                });
                break;
            }
            match bytes[pos] {
                b'+' => pos += 1,
                b',' | b';' => {
                    rdns.push(Rdn {
                        avas: std::mem::take(&mut avas),
                    });
                    pos += 1;
                }
                other => {
                    return Err(Error::invalid_dn(
                        s,
                        format!("unexpected '{}' at offset {}", other as char, pos),
                    ))
                }
            }
        }

        validate_dn_components(rdns.len()).map_err(|e| Error::invalid_dn(s, e.to_string()))?;
        Ok(Self { rdns })
    }

    /// The leaf RDN, `None` for the root DN
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Parent DN, `None` for the root DN
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Self {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// DN of an immediate child with the given RDN
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// `relative` placed beneath this DN
    pub fn append(&self, relative: &Dn) -> Dn {
        let mut rdns = relative.rdns.clone();
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// True when `self` equals `ancestor` or lies beneath it
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        if ancestor.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(ancestor.rdns.iter())
            .all(|(a, b)| a == b)
    }

    pub fn is_ancestor_of(&self, descendant: &Dn) -> bool {
        descendant.is_descendant_of(self)
    }

    /// Canonical comparison form
    pub fn normalized(&self) -> String {
        self.rdns
            .iter()
            .map(Rdn::normalized)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.rdns == other.rdns
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_value(source: &str, bytes: &[u8], mut pos: usize) -> Result<(String, usize)> {
    let mut out = Vec::new();

    if pos < bytes.len() && bytes[pos] == b'"' {
        pos += 1;
        loop {
            if pos >= bytes.len() {
                return Err(Error::invalid_dn(source, "unterminated quoted value"));
            }
            match bytes[pos] {
                b'"' => {
                    pos += 1;
                    break;
                }
                b'\\' => {
                    pos = unescape(source, bytes, pos + 1, &mut out)?;
                }
                b => {
                    out.push(b);
                    pos += 1;
                }
            }
        }
        while pos < bytes.len() && bytes[pos] == b' ' {
            pos += 1;
        }
    } else {
        // Unescaped trailing spaces are not part of the value
        let mut significant = 0;
        while pos < bytes.len() {
            match bytes[pos] {
                b',' | b'+' | b';' => break,
                b'\\' => {
                    pos = unescape(source, bytes, pos + 1, &mut out)?;
                    significant = out.len();
                }
                b => {
                    out.push(b);
                    pos += 1;
                    if b != b' ' {
                        significant = out.len();
                    }
                }
            }
        }
        out.truncate(significant);
    }

    let value = String::from_utf8(out)
        .map_err(|_| Error::invalid_dn(source, "value is not valid UTF-8"))?;
    Ok((value, pos))
}

/// Decode the escape that starts at `pos` (just past the backslash)
fn unescape(source: &str, bytes: &[u8], pos: usize, out: &mut Vec<u8>) -> Result<usize> {
    let Some(&c) = bytes.get(pos) else {
        return Err(Error::invalid_dn(source, "trailing backslash"));
    };
    if c.is_ascii_hexdigit() {
        let hi = hex_digit(c);
        let lo = bytes.get(pos + 1).copied().and_then(|b| {
            if b.is_ascii_hexdigit() {
                Some(hex_digit(b))
            } else {
                None
            }
        });
        match lo {
            Some(lo) => {
                out.push((hi << 4) | lo);
                Ok(pos + 2)
            }
            None => Err(Error::invalid_dn(
                source,
                format!("invalid hex escape at offset {}", pos - 1),
            )),
        }
    } else if matches!(
        c,
        b',' | b'+' | b'"' | b'\\' | b'<' | b'>' | b';' | b'=' | b'#' | b' '
    ) {
        out.push(c);
        Ok(pos + 1)
    } else {
        Err(Error::invalid_dn(
            source,
            format!("invalid escape at offset {}", pos - 1),
        ))
    }
}

fn hex_digit(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}

/// Lower-case and collapse runs of whitespace
pub(crate) fn fold_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let count = value.chars().count();
    for (i, c) in value.chars().enumerate() {
        let special = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (i == 0 && (c == '#' || c == ' '))
            || (i + 1 == count && c == ' ');
        if special {
            out.push('\\');
            out.push(c);
        } else if (c as u32) < 0x20 {
            out.push_str(&format!("\\{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}
