//! Label matchers used to narrow index lookups.
//!
//! A request carries a conjunction of [`Matcher`]s. The query pipelines never
//! interpret them; they hand the same set to `label_names`, `label_values` and
//! postings resolution.

use crate::{Error, Result};
use core::{fmt, str::FromStr};
use regex::Regex;

/// The comparison a [`Matcher`] applies to a label value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

impl MatchKind {
    const fn operator(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Regex => "=~",
            Self::NotRegex => "!~",
        }
    }
}

/// A predicate over one label's value.
///
/// Regular expressions are anchored on both ends, so `job=~"api"` matches only
/// the value `api` and not `api-gateway`.
#[derive(Clone)]
pub struct Matcher {
    name: String,
    kind: MatchKind,
    value: String,
    re: Option<Regex>,
}

impl Matcher {
    /// Builds a matcher, compiling the pattern for regex kinds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMatcher`] if the label name is empty or the
    /// pattern does not compile.
    pub fn new(kind: MatchKind, name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() {
            return Err(Error::InvalidMatcher {
                reason: "label name must not be empty".to_string(),
            });
        }
        let re = match kind {
            MatchKind::Regex | MatchKind::NotRegex => Some(Regex::new(&format!("^(?:{value})$"))?),
            MatchKind::Equal | MatchKind::NotEqual => None,
        };
        Ok(Self {
            name,
            kind,
            value,
            re,
        })
    }

    /// Equality matcher. Infallible since no pattern is compiled.
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MatchKind::Equal,
            value: value.into(),
            re: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Tests a label value against this matcher.
    pub fn matches(&self, value: &str) -> bool {
        match (self.kind, &self.re) {
            (MatchKind::Equal, _) => value == self.value,
            (MatchKind::NotEqual, _) => value != self.value,
            (MatchKind::Regex, Some(re)) => re.is_match(value),
            (MatchKind::NotRegex, Some(re)) => !re.is_match(value),
            // Regex kinds are always constructed with a compiled pattern.
            (MatchKind::Regex | MatchKind::NotRegex, None) => false,
        }
    }

    /// Whether series that do not carry this label at all are selected.
    pub fn matches_empty(&self) -> bool {
        self.matches("")
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind && self.value == other.value
    }
}

impl Eq for Matcher {}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}\"", self.name, self.kind.operator())?;
        for c in self.value.chars() {
            match c {
                '\\' => f.write_str("\\\\")?,
                '"' => f.write_str("\\\"")?,
                '\n' => f.write_str("\\n")?,
                c => write!(f, "{c}")?,
            }
        }
        f.write_str("\"")
    }
}

impl FromStr for Matcher {
    type Err = Error;

    /// Parses `name="value"`, `name!="value"`, `name=~"re"` or `name!~"re"`.
    /// Surrounding quotes on the value are optional. Inside quotes, `\\`,
    /// `\"` and `\n` are unescaped; any other backslash is kept as written so
    /// patterns like `"\d+"` read naturally.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (pos, kind) = s
            .char_indices()
            .find_map(|(i, c)| match (c, s[i + c.len_utf8()..].chars().next()) {
                ('!', Some('=')) => Some((i, MatchKind::NotEqual)),
                ('!', Some('~')) => Some((i, MatchKind::NotRegex)),
                ('=', Some('~')) => Some((i, MatchKind::Regex)),
                ('=', _) => Some((i, MatchKind::Equal)),
                _ => None,
            })
            .ok_or_else(|| Error::InvalidMatcher {
                reason: format!("missing operator in {s:?}"),
            })?;

        let name = s[..pos].trim();
        let rest = s[pos + kind.operator().len()..].trim();
        let value = match rest.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            Some(quoted) => unescape(quoted)?,
            None => rest.to_string(),
        };

        Self::new(kind, name, value)
    }
}

fn unescape(quoted: &str) -> Result<String> {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => {
                return Err(Error::InvalidMatcher {
                    reason: format!("dangling escape in \"{quoted}\""),
                });
            }
        }
    }
    Ok(out)
}
