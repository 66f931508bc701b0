//! Module version strings.
//!
//! A version string has three components: the version number itself, an
//! optional pre-release component and an optional build component. Each
//! component is a sequence of tokens, where a token is either a non-negative
//! integer or a string. Tokens are separated by `.`, `-` or `+`, or by a
//! transition between digits and non-digits. Numeric tokens compare as
//! integers, mixed tokens compare lexicographically and trailing zero
//! integers are ignored, so `1.0` and `1.0.0` are equal.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ModuleError, Result};

/// One token of a version component.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Num(u64),
    Str(String),
}

/// A parsed, comparable module version.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    sequence: Vec<Token>,
    pre: Vec<Token>,
    build: Vec<Token>,
}

impl Version {
    /// Parse the given string as a version string.
    pub fn parse(v: &str) -> Result<Self> {
        if v.is_empty() {
            return Err(ModuleError::InvalidVersion(
                v.to_string(),
                "empty version string".to_string(),
            ));
        }
        let chars: Vec<char> = v.chars().collect();
        if !chars[0].is_ascii_digit() {
            return Err(ModuleError::InvalidVersion(
                v.to_string(),
                "version does not start with a number".to_string(),
            ));
        }

        let n = chars.len();
        let mut sequence = Vec::with_capacity(4);
        let mut pre = Vec::new();
        let mut build = Vec::new();

        let mut i = take_number(&chars, 0, &mut sequence);
        let mut c = '\0';

        while i < n {
            c = chars[i];
            if c == '.' {
                i += 1;
                continue;
            }
            if c == '-' || c == '+' {
                i += 1;
                break;
            }
            if c.is_ascii_digit() {
                i = take_number(&chars, i, &mut sequence);
            } else {
                i = take_string(&chars, i, &mut sequence);
            }
        }

        if c == '-' && i >= n {
            return Err(ModuleError::InvalidVersion(
                v.to_string(),
                "empty pre-release component".to_string(),
            ));
        }

        if c == '-' {
            while i < n {
                c = chars[i];
                if c.is_ascii_digit() {
                    i = take_number(&chars, i, &mut pre);
                } else {
                    i = take_string(&chars, i, &mut pre);
                }
                if i >= n {
                    break;
                }
                c = chars[i];
                if c == '.' || c == '-' {
                    i += 1;
                    continue;
                }
                if c == '+' {
                    i += 1;
                    break;
                }
            }
        }

        if c == '+' && i >= n {
            return Err(ModuleError::InvalidVersion(
                v.to_string(),
                "empty build component".to_string(),
            ));
        }

        while i < n {
            c = chars[i];
            if c.is_ascii_digit() {
                i = take_number(&chars, i, &mut build);
            } else {
                i = take_string(&chars, i, &mut build);
            }
            if i >= n {
                break;
            }
            c = chars[i];
            if c == '.' || c == '-' || c == '+' {
                i += 1;
            }
        }

        Ok(Version {
            raw: v.to_string(),
            sequence,
            pre,
            build,
        })
    }

    /// The original version string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

// Take a run of decimal digits starting at i, push it as a numeric token and
// return the index of the first character not taken. Saturates rather than
// overflows on absurdly long digit runs.
fn take_number(chars: &[char], mut i: usize, acc: &mut Vec<Token>) -> usize {
    let mut d: u64 = 0;
    while i < chars.len() && chars[i].is_ascii_digit() {
        d = d
            .saturating_mul(10)
            .saturating_add(chars[i] as u64 - '0' as u64);
        i += 1;
    }
    acc.push(Token::Num(d));
    i
}

// Take a run of non-digit, non-punctuation characters starting at i, push it
// as a string token and return the index of the first character not taken.
fn take_string(chars: &[char], i: usize, acc: &mut Vec<Token>) -> usize {
    let mut j = i;
    while j < chars.len() {
        let c = chars[j];
        if c == '.' || c == '-' || c == '+' || c.is_ascii_digit() {
            break;
        }
        j += 1;
    }
    acc.push(Token::Str(chars[i..j].iter().collect()));
    j
}

fn cmp_tokens(a: &[Token], b: &[Token]) -> Ordering {
    let n = a.len().min(b.len());
    for i in 0..n {
        let ord = match (&a[i], &b[i]) {
            (Token::Num(x), Token::Num(y)) => x.cmp(y),
            (Token::Str(x), Token::Str(y)) => x.cmp(y),
            // Types differ, compare the decimal rendering of the number
            (Token::Num(x), Token::Str(y)) => x.to_string().as_str().cmp(y.as_str()),
            (Token::Str(x), Token::Num(y)) => x.as_str().cmp(y.to_string().as_str()),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    // Trailing zero integers are ignored; any other trailing token makes the
    // longer side the greater one.
    let rest = if a.len() > b.len() { a } else { b };
    for token in &rest[n..] {
        if matches!(token, Token::Num(0)) {
            continue;
        }
        return a.len().cmp(&b.len());
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let c = cmp_tokens(&self.sequence, &other.sequence);
        if c != Ordering::Equal {
            return c;
        }
        // A pre-release precedes the same version without one
        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        let c = cmp_tokens(&self.pre, &other.pre);
        if c != Ordering::Equal {
            return c;
        }
        cmp_tokens(&self.build, &other.build)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Process-scoped version interner.
///
/// Most modules in a closure share one version string, so repeated parses of
/// the same string are served from a single-slot cache. This is purely an
/// allocation optimization and does not affect equality semantics.
#[derive(Default)]
pub struct VersionCache {
    last: Mutex<Option<(String, Arc<Version>)>>,
}

impl VersionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a version string, reusing the previous result when the string
    /// repeats.
    pub fn parse(&self, v: &str) -> Result<Arc<Version>> {
        let mut last = self.last.lock();
        if let Some((raw, version)) = last.as_ref() {
            if raw == v {
                return Ok(Arc::clone(version));
            }
        }
        let version = Arc::new(Version::parse(v)?);
        *last = Some((v.to_string(), Arc::clone(&version)));
        Ok(version)
    }
}
