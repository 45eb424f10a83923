//! The spoofing configuration and its parser
//!
//! The companion relays `pif.json` (or `custom.pif.json`) verbatim. It looks like:
//!
//! ```json
//! {
//!     // comments are allowed
//!     "spoofProps": 1,
//!     "verboseLogs": 0,
//!     "props": {
//!         "ro.product.model": "Pixel 8",
//!         "*ro.build.tags": "release-keys"
//!     }
//! }
//! ```
//!
//! A key starting with `*` in `props` matches every property whose name starts
//! with the rest of the key.

use std::collections::HashMap;
use std::ffi::{CStr, CString};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};

/// Leading character that marks a prefix pattern in `props`.
pub const WILDCARD: char = '*';

/// Feature flags. Each is an integer where 0 is off and anything else is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub verbose_logs: i64,
    pub spoof_build: i64,
    pub spoof_props: i64,
    pub spoof_provider: i64,
    pub spoof_signature: i64,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            verbose_logs: 0,
            spoof_build: 1,
            spoof_props: 1,
            spoof_provider: 1,
            spoof_signature: 0,
        }
    }
}

/// What an override rule matches against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// The whole property name
    Literal(String),
    /// Any property name starting with this
    Prefix(String),
}

impl Pattern {
    /// Read a `props` key, where a leading [`WILDCARD`] makes it a prefix.
    pub fn parse(key: &str) -> Self {
        match key.strip_prefix(WILDCARD) {
            Some(prefix) => Pattern::Prefix(prefix.to_string()),
            None => Pattern::Literal(key.to_string()),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Literal(literal) => literal == name,
            Pattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

/// A single `pattern -> value` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRule {
    pattern: Pattern,
    value: CString,
}

impl OverrideRule {
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The substituted value, ready to hand to a native callback.
    pub fn value(&self) -> &CStr {
        &self.value
    }

    pub fn value_str(&self) -> &str {
        // Built from a `String`, so always UTF-8.
        self.value.to_str().unwrap_or_default()
    }
}

/// Override rules in declaration order, with an index over the literals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideRules {
    rules: Vec<OverrideRule>,
    literals: HashMap<String, usize>,
}

impl OverrideRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. A pattern seen before keeps its position and takes the new value.
    ///
    /// Values containing a NUL byte cannot be passed to native code and are rejected.
    pub fn insert(&mut self, pattern: Pattern, value: &str) -> bool {
        let Ok(value) = CString::new(value) else {
            return false;
        };

        if let Some(existing) = self.rules.iter_mut().find(|rule| rule.pattern == pattern) {
            existing.value = value;
            return true;
        }

        if let Pattern::Literal(name) = &pattern {
            self.literals.insert(name.clone(), self.rules.len());
        }
        self.rules.push(OverrideRule { pattern, value });
        true
    }

    /// The rule for exactly `name`, ignoring prefix patterns.
    pub fn literal(&self, name: &str) -> Option<&OverrideRule> {
        self.literals.get(name).map(|&index| &self.rules[index])
    }

    /// Prefix rules, in declaration order.
    pub fn prefixes(&self) -> impl Iterator<Item = &OverrideRule> {
        self.rules
            .iter()
            .filter(|rule| matches!(rule.pattern, Pattern::Prefix(_)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &OverrideRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The parsed configuration for one process.
///
/// Built once while the process is specialized and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub flags: Flags,
    pub rules: OverrideRules,
}

impl Config {
    /// Decode relayed config bytes.
    ///
    /// `//` and `/* */` comments are tolerated. Anything else that is not a JSON
    /// object is an error. Flags missing or not integers keep their defaults.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let stripped = strip_comments(bytes);
        let root = match serde_json::from_slice(&stripped)? {
            Value::Object(root) => root,
            other => return Err(Error::NotAnObject(kind_of(&other))),
        };

        let defaults = Flags::default();
        let flags = Flags {
            verbose_logs: int_flag(&root, "verboseLogs").unwrap_or(defaults.verbose_logs),
            spoof_build: int_flag(&root, "spoofBuild").unwrap_or(defaults.spoof_build),
            spoof_props: int_flag(&root, "spoofProps").unwrap_or(defaults.spoof_props),
            spoof_provider: int_flag(&root, "spoofProvider").unwrap_or(defaults.spoof_provider),
            spoof_signature: int_flag(&root, "spoofSignature").unwrap_or(defaults.spoof_signature),
        };

        let mut rules = OverrideRules::new();
        if let Some(Value::Object(props)) = root.get("props") {
            for (key, value) in props {
                let text = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                if !rules.insert(Pattern::parse(key), &text) {
                    warn!("Dropping prop {key}: value contains a NUL byte");
                }
            }
        }

        Ok(Self { flags, rules })
    }

    /// Like [`Config::from_slice`], but falls back to the defaults on any error.
    pub fn from_slice_or_default(bytes: &[u8]) -> Self {
        Self::from_slice(bytes).unwrap_or_else(|e| {
            warn!("Using default config: {e}");
            Self::default()
        })
    }

    pub fn verbose_logs(&self) -> bool {
        self.flags.verbose_logs != 0
    }

    pub fn spoof_build(&self) -> bool {
        self.flags.spoof_build != 0
    }

    pub fn spoof_props(&self) -> bool {
        self.flags.spoof_props != 0
    }

    pub fn spoof_provider(&self) -> bool {
        self.flags.spoof_provider != 0
    }

    pub fn spoof_signature(&self) -> bool {
        self.flags.spoof_signature != 0
    }
}

fn int_flag(root: &Map<String, Value>, key: &str) -> Option<i64> {
    match root.get(key)? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().map(|_| i64::MAX)),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Blank out `//` line comments and `/* */` block comments outside of strings.
///
/// Comment bytes become spaces so parser error offsets still line up with the
/// original file. An unterminated block comment is left in place for the
/// parser to reject.
fn strip_comments(input: &[u8]) -> Vec<u8> {
    let input = input.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(input);
    let mut out = Vec::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];

        if in_string {
            out.push(byte);
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match (byte, input.get(i + 1)) {
            (b'"', _) => {
                in_string = true;
                out.push(byte);
                i += 1;
            }
            (b'/', Some(b'/')) => {
                while i < input.len() && input[i] != b'\n' {
                    out.push(b' ');
                    i += 1;
                }
            }
            (b'/', Some(b'*')) => {
                let Some(len) = input[i + 2..].windows(2).position(|w| w == b"*/") else {
                    out.extend_from_slice(&input[i..]);
                    break;
                };
                let end = i + 2 + len + 2;
                out.extend(input[i..end].iter().map(|&b| if b == b'\n' { b'\n' } else { b' ' }));
                i = end;
            }
            _ => {
                out.push(byte);
                i += 1;
            }
        }
    }

    out
}
