//! Proxy mapping grammar.
//!
//! Mappings are whitespace-separated tokens of the form `src[:dst[:port]]`:
//!
//! ```text
//! "a"        → (a, a, 80)
//! "a:b"      → (a, b, 80)
//! "a:3000"   → (a, a, 3000)
//! "a:b:82"   → (a, b, 82)
//! "a:b:c:d"  → rejected
//! ```
//!
//! A trailing non-numeric segment implies port 80, so `a:3000` keeps the
//! source as destination and only overrides the port.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Port assumed when a token does not name one.
pub const DEFAULT_PORT: u16 = 80;

/// Errors raised while parsing the mapping grammar.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// Token has more than `src:dst:port` segments.
    #[error("wrong mapping format '{token}', expected [srchost:]dsthost[:destport]")]
    TooManySegments { token: String },

    /// A segment between colons is empty.
    #[error("empty host in mapping '{token}'")]
    EmptySegment { token: String },

    /// Port segment is numeric but not a usable TCP port.
    #[error("invalid port '{port}' in mapping '{token}'")]
    InvalidPort { token: String, port: String },
}

/// One parsed `src:dst:port` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    pub source: String,
    pub destination: String,
    pub port: u16,
}

impl MappingRule {
    /// Key under which the destination appears in a discovery address table.
    pub fn service_key(&self) -> String {
        format!("{}:{}", self.destination, self.port)
    }
}

impl fmt::Display for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.destination, self.port)
    }
}

impl FromStr for MappingRule {
    type Err = MappingError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let mut segments: Vec<&str> = token.split(':').collect();

        let last_is_numeric = segments
            .last()
            .map(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false);
        let port = if last_is_numeric {
            let raw = segments.pop().unwrap_or_default();
            match raw.parse::<u16>() {
                Ok(p) if p > 0 => p,
                _ => {
                    return Err(MappingError::InvalidPort {
                        token: token.to_string(),
                        port: raw.to_string(),
                    })
                }
            }
        } else {
            DEFAULT_PORT
        };

        if segments.iter().any(|s| s.is_empty()) {
            return Err(MappingError::EmptySegment {
                token: token.to_string(),
            });
        }

        match segments.as_slice() {
            [source] => Ok(Self {
                source: source.to_ascii_lowercase(),
                destination: source.to_ascii_lowercase(),
                port,
            }),
            [source, destination] => Ok(Self {
                source: source.to_ascii_lowercase(),
                destination: destination.to_ascii_lowercase(),
                port,
            }),
            [] => Err(MappingError::EmptySegment {
                token: token.to_string(),
            }),
            _ => Err(MappingError::TooManySegments {
                token: token.to_string(),
            }),
        }
    }
}

/// Source host → rule table built once from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyMapping {
    rules: HashMap<String, MappingRule>,
}

impl ProxyMapping {
    /// Parse a whitespace-separated list of tokens. Later duplicates win.
    pub fn parse(input: &str) -> Result<Self, MappingError> {
        let mut rules = HashMap::new();
        for token in input.split_whitespace() {
            let rule: MappingRule = token.parse()?;
            rules.insert(rule.source.clone(), rule);
        }
        Ok(Self { rules })
    }

    pub fn get(&self, source: &str) -> Option<&MappingRule> {
        self.rules.get(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromStr for ProxyMapping {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
