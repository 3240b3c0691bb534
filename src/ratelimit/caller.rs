//! Caller identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An opaque identifier for whoever is asking to be admitted.
///
/// Identifiers are either signed integers or arbitrary strings. No
/// validation is applied: negative numbers and empty strings are valid
/// callers. Strings are never reinterpreted, so `"42"`, `"042"` and `42`
/// are three distinct callers.
///
/// Over JSON, integer ids must fit in an `i64`. Larger integers and
/// floating point ids are rejected rather than rounded or stringified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallerId {
    /// Numeric caller, e.g. a user id
    Id(i64),
    /// Named caller, e.g. an API key or client address
    Name(String),
}

impl From<i64> for CallerId {
    fn from(id: i64) -> Self {
        CallerId::Id(id)
    }
}

impl From<String> for CallerId {
    fn from(name: String) -> Self {
        CallerId::Name(name)
    }
}

impl From<&str> for CallerId {
    fn from(name: &str) -> Self {
        CallerId::from(name.to_string())
    }
}

impl CallerId {
    /// Interpret an untyped text segment, such as a URL path component.
    ///
    /// Only the canonical decimal form of an `i64` becomes an integer
    /// caller. `"7"` and `"-7"` do, while `"007"`, `"+7"` and `"-0"` stay
    /// names, so two distinct strings never map to the same caller.
    pub fn from_segment(segment: &str) -> Self {
        match segment.parse::<i64>() {
            Ok(id) if id.to_string() == segment => CallerId::Id(id),
            _ => CallerId::Name(segment.to_string()),
        }
    }
}

impl FromStr for CallerId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CallerId::from_segment(s))
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerId::Id(id) => write!(f, "{}", id),
            CallerId::Name(name) => write!(f, "{:?}", name),
        }
    }
}
