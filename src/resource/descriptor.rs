//! Resource descriptors and the identifiers derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BirdcallError;

/// HTTP verb of an API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = BirdcallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("get") {
            Ok(Verb::Get)
        } else if s.eq_ignore_ascii_case("post") {
            Ok(Verb::Post)
        } else {
            Err(BirdcallError::argument("verb", "must be GET or POST"))
        }
    }
}

/// Requests allowed per rate-limit window, by authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultLimits {
    /// User-context (signed) requests per window
    pub user: u32,
    /// App-only (bearer) requests per window
    pub app: u32,
}

/// A known API endpoint.
///
/// Patterns are relative paths without the `.json` suffix. A segment
/// starting with `:` is a placeholder matching any single path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub verb: Verb,
    pub pattern: &'static str,
    /// `None` when the endpoint is not rate limited
    pub limits: Option<DefaultLimits>,
}

impl ResourceDescriptor {
    pub const fn get(pattern: &'static str, limits: Option<DefaultLimits>) -> Self {
        Self {
            verb: Verb::Get,
            pattern,
            limits,
        }
    }

    pub const fn post(pattern: &'static str, limits: Option<DefaultLimits>) -> Self {
        Self {
            verb: Verb::Post,
            pattern,
            limits,
        }
    }

    /// The canonical identifier for this endpoint.
    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.verb, self.pattern)
    }

    /// Check whether a normalized relative path matches this pattern.
    ///
    /// `path` must have no leading slash, no query and no extension.
    pub fn matches_path(&self, path: &str) -> bool {
        let mut pattern_segments = self.pattern.split('/');
        let mut path_segments = path.split('/');

        loop {
            match (pattern_segments.next(), path_segments.next()) {
                (None, None) => return true,
                (Some(expected), Some(actual)) => {
                    let matched = if expected.starts_with(':') {
                        !actual.is_empty()
                    } else {
                        expected.eq_ignore_ascii_case(actual)
                    };
                    if !matched {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
}

/// Canonical identity of an API endpoint, e.g. `GET statuses/show/:id`.
///
/// Used as the key for rate-limit tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(verb: Verb, pattern: &str) -> Self {
        Self(format!("{} {}", verb, pattern.trim_start_matches('/')))
    }

    /// Build the id for a key of the bulk rate-limit status payload.
    ///
    /// Those keys are GET paths such as `/statuses/show/:id`.
    pub fn from_status_key(key: &str) -> Self {
        Self::new(Verb::Get, key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
