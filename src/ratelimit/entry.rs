//! Observed rate-limit state for a single resource.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the number of calls allowed per window.
pub const LIMIT_HEADER: &str = "x-rate-limit-limit";
/// Header carrying the number of calls left in the current window.
pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";
/// Header carrying the epoch second at which the window resets.
pub const RESET_HEADER: &str = "x-rate-limit-reset";

/// The most recently observed `{limit, remaining, reset}` for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    /// Calls allowed per window
    pub limit: u32,
    /// Calls left in the current window
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
}

impl RateLimitEntry {
    /// Create an entry from raw values, `reset` being epoch seconds.
    pub fn new(limit: u32, remaining: u32, reset: i64) -> Option<Self> {
        let reset_at = Utc.timestamp_opt(reset, 0).single()?;
        Some(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    /// Parse an entry from response headers.
    ///
    /// Returns `None` unless all three headers are present and numeric.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let limit = header_value(headers, LIMIT_HEADER)?;
        let remaining = header_value(headers, REMAINING_HEADER)?;
        let reset = header_value(headers, RESET_HEADER)?;
        Self::new(limit, remaining, reset)
    }

    /// Parse an entry from one object of the bulk status payload,
    /// e.g. `{"limit": 15, "remaining": 14, "reset": 1403602426}`.
    pub fn from_status(value: &serde_json::Value) -> Option<Self> {
        let limit = u32::try_from(value.get("limit")?.as_u64()?).ok()?;
        let remaining = u32::try_from(value.get("remaining")?.as_u64()?).ok()?;
        let reset = value.get("reset")?.as_i64()?;
        Self::new(limit, remaining, reset)
    }

    /// Whether the window is used up as of `now`.
    pub fn is_exhausted_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining == 0 && now < self.reset_at
    }

    /// Time left until the window resets, zero once it has passed.
    pub fn duration_until_reset(&self, now: DateTime<Utc>) -> Duration {
        (self.reset_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
