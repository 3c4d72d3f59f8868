//! The per-resource rate-limit table.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use tracing::{debug, trace};

use super::entry::RateLimitEntry;
use crate::resource::{ResourceId, ResourceRegistry};

/// Most recently observed rate-limit state for every known resource.
///
/// Only ids recognized by the registry are ever stored. A resource with no
/// entry has not been observed yet and is assumed to be allowed.
pub struct RateLimitTable {
    registry: &'static ResourceRegistry,
    entries: DashMap<ResourceId, RateLimitEntry>,
}

impl RateLimitTable {
    /// Create an empty table backed by a registry.
    pub fn new(registry: &'static ResourceRegistry) -> Self {
        Self {
            registry,
            entries: DashMap::new(),
        }
    }

    /// Record the rate-limit headers of a response.
    ///
    /// Returns the stored entry, or `None` when the resource is unknown or
    /// the headers are missing.
    pub fn observe(&self, resource: &ResourceId, headers: &HeaderMap) -> Option<RateLimitEntry> {
        let entry = RateLimitEntry::from_headers(headers)?;
        self.insert(resource, entry).then_some(entry)
    }

    /// Store an entry for a resource, overwriting any previous one.
    ///
    /// Unknown resources are dropped and `false` is returned.
    pub fn insert(&self, resource: &ResourceId, entry: RateLimitEntry) -> bool {
        if !self.registry.contains(resource) {
            trace!(resource = %resource, "Ignoring rate limit for unknown resource");
            return false;
        }

        trace!(
            resource = %resource,
            limit = entry.limit,
            remaining = entry.remaining,
            reset_at = %entry.reset_at,
            "Observed rate limit"
        );
        self.entries.insert(resource.clone(), entry);
        true
    }

    /// Apply a full `application/rate_limit_status` payload.
    ///
    /// The payload groups resources by family under `resources`; the
    /// grouping is flattened. Returns how many entries were stored.
    pub fn bulk_observe(&self, status: &serde_json::Value) -> usize {
        let Some(families) = status.get("resources").and_then(|r| r.as_object()) else {
            return 0;
        };

        let mut stored = 0;
        for resources in families.values().filter_map(|f| f.as_object()) {
            for (key, value) in resources {
                let Some(entry) = RateLimitEntry::from_status(value) else {
                    continue;
                };
                if self.insert(&ResourceId::from_status_key(key), entry) {
                    stored += 1;
                }
            }
        }

        debug!(stored = stored, "Applied bulk rate limit status");
        stored
    }

    /// Hint whether a request to this resource would currently be refused.
    pub fn should_defer(&self, resource: &ResourceId) -> bool {
        self.should_defer_at(resource, Utc::now())
    }

    /// [`should_defer`](Self::should_defer) evaluated at a given instant.
    pub fn should_defer_at(&self, resource: &ResourceId, now: DateTime<Utc>) -> bool {
        self.entries
            .get(resource)
            .map(|entry| entry.is_exhausted_at(now))
            .unwrap_or(false)
    }

    /// Get the entry for a resource.
    pub fn get(&self, resource: &ResourceId) -> Option<RateLimitEntry> {
        self.entries.get(resource).map(|entry| *entry)
    }

    /// Copy of the whole table.
    pub fn snapshot(&self) -> HashMap<ResourceId, RateLimitEntry> {
        self.entries
            .iter()
            .map(|item| (item.key().clone(), *item.value()))
            .collect()
    }

    /// Get the number of tracked resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for RateLimitTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}
