//! The compiled-in registry of known Twitter REST v1.1 endpoints.
//!
//! Order matters: identification walks the list front to back and the
//! first matching descriptor wins.

use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::trace;

use super::descriptor::{DefaultLimits, ResourceDescriptor, ResourceId, Verb};

const fn limited(user: u32, app: u32) -> Option<DefaultLimits> {
    Some(DefaultLimits { user, app })
}

const UNLIMITED: Option<DefaultLimits> = None;

/// Every endpoint the scheduler tracks, in matching order.
pub static TWITTER_RESOURCES: &[ResourceDescriptor] = &[
    // Timelines and tweets
    ResourceDescriptor::get("statuses/mentions_timeline", limited(15, 0)),
    ResourceDescriptor::get("statuses/user_timeline", limited(180, 300)),
    ResourceDescriptor::get("statuses/home_timeline", limited(15, 0)),
    ResourceDescriptor::get("statuses/retweets_of_me", limited(15, 0)),
    ResourceDescriptor::get("statuses/retweets/:id", limited(15, 60)),
    ResourceDescriptor::get("statuses/show/:id", limited(180, 180)),
    ResourceDescriptor::post("statuses/destroy/:id", UNLIMITED),
    ResourceDescriptor::post("statuses/update", UNLIMITED),
    ResourceDescriptor::post("statuses/retweet/:id", UNLIMITED),
    ResourceDescriptor::post("statuses/update_with_media", UNLIMITED),
    ResourceDescriptor::get("statuses/oembed", limited(180, 180)),
    // Search
    ResourceDescriptor::get("search/tweets", limited(180, 450)),
    // Direct messages
    ResourceDescriptor::get("direct_messages", limited(15, 0)),
    ResourceDescriptor::get("direct_messages/sent", limited(15, 0)),
    ResourceDescriptor::get("direct_messages/show", limited(15, 0)),
    ResourceDescriptor::post("direct_messages/destroy", UNLIMITED),
    ResourceDescriptor::post("direct_messages/new", UNLIMITED),
    // Friends and followers
    ResourceDescriptor::get("friendships/no_retweets/ids", limited(15, 0)),
    ResourceDescriptor::get("friends/ids", limited(15, 15)),
    ResourceDescriptor::get("followers/ids", limited(15, 15)),
    ResourceDescriptor::get("friendships/lookup", limited(15, 0)),
    ResourceDescriptor::get("friendships/incoming", limited(15, 0)),
    ResourceDescriptor::get("friendships/outgoing", limited(15, 0)),
    ResourceDescriptor::post("friendships/create", UNLIMITED),
    ResourceDescriptor::post("friendships/destroy", UNLIMITED),
    ResourceDescriptor::post("friendships/update", UNLIMITED),
    ResourceDescriptor::get("friendships/show", limited(180, 15)),
    ResourceDescriptor::get("friends/list", limited(15, 30)),
    ResourceDescriptor::get("followers/list", limited(15, 30)),
    // Account
    ResourceDescriptor::get("account/settings", limited(15, 0)),
    ResourceDescriptor::get("account/verify_credentials", limited(15, 0)),
    ResourceDescriptor::post("account/settings", UNLIMITED),
    ResourceDescriptor::post("account/update_delivery_device", limited(0, 0)),
    ResourceDescriptor::post("account/update_profile", limited(0, 0)),
    ResourceDescriptor::post("account/update_profile_background_image", limited(0, 0)),
    ResourceDescriptor::post("account/update_profile_colors", limited(0, 0)),
    ResourceDescriptor::post("account/update_profile_image", limited(0, 0)),
    // Blocks
    ResourceDescriptor::get("blocks/list", limited(15, 0)),
    ResourceDescriptor::get("blocks/ids", limited(15, 0)),
    ResourceDescriptor::post("blocks/create", limited(0, 0)),
    ResourceDescriptor::post("blocks/destroy", limited(0, 0)),
    // Users
    ResourceDescriptor::get("users/lookup", limited(180, 60)),
    ResourceDescriptor::get("users/show", limited(180, 180)),
    ResourceDescriptor::get("users/search", limited(180, 0)),
    ResourceDescriptor::get("users/contributees", limited(15, 0)),
    ResourceDescriptor::get("users/contributors", limited(15, 0)),
    ResourceDescriptor::post("account/remove_profile_banner", UNLIMITED),
    ResourceDescriptor::post("account/update_profile_banner", UNLIMITED),
    ResourceDescriptor::get("users/profile_banner", limited(180, 0)),
    // Suggested users
    ResourceDescriptor::get("users/suggestions/:slug", limited(15, 15)),
    ResourceDescriptor::get("users/suggestions", limited(15, 15)),
    ResourceDescriptor::get("users/suggestions/:slug/members", limited(15, 15)),
    // Favorites
    ResourceDescriptor::get("favorites/list", limited(15, 15)),
    ResourceDescriptor::post("favorites/destroy", limited(0, 0)),
    ResourceDescriptor::post("favorites/create", UNLIMITED),
    ResourceDescriptor::get("favorites/:id", limited(0, 0)),
    // Lists
    ResourceDescriptor::get("lists/list", limited(15, 15)),
    ResourceDescriptor::get("lists/statuses", limited(180, 180)),
    ResourceDescriptor::post("lists/members/destroy", limited(0, 0)),
    ResourceDescriptor::get("lists/memberships", limited(15, 15)),
    ResourceDescriptor::get("lists/subscribers", limited(180, 15)),
    ResourceDescriptor::post("lists/subscribers/create", limited(0, 0)),
    ResourceDescriptor::get("lists/subscribers/show", limited(15, 15)),
    ResourceDescriptor::post("lists/subscribers/destroy", limited(0, 0)),
    ResourceDescriptor::post("lists/members/create_all", limited(0, 0)),
    ResourceDescriptor::get("lists/members/show", limited(15, 15)),
    ResourceDescriptor::get("lists/members", limited(180, 15)),
    ResourceDescriptor::post("lists/members/create", limited(0, 0)),
    ResourceDescriptor::post("lists/destroy", limited(0, 0)),
    ResourceDescriptor::post("lists/update", limited(0, 0)),
    ResourceDescriptor::post("lists/create", limited(0, 0)),
    ResourceDescriptor::get("lists/show", limited(15, 15)),
    ResourceDescriptor::get("lists/subscriptions", limited(15, 15)),
    ResourceDescriptor::post("lists/members/destroy_all", limited(0, 0)),
    // Saved searches
    ResourceDescriptor::get("saved_searches/list", limited(15, 0)),
    ResourceDescriptor::get("saved_searches/show/:id", limited(15, 0)),
    ResourceDescriptor::post("saved_searches/create", UNLIMITED),
    ResourceDescriptor::post("saved_searches/destroy/:id", limited(0, 0)),
    // Places and geo
    ResourceDescriptor::get("geo/id/:place_id", limited(15, 0)),
    ResourceDescriptor::get("geo/reverse_geocode", limited(15, 0)),
    ResourceDescriptor::get("geo/search", limited(15, 0)),
    ResourceDescriptor::get("geo/similar_places", limited(15, 0)),
    ResourceDescriptor::post("geo/place", limited(0, 0)),
    // Trends
    ResourceDescriptor::get("trends/place", limited(15, 15)),
    ResourceDescriptor::get("trends/available", limited(15, 15)),
    ResourceDescriptor::get("trends/closest", limited(15, 15)),
    // Spam reporting
    ResourceDescriptor::post("users/report_spam", limited(0, 0)),
    // OAuth
    ResourceDescriptor::get("oauth/authenticate", UNLIMITED),
    ResourceDescriptor::get("oauth/authorize", UNLIMITED),
    ResourceDescriptor::post("oauth/access_token", UNLIMITED),
    ResourceDescriptor::post("oauth/request_token", UNLIMITED),
    ResourceDescriptor::post("oauth2/token", UNLIMITED),
    ResourceDescriptor::post("oauth2/invalidate_token", UNLIMITED),
    // Help
    ResourceDescriptor::get("help/configuration", limited(15, 15)),
    ResourceDescriptor::get("help/languages", limited(15, 15)),
    ResourceDescriptor::get("help/privacy", limited(15, 15)),
    ResourceDescriptor::get("help/tos", limited(15, 15)),
    ResourceDescriptor::get("application/rate_limit_status", limited(180, 180)),
];

/// An ordered, immutable set of resource descriptors.
#[derive(Debug)]
pub struct ResourceRegistry {
    descriptors: Vec<ResourceDescriptor>,
    ids: HashSet<ResourceId>,
}

impl ResourceRegistry {
    /// Create a registry from descriptors, keeping their order.
    pub fn new(descriptors: Vec<ResourceDescriptor>) -> Self {
        let ids = descriptors.iter().map(ResourceDescriptor::id).collect();
        Self { descriptors, ids }
    }

    /// The shared Twitter v1.1 registry, built on first use.
    pub fn twitter() -> &'static ResourceRegistry {
        static REGISTRY: OnceLock<ResourceRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| ResourceRegistry::new(TWITTER_RESOURCES.to_vec()))
    }

    /// Identify the resource a relative URL belongs to.
    ///
    /// Accepts paths with or without a leading slash, a `.json` suffix or a
    /// query string. The first descriptor with the same verb whose pattern
    /// matches wins, regardless of how specific later patterns are.
    pub fn identify(&self, url: &str, verb: Verb) -> Option<ResourceId> {
        let path = canonical_path(url);

        let found = self
            .descriptors
            .iter()
            .filter(|d| d.verb == verb)
            .find(|d| d.matches_path(path))
            .map(ResourceDescriptor::id);

        trace!(url = %url, verb = %verb, resource = ?found, "Identified resource");
        found
    }

    /// Check whether an id belongs to this registry.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.ids.contains(id)
    }

    /// Look up the descriptor for an id.
    pub fn descriptor(&self, id: &ResourceId) -> Option<&ResourceDescriptor> {
        if !self.contains(id) {
            return None;
        }
        self.descriptors.iter().find(|d| &d.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Strip the leading slash, query string and file extension from a path.
fn canonical_path(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_start_matches('/');

    let last_segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[last_segment_start..].rfind('.') {
        Some(dot) => &path[..last_segment_start + dot],
        None => path,
    }
}
