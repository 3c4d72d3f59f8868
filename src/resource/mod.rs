//! Endpoint registry and URL-to-resource identification.

mod descriptor;
mod registry;

pub use descriptor::{DefaultLimits, ResourceDescriptor, ResourceId, Verb};
pub use registry::{ResourceRegistry, TWITTER_RESOURCES};
