//! Birdcall - Rate-Limited Twitter REST Client
//!
//! This crate queues calls to the Twitter REST API and sends them in
//! batches, tracking the per-resource rate limits the API reports. Requests
//! refused with a 429 are retried on a later drain instead of failing.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod resource;
pub mod scheduler;
pub mod stream;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use client::{Client, ClientBuilder};
pub use error::{BirdcallError, Result};
