//! Classification of transport outcomes.

use reqwest::header::HeaderMap;
use serde_json::Value;

use super::request::ApiResponse;
use crate::error::{ApiErrorDetail, BirdcallError, HttpError, RemoteError};
use crate::ratelimit::RateLimitEntry;
use crate::transport::{TransportError, TransportResponse};

/// What should happen to a request after one attempt.
#[derive(Debug)]
pub(crate) enum Verdict {
    /// Terminal success
    Success(ApiResponse),
    /// The server refused with 429; the request goes back in the queue
    RateLimited(HeaderMap),
    /// Terminal failure
    Failed(BirdcallError),
}

/// Classify the outcome of a single attempt.
///
/// Streamed responses skip body parsing since their body already went to
/// the sink.
pub(crate) fn triage(
    outcome: Result<TransportResponse, TransportError>,
    streamed: bool,
) -> Verdict {
    let response = match outcome {
        Ok(response) => response,
        Err(e) => return Verdict::Failed(BirdcallError::Transport(e)),
    };

    if response.is_rate_limited() {
        return Verdict::RateLimited(response.headers);
    }

    if !response.is_success() {
        return Verdict::Failed(BirdcallError::Http(HttpError {
            status: response.status,
            body: response.text(),
        }));
    }

    let rate_limit = RateLimitEntry::from_headers(&response.headers);

    if streamed {
        return Verdict::Success(ApiResponse {
            status: response.status,
            headers: response.headers,
            data: Value::Null,
            body: response.body,
            rate_limit,
        });
    }

    let data: Value = match serde_json::from_slice(&response.body) {
        Ok(data) => data,
        Err(e) => return Verdict::Failed(RemoteError::MalformedBody(e).into()),
    };

    if let Some(errors) = error_list(&data) {
        return Verdict::Failed(match serde_json::from_value::<Vec<ApiErrorDetail>>(errors) {
            Ok(details) => RemoteError::Api(details).into(),
            Err(e) => RemoteError::MalformedBody(e).into(),
        });
    }

    Verdict::Success(ApiResponse {
        status: response.status,
        headers: response.headers,
        data,
        body: response.body,
        rate_limit,
    })
}

/// The `errors` array of a response body, if present and non-empty.
fn error_list(data: &Value) -> Option<Value> {
    match data.get("errors") {
        Some(Value::Array(errors)) if !errors.is_empty() => Some(Value::Array(errors.clone())),
        _ => None,
    }
}
