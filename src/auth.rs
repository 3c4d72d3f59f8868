//! Request authorization.
//!
//! User-context requests are signed by an [`Authenticator`] supplied by the
//! caller. App-only requests carry a bearer token, obtained once through
//! [`exchange_bearer_token`] before the scheduler dispatches anything else.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{error, info};
use url::form_urlencoded::byte_serialize;
use url::Url;

use crate::config::Credentials;
use crate::error::{BirdcallError, Result};
use crate::resource::Verb;
use crate::transport::{Transport, TransportRequest};

/// Decorates a prepared request with credentials.
///
/// Called on every dispatch attempt, so signatures relying on a nonce or
/// timestamp are fresh for each retry.
pub trait Authenticator: Send + Sync {
    fn authorize(&self, request: &mut TransportRequest) -> Result<()>;
}

/// Sends requests without credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn authorize(&self, _request: &mut TransportRequest) -> Result<()> {
        Ok(())
    }
}

/// App-only authorization with a bearer token.
#[derive(Clone)]
pub struct BearerAuth {
    header: HeaderValue,
}

impl BearerAuth {
    pub fn new(token: &str) -> Result<Self> {
        let mut header = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| BirdcallError::Credential("bearer token is not a valid header".into()))?;
        header.set_sensitive(true);
        Ok(Self { header })
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}

impl Authenticator for BearerAuth {
    fn authorize(&self, request: &mut TransportRequest) -> Result<()> {
        request.headers.insert(AUTHORIZATION, self.header.clone());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

/// Exchange consumer credentials for an app-only bearer token.
///
/// Sends the consumer key and secret as HTTP Basic credentials with a
/// `client_credentials` grant. This call bypasses the request queue; any
/// failure is a [`BirdcallError::Credential`].
pub async fn exchange_bearer_token(
    transport: &dyn Transport,
    endpoint: &Url,
    credentials: &Credentials,
    default_headers: &HeaderMap,
) -> Result<BearerAuth> {
    let (Some(key), Some(secret)) = (&credentials.consumer_key, &credentials.consumer_secret)
    else {
        return Err(BirdcallError::Credential(
            "consumer_key and consumer_secret are required for app-only auth".into(),
        ));
    };

    let basic = STANDARD.encode(format!("{}:{}", form_encode(key), form_encode(secret)));

    let mut headers = default_headers.clone();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Basic {}", basic))
            .map_err(|_| BirdcallError::Credential("consumer credentials are not valid".into()))?,
    );
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded;charset=UTF-8"),
    );

    let request = TransportRequest {
        verb: Verb::Post,
        url: endpoint.clone(),
        headers,
        query: Vec::new(),
        body: Some("grant_type=client_credentials".to_string()),
    };

    info!(endpoint = %endpoint, "Exchanging consumer credentials for a bearer token");

    let response = transport.send(request).await.map_err(|e| {
        error!(error = %e, "Bearer token exchange failed");
        BirdcallError::Credential(format!("token exchange failed: {}", e))
    })?;

    if !response.is_success() {
        error!(status = response.status, "Bearer token exchange rejected");
        return Err(BirdcallError::Credential(format!(
            "token exchange rejected with status {}: {}",
            response.status,
            response.text()
        )));
    }

    let token: TokenResponse = serde_json::from_slice(&response.body)
        .map_err(|e| BirdcallError::Credential(format!("unreadable token response: {}", e)))?;

    if !token.token_type.eq_ignore_ascii_case("bearer") {
        return Err(BirdcallError::Credential(format!(
            "unexpected token type {}",
            token.token_type
        )));
    }

    info!("Bearer token obtained");
    BearerAuth::new(&token.access_token)
}

fn form_encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}
