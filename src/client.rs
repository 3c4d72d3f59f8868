//! High-level client.

use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::auth::{exchange_bearer_token, Authenticator, BearerAuth};
use crate::config::BirdcallConfig;
use crate::error::{BirdcallError, Result};
use crate::resource::Verb;
use crate::scheduler::{header_map, ApiResponse, RequestOptions, RequestParams, Scheduler};
use crate::stream::StreamApi;
use crate::transport::{HttpTransport, Transport};

/// Builder for [`Client`].
pub struct ClientBuilder {
    config: BirdcallConfig,
    transport: Option<Arc<dyn Transport>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    start: bool,
}

impl ClientBuilder {
    /// Use a custom transport instead of the default HTTP one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sign user-context requests with this authenticator.
    ///
    /// Required unless `application_only` is set.
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Do not spawn the drain loop or refresh jobs.
    /// Pending requests are then only sent through [`Scheduler::drain_now`].
    pub fn paused(mut self) -> Self {
        self.start = false;
        self
    }

    /// Resolve credentials and start the scheduler.
    ///
    /// In app-only mode without a configured bearer token, the token
    /// exchange happens here, before anything else is sent. Its failure is
    /// returned and no scheduler is started.
    pub async fn build(self) -> Result<Client> {
        let config = self.config;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };

        let authenticator: Arc<dyn Authenticator> = match self.authenticator {
            Some(authenticator) => authenticator,
            None if config.application_only => {
                Arc::new(bearer_auth(&config, transport.as_ref()).await?)
            }
            None => {
                return Err(BirdcallError::Credential(
                    "user-context requests need an authenticator".into(),
                ))
            }
        };

        let scheduler = Scheduler::new(&config, transport, authenticator)?;
        if self.start {
            scheduler.start();
        }

        info!(
            rest_base = %config.urls.rest_base,
            application_only = config.application_only,
            "Client ready"
        );

        Ok(Client {
            config: Arc::new(config),
            scheduler,
        })
    }
}

async fn bearer_auth(config: &BirdcallConfig, transport: &dyn Transport) -> Result<BearerAuth> {
    if let Some(token) = &config.credentials.bearer_token {
        return BearerAuth::new(token);
    }

    let endpoint = Url::parse(&config.urls.app_auth).map_err(|e| {
        BirdcallError::Config(format!("invalid app_auth {}: {}", config.urls.app_auth, e))
    })?;
    exchange_bearer_token(
        transport,
        &endpoint,
        &config.credentials,
        &header_map(&config.headers)?,
    )
    .await
}

/// Client for the Twitter REST API.
///
/// Every request goes through the rate-limited [`Scheduler`].
#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<BirdcallConfig>,
    scheduler: Scheduler,
}

impl Client {
    pub fn builder(config: BirdcallConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            transport: None,
            authenticator: None,
            start: true,
        }
    }

    /// GET a resource.
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<ApiResponse> {
        let params = query
            .iter()
            .fold(RequestParams::new(), |params, (k, v)| params.query(*k, *v));
        self.scheduler
            .request(Verb::Get, url, params, RequestOptions::default())?
            .await
    }

    /// POST a raw body, form-encoded unless `content_type` says otherwise.
    pub async fn post(
        &self,
        url: &str,
        content: impl Into<String>,
        content_type: Option<&str>,
    ) -> Result<ApiResponse> {
        let mut params = RequestParams::new().content(content);
        if let Some(content_type) = content_type {
            params = params.content_type(content_type);
        }
        self.scheduler
            .request(Verb::Post, url, params, RequestOptions::default())?
            .await
    }

    /// The underlying scheduler, for full control over requests.
    pub fn rest(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn stream(&self) -> StreamApi<'_> {
        StreamApi::new(&self.scheduler)
    }

    /// The effective configuration.
    pub fn options(&self) -> &BirdcallConfig {
        &self.config
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
