//! Background refresh of rate limits and remote configuration.
//!
//! Each job sends its request through the regular queue, waits for the
//! result, then sleeps for its interval before going again. A failed
//! refresh keeps the previous state and never stops the job.

use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::{Scheduler, Shared};
use super::request::{RequestOptions, RequestParams};
use crate::error::Result;
use crate::resource::Verb;

/// Endpoint reporting every rate limit at once.
pub const RATE_LIMIT_STATUS_PATH: &str = "application/rate_limit_status";
/// Endpoint serving the API's remote configuration.
pub const REMOTE_CONFIG_PATH: &str = "help/configuration";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RefreshKind {
    RateLimits,
    RemoteConfig,
}

impl RefreshKind {
    fn name(&self) -> &'static str {
        match self {
            RefreshKind::RateLimits => "rate_limits",
            RefreshKind::RemoteConfig => "remote_config",
        }
    }

    fn interval(&self, shared: &Shared) -> Duration {
        match self {
            RefreshKind::RateLimits => shared.config.rate_limit_refresh(),
            RefreshKind::RemoteConfig => shared.config.remote_config_refresh(),
        }
    }
}

impl Scheduler {
    /// Fetch the full rate-limit status and apply it to the table.
    ///
    /// Returns how many entries were stored.
    pub async fn refresh_rate_limits(&self) -> Result<usize> {
        let response = self
            .request(
                Verb::Get,
                RATE_LIMIT_STATUS_PATH,
                RequestParams::new(),
                RequestOptions::default(),
            )?
            .await?;

        Ok(self.shared.table.bulk_observe(&response.data))
    }

    /// Fetch the remote configuration and replace the stored copy.
    pub async fn refresh_remote_config(&self) -> Result<()> {
        let response = self
            .request(
                Verb::Get,
                REMOTE_CONFIG_PATH,
                RequestParams::new(),
                RequestOptions::default(),
            )?
            .await?;

        *self.shared.remote_config.write() = Some(response.data);
        Ok(())
    }

    async fn refresh(&self, kind: RefreshKind) -> Result<()> {
        match kind {
            RefreshKind::RateLimits => {
                let stored = self.refresh_rate_limits().await?;
                debug!(stored = stored, "Rate limits refreshed");
            }
            RefreshKind::RemoteConfig => {
                self.refresh_remote_config().await?;
                debug!("Remote configuration refreshed");
            }
        }
        Ok(())
    }
}

/// Spawn a job that refreshes now and then after every interval.
///
/// The job ends once the scheduler is dropped.
pub(super) fn spawn_refresh_job(shared: Weak<Shared>, kind: RefreshKind) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(job = kind.name(), "Refresh job started");

        loop {
            let Some(strong) = shared.upgrade() else {
                break;
            };
            let interval = kind.interval(&strong);
            let scheduler = Scheduler { shared: strong };

            if let Err(e) = scheduler.refresh(kind).await {
                warn!(job = kind.name(), error = %e, "Refresh failed, keeping previous state");
            }
            drop(scheduler);

            tokio::time::sleep(interval).await;
        }

        debug!(job = kind.name(), "Refresh job stopped");
    })
}
