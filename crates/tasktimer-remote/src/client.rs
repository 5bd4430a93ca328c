//! Remote authority client

use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;

use crate::auth::RemoteAuth;
use crate::error::{Error, Result};
use crate::types::SyncPayload;

/// The system timer state is reconciled with.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Idempotently record the current state of one timer.
    async fn push(&self, task_id: &str, payload: &SyncPayload) -> Result<()>;
}

/// Pushes timer state with `PUT {base_url}/timers/{task_id}`.
pub struct HttpAuthority {
    client: reqwest::Client,
    base_url: Url,
    auth: RemoteAuth,
}

impl HttpAuthority {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| Error::InvalidUrl(format!("{}: {}", base_url, e)))?;

        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!(
                "{}: expected an http(s) base URL",
                base_url
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            auth: RemoteAuth::None,
        })
    }

    pub fn with_auth(mut self, auth: RemoteAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn timer_url(&self, task_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("timers")
            .push(task_id);
        Ok(url)
    }
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn push(&self, task_id: &str, payload: &SyncPayload) -> Result<()> {
        let url = self.timer_url(task_id)?;
        tracing::debug!("Pushing timer {} to {}", task_id, url);

        let mut request = self.client.put(url).json(payload);
        if let Some(header) = self.auth.to_header() {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Api {
            status: status.as_u16(),
            body,
        })
    }
}
