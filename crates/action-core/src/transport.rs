use std::time::Duration;

use async_trait::async_trait;

use crate::config::DispatcherConfig;
use crate::record::{truncate_chars, ActionPayload};
use crate::{ActionError, Result};

/// Path of the action-recording endpoint, relative to the API root.
pub const ACTION_PATH: &str = "/patient/action";

const ERROR_BODY_MAX_CHARS: usize = 512;

/// Delivers one action payload to the backend.
///
/// Implementations report any non-success outcome as `Err`. The dispatcher
/// never retries; it logs the error and moves on.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn post_action(&self, payload: &ActionPayload) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// `POST {api_root}/patient/action` over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(api_root: &str) -> Result<Self> {
        Self::with_client(api_root, reqwest::Client::builder().build()?)
    }

    pub fn with_client(api_root: &str, client: reqwest::Client) -> Result<Self> {
        let root = api_root.trim().trim_end_matches('/');
        if root.is_empty() {
            return Err(ActionError::Config("api_root is empty".into()));
        }
        Ok(HttpTransport {
            client,
            url: format!("{root}{ACTION_PATH}"),
            auth_token: None,
        })
    }

    /// Build a transport from config. The relay timeout is not applied here;
    /// the dispatcher enforces it around every transport.
    pub fn from_config(config: &DispatcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        let mut transport = Self::with_client(&config.api_root, client)?;
        transport.auth_token = config.auth_token.clone().filter(|t| !t.is_empty());
        Ok(transport)
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ActionTransport for HttpTransport {
    async fn post_action(&self, payload: &ActionPayload) -> Result<()> {
        let mut req = self.client.post(&self.url).json(payload);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(ActionError::Status {
            status: status.as_u16(),
            body: truncate_chars(&body, ERROR_BODY_MAX_CHARS),
        })
    }
}

/// Run `fut` under an optional deadline, mapping expiry to [`ActionError::Timeout`].
pub(crate) async fn with_deadline<F>(timeout: Option<Duration>, fut: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    match timeout {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(ActionError::Timeout(limit))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
