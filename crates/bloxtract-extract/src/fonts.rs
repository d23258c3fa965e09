//! Font asset resolution.
//!
//! Font-list documents reference faces by `rbxassetid://` ids; the bytes
//! live on the asset delivery CDN. The resolver fetches one face per call
//! with a per-face retry budget (network errors and non-200 responses both
//! consume a retry) and a 30-second per-attempt timeout.

use std::time::Duration;

use crate::cancel::CancelToken;
use crate::retry::RetryPolicy;
use crate::{ExtractError, Result, USER_AGENT};

/// Per-attempt request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the font asset delivery endpoint.
#[derive(Debug, Clone)]
pub struct FontResolver {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl FontResolver {
    /// Resolver against `endpoint` (`{endpoint}?id={N}`).
    pub fn new(endpoint: impl Into<String>, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            retry,
        })
    }

    /// The endpoint this resolver fetches from.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Download the TTF bytes for one numeric asset id.
    pub async fn fetch_face(&self, asset_id: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
        let url = format!("{}?id={}", self.endpoint, asset_id);
        self.retry
            .execute(cancel, || {
                let client = self.client.clone();
                let url = url.clone();
                async move {
                    let response = client.get(&url).send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(ExtractError::HttpStatus(status.as_u16()));
                    }
                    Ok(response.bytes().await?.to_vec())
                }
            })
            .await
    }
}
