//! Shared JSON-over-HTTPS client with retry and exponential backoff.
//!
//! Retry strategy:
//! - HTTP 429 or 5xx → retry with exponential backoff
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry

use std::time::Duration;

use anyhow::{bail, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::SourcesConfig;

pub(crate) struct JsonClient {
    http: reqwest::Client,
    max_retries: u32,
}

impl JsonClient {
    pub(crate) fn new(config: &SourcesConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            max_retries: config.max_retries,
        })
    }

    /// GET `url` and decode the JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        accept: Option<&str>,
        bearer: Option<&str>,
    ) -> Result<T> {
        let mut headers = HeaderMap::new();
        if let Some(accept) = accept {
            headers.insert(ACCEPT, HeaderValue::from_str(accept)?);
        }
        if let Some(token) = bearer {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .get(url)
                .headers(headers.clone())
                .query(query)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        debug!(url, attempt, "provider request succeeded");
                        return Ok(response.json::<T>().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(
                            url,
                            attempt,
                            status = status.as_u16(),
                            "provider request failed, retrying"
                        );
                        last_err = Some(anyhow::anyhow!(
                            "HTTP {} from {}: {}",
                            status,
                            url,
                            body_text
                        ));
                        continue;
                    }

                    bail!("HTTP {} from {}: {}", status, url, body_text);
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "provider request error, retrying");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("request to {} failed after retries", url)))
    }
}
