use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::app::{Result, SluiceError};
use crate::config::FetcherConfig;
use crate::fetcher::Fetcher;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::from_config(&FetcherConfig::default())
    }

    pub fn from_config(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = url::Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SluiceError::Other(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        let response = self.client.get(parsed).send().await?;
        response.error_for_status_ref()?;

        let body = response.bytes().await?.to_vec();
        tracing::debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
