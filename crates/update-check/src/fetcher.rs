use crate::error::{Result, UpdateCheckError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, USER_AGENT};
use reqwest::{Client, Url};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Abstraction over retrieving published files from the build server.
#[async_trait]
pub trait BuildFetcher: Send + Sync {
    /// Fetch the full body at `url`. Non-success statuses are errors.
    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>>;

    /// Fetch `url` and decode it as UTF-8.
    async fn fetch_text(&self, url: &Url) -> Result<String> {
        let bytes = self.fetch_bytes(url).await?;
        String::from_utf8(bytes).map_err(|err| UpdateCheckError::MalformedResponse {
            url: url.to_string(),
            reason: format!("body is not valid UTF-8: {err}"),
        })
    }
}

/// Builder for [`HttpFetcher`].
#[derive(Default)]
pub struct HttpFetcherBuilder {
    client: Option<Client>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
}

impl HttpFetcherBuilder {
    /// Provide a custom reqwest client instance. Timeout and user agent
    /// settings are ignored when a client is supplied; `Cache-Control:
    /// no-cache` is still sent with every request.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the `User-Agent` sent with every request.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Per-request timeout. A timed out request is a fetch failure.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the fetcher.
    pub fn build(self) -> Result<HttpFetcher> {
        if let Some(client) = self.client {
            return Ok(HttpFetcher { client });
        }

        let mut headers = HeaderMap::new();
        if let Some(agent) = self.user_agent {
            let value = HeaderValue::from_str(&agent)
                .map_err(|err| UpdateCheckError::Config(format!("invalid user agent: {err}")))?;
            headers.insert(USER_AGENT, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(HttpFetcher { client })
    }
}

/// Plain HTTP(S) fetcher backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new builder.
    pub fn builder() -> HttpFetcherBuilder {
        HttpFetcherBuilder::default()
    }
}

#[async_trait]
impl BuildFetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
