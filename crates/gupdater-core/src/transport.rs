use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request to {url} failed: {details}")]
    Request { url: String, details: String },
    #[error("{url} responded with HTTP {status}{body_snippet}")]
    HttpStatus {
        url: String,
        status: u16,
        body_snippet: String,
    },
    #[error("failed to write response body from {url}: {source}")]
    Write {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    pub fn request(url: &str, details: impl std::fmt::Display) -> Self {
        Self::Request {
            url: url.to_string(),
            details: details.to_string(),
        }
    }
}

/// The two HTTP operations the update workflow needs from the network.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, TransportError>;

    /// Stream the response body of `url` into `dest`, returning the number of
    /// bytes written.
    async fn download_to(
        &self,
        url: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a transport with the updater's timeouts and user agent.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn with_defaults(updater_version: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .user_agent(format!("GeyserUpdater/{updater_version}"))
            .build()
            .map_err(TransportError::ClientBuild)?;
        Ok(Self::new(client))
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| TransportError::request(url, error))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(TransportError::HttpStatus {
                url: url.to_string(),
                status,
                body_snippet,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        self.send(url)
            .await?
            .text()
            .await
            .map_err(|error| TransportError::request(url, error))
    }

    async fn download_to(
        &self,
        url: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransportError> {
        let response = self.send(url).await?;
        let mut written: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| TransportError::request(url, error))?;
            dest.write_all(&chunk)
                .await
                .map_err(|source| TransportError::Write {
                    url: url.to_string(),
                    source,
                })?;
            written += chunk.len() as u64;
        }

        dest.flush().await.map_err(|source| TransportError::Write {
            url: url.to_string(),
            source,
        })?;

        Ok(written)
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}
