use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client};
use url::Url;

/// Fetches the body returned by the drawing endpoint for one request.
#[async_trait]
pub trait DrawingTransport: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

#[derive(Clone, Default)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DrawingTransport for HttpTransport {
    async fn fetch(&self, url: &Url) -> Result<String> {
        self.http
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("request to {url} was rejected"))?
            .text()
            .await
            .context("failed to read response body")
    }
}

pub struct MissingTransport;

#[async_trait]
impl DrawingTransport for MissingTransport {
    async fn fetch(&self, _url: &Url) -> Result<String> {
        Err(anyhow!("drawing transport is unavailable"))
    }
}
