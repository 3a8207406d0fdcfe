use std::time::Duration;
use reqwest::{Client, Proxy, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::error::{NetError, Result};
use crate::upstream::Upstream;

pub struct HttpClient {
    client: Client,
    config: Config,
}

impl HttpClient {
    pub fn new(config: Config) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.timeout_secs));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| NetError::Config(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
        } else {
            // only the configured proxy is honoured, never *_PROXY from the environment
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| NetError::Config(format!("Failed to build client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn direct() -> Result<Self> {
        Self::new(Config::default())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Sends the request, bounding the wait for response headers only
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        tokio::time::timeout(self.timeout(), request.send())
            .await
            .map_err(|_| NetError::Timeout)?
            .map_err(NetError::from)
    }

    /// Opens `url` for streaming. Non-2xx responses are failures.
    pub async fn fetch(&self, url: &str) -> Result<Upstream> {
        let response = self.send(self.client.get(url)).await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!("Upstream {} answered {}", url, status);
            return Err(NetError::Status(status.as_u16()));
        }
        Ok(Upstream::from_response(response))
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.send(self.client.get(url).timeout(self.timeout())).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).await?;
        response
            .json()
            .await
            .map_err(|e| NetError::Http(format!("JSON parse failed: {}", e)))
    }

    pub async fn post<T: Serialize>(&self, url: &str, body: &T) -> Result<Response> {
        self.send(self.client.post(url).json(body).timeout(self.timeout()))
            .await
    }
}
