/// Talks to a running gateway over its JSON API
use linkgate_net::{Config as NetConfig, HttpClient, NetError, Response, Upstream};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SdkError};
use crate::licenses::{BindRequest, VerifyRequest, VerifyResponse};
use crate::links::{CreateLinkRequest, CreateLinkResponse, RevokeRequest};
use crate::locator::Locator;
use crate::logs::{LogEntry, LogsResponse};
use crate::wire::{ErrorResponse, SuccessResponse};

pub struct GatewayClient {
    base_url: String,
    http: HttpClient,
}

impl GatewayClient {
    pub fn new(base_url: &str, config: NetConfig) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: HttpClient::new(config)?,
        })
    }

    pub fn direct(base_url: &str) -> Result<Self> {
        Self::new(base_url, NetConfig::default())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: Serialize, R: DeserializeOwned>(&self, path: &str, body: &T) -> Result<R> {
        let response = self.http.post(&self.url(path), body).await?;
        decode(response).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let response = self.http.get(&self.url(path)).await?;
        decode(response).await
    }

    pub async fn create_link(&self, request: &CreateLinkRequest) -> Result<Locator> {
        let response: CreateLinkResponse = self.post("/create", request).await?;
        Locator::parse(&response.secure_link)
    }

    pub async fn bind(&self, request: &BindRequest) -> Result<bool> {
        let response: SuccessResponse = self.post("/bind", request).await?;
        Ok(response.success)
    }

    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse> {
        self.post("/mql5/verify", request).await
    }

    pub async fn revoke(&self, locator: &Locator) -> Result<bool> {
        let request = RevokeRequest {
            program_id: locator.program_id.clone(),
            account_login: locator.account_login.clone(),
            token_id: locator.token_id.clone(),
        };
        let response: SuccessResponse = self.post("/revoke", &request).await?;
        Ok(response.success)
    }

    pub async fn logs(&self, locator: &Locator) -> Result<Vec<LogEntry>> {
        let response: LogsResponse = self.get(&locator.logs_path()).await?;
        Ok(response.logs)
    }

    /// Redeems one use of the link and opens the resource for streaming
    pub async fn download(&self, locator: &Locator) -> Result<Upstream> {
        match self.http.fetch(&locator.to_url(&self.base_url)).await {
            Ok(upstream) => Ok(upstream),
            Err(NetError::Status(status)) => Err(SdkError::Gateway {
                status,
                message: describe_download_status(status).to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

async fn decode<R: DeserializeOwned>(response: Response) -> Result<R> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| SdkError::Serialization(e.to_string()));
    }

    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    Err(SdkError::Gateway {
        status: status.as_u16(),
        message,
    })
}

fn describe_download_status(status: u16) -> &'static str {
    match status {
        403 => "link expired, used up or revoked",
        404 => "link not found",
        502 => "upstream resource unavailable",
        503 => "gateway busy, retry shortly",
        _ => "download failed",
    }
}
