use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, ConnectInfo, DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use linkgate_net::HttpClient;
use linkgate_sdk::licenses::{BindRequest, VerifyRequest, VerifyResponse};
use linkgate_sdk::links::{CreateLinkRequest, CreateLinkResponse, RevokeRequest};
use linkgate_sdk::logs::LogsResponse;
use linkgate_sdk::wire::SuccessResponse;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::access_log::AccessLog;
use crate::bindings::BindingService;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::links::LinkService;
use crate::store::{RecordStore, StoreTimeouts};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub struct GatewayState {
    pub config: GatewayConfig,
    pub links: Arc<LinkService>,
    pub bindings: BindingService,
    pub access_log: AccessLog,
    /// Fetches link targets, optionally through `UPSTREAM_PROXY`
    pub upstream: HttpClient,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let timeouts = StoreTimeouts {
            lock: config.lock_timeout,
            io: config.io_timeout,
        };
        let data_dir = config.data_dir.as_path();

        let links = Arc::new(LinkService::new(
            RecordStore::open(data_dir, "tokens", timeouts),
            config.tombstone_retention,
        ));
        let bindings = BindingService::new(RecordStore::open(data_dir, "bindings", timeouts));
        let access_log = AccessLog::new(RecordStore::open(data_dir, "logs", timeouts));
        let upstream = HttpClient::new(config.upstream.clone())?;

        info!("Data directory: {}", config.data_dir.display());
        if let Some(proxy) = &config.upstream.proxy_url {
            info!("Upstream fetches routed through {}", proxy);
        }

        Ok(Self {
            config,
            links,
            bindings,
            access_log,
            upstream,
        })
    }
}

/// All routes plus the shared middleware. Rate limiting is added by `run`.
pub fn router(state: Arc<GatewayState>) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/create", post(create_link))
        .route("/bind", post(bind_license))
        .route("/revoke", post(revoke_link))
        .route("/mql5/verify", post(verify_license))
        .route("/logs/:program_id/:account_login/:token_id", get(list_logs))
        // Delivery link itself; static prefixes above win over these captures
        .route("/:program_id/:account_login/:token_id", get(download))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .with_state(state)
}

/// A panicking handler still answers with the usual JSON error body.
fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    GatewayError::Internal("handler panicked".to_string()).into_response()
}

pub async fn run(state: Arc<GatewayState>) -> anyhow::Result<()> {
    let per_second = state.config.rate_limit_per_second;
    let burst = state.config.rate_limit_burst;

    // SmartIpKeyExtractor honours X-Forwarded-For and friends, then falls back to the peer
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(per_second)
        .burst_size(burst)
        .key_extractor(tower_governor::key_extractor::SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit: {}/s, burst {}", per_second, burst))?;

    let app = router(state.clone()).layer(GovernorLayer {
        config: Arc::new(governor_conf),
    });

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Gateway listening on {} (public URL {}, rate limited: {} req/s per IP, burst {})",
        addr, state.config.public_url, per_second, burst
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn create_link(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<CreateLinkRequest>, JsonRejection>,
) -> Result<Json<CreateLinkResponse>> {
    let Json(req) = payload?;
    let issued = state
        .links
        .create(
            &req.target,
            &req.program_id,
            req.expiry_time_in_mins,
            req.max_link_use,
            &req.account_login,
        )
        .await?;

    Ok(Json(CreateLinkResponse {
        secure_link: issued.locator.to_url(&state.config.public_url),
    }))
}

async fn bind_license(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<BindRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>> {
    let Json(req) = payload?;
    state
        .bindings
        .bind(&req.program_id, &req.account_login, req.days, req.is_demo)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn verify_license(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>> {
    let Json(req) = payload?;
    let verdict = state
        .bindings
        .verify(&req.program_id, &req.account_login)
        .await?;
    Ok(Json(verdict))
}

async fn revoke_link(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>> {
    let Json(req) = payload?;
    state
        .links
        .revoke(&req.program_id, &req.account_login, &req.token_id)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn list_logs(
    State(state): State<Arc<GatewayState>>,
    Path((program_id, account_login, token_id)): Path<(String, String, String)>,
) -> Result<Json<LogsResponse>> {
    let logs = state
        .access_log
        .list(&program_id, &account_login, &token_id)
        .await?;
    Ok(Json(LogsResponse { logs }))
}

/// Redeems one use, records who asked, then streams the target back.
async fn download(
    State(state): State<Arc<GatewayState>>,
    Path((program_id, account_login, token_id)): Path<(String, String, String)>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Response> {
    let redemption = state
        .links
        .redeem(&program_id, &account_login, &token_id)
        .await?;

    let peer = peer.map(|ConnectInfo(addr)| addr);
    let mut fields = Map::new();
    fields.insert("ip".into(), json!(client_ip(&headers, peer)));
    fields.insert("userAgent".into(), json!(user_agent(&headers)));
    state
        .access_log
        .append(
            &redemption.owner_program,
            &redemption.owner_account,
            &redemption.token_id,
            fields,
        )
        .await?;

    let upstream = state.upstream.fetch(&redemption.target).await?;
    debug!(
        "Streaming upstream {} ({}, {:?} bytes)",
        upstream.status,
        upstream.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
        upstream.content_length
    );

    let content_type = upstream
        .content_type
        .clone()
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    let mut builder = axum::http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                attachment_name(&redemption.target)
            ),
        );
    if let Some(length) = upstream.content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    builder
        .body(Body::from_stream(upstream.body))
        .map_err(|e| GatewayError::Internal(format!("Failed to build download response: {}", e)))
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    header_value("x-forwarded-for")
        .or_else(|| header_value("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn user_agent(headers: &HeaderMap) -> Value {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| Value::String(ua.to_string()))
        .unwrap_or(Value::Null)
}

/// Last path segment of the target, reduced to characters safe inside a quoted header value.
fn attachment_name(target: &str) -> String {
    let without_query = target.split(['?', '#']).next().unwrap_or_default();
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
        None => without_query,
    };

    let name: String = path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        "download".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_attachment_name() {
        assert_eq!(
            attachment_name("https://cdn.example.com/files/report.pdf"),
            "report.pdf"
        );
        assert_eq!(
            attachment_name("https://cdn.example.com/files/ea%20v2.ex5?sig=abc#top"),
            "ea20v2.ex5"
        );
        assert_eq!(attachment_name("https://cdn.example.com/dir/"), "dir");
        assert_eq!(attachment_name("https://cdn.example.com"), "download");
        assert_eq!(attachment_name("https://cdn.example.com/.."), "download");
        assert_eq!(attachment_name("https://x/a\"b;c.zip"), "abc.zip");
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "192.0.2.9:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), "192.0.2.9");
        assert_eq!(client_ip(&headers, None), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(client_ip(&headers, Some(peer)), "198.51.100.7");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.1");
    }

    #[tokio::test]
    async fn test_panic_answers_with_json_error() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "internal server error");
    }

    #[test]
    fn test_user_agent_missing_is_null() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_agent(&headers), Value::Null);
        headers.insert(header::USER_AGENT, HeaderValue::from_static("MetaTrader 5"));
        assert_eq!(user_agent(&headers), json!("MetaTrader 5"));
    }
}
