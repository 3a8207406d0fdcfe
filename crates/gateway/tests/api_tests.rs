use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::header, routing::get, Router};
use gateway::{router, GatewayConfig, GatewayState};
use linkgate_sdk::licenses::VerifyResponse;
use linkgate_sdk::links::CreateLinkRequest;
use linkgate_sdk::{GatewayClient, Locator, SdkError};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

const REPORT: &str = "%PDF-1.7 fake";

struct TestGateway {
    base: String,
    upstream: String,
    state: Arc<GatewayState>,
    http: reqwest::Client,
    _data: TempDir,
}

impl TestGateway {
    async fn start() -> Self {
        let upstream = spawn_upstream().await;
        let data = tempfile::tempdir().unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let mut config = GatewayConfig::with_data_dir(data.path());
        config.public_url = base.clone();
        let state = Arc::new(GatewayState::new(config).unwrap());

        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            base,
            upstream,
            state,
            http: reqwest::Client::builder().no_proxy().build().unwrap(),
            _data: data,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.http.post(self.url(path)).json(&body).send().await.unwrap()
    }

    async fn create(&self, target_path: &str, max_uses: i64) -> String {
        let response = self
            .post(
                "/create",
                json!({
                    "target": format!("{}{}", self.upstream, target_path),
                    "programID": "ea-1",
                    "expiryTimeInMins": 60,
                    "maxLinkUse": max_uses,
                    "accountLogin": "12345",
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        body["secureLink"].as_str().unwrap().to_string()
    }
}

async fn spawn_upstream() -> String {
    let app = Router::new().route(
        "/files/report.pdf",
        get(|| async { ([(header::CONTENT_TYPE, "application/pdf")], REPORT) }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

async fn error_message(response: reqwest::Response) -> String {
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    body["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_version() {
    let gw = TestGateway::start().await;
    let body: Value = gw
        .http
        .get(gw.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn create_download_and_list_logs() {
    let gw = TestGateway::start().await;
    let link = gw.create("/files/report.pdf", 1).await;
    assert!(link.starts_with(&format!("{}/ea-1/12345/", gw.base)), "{}", link);

    let response = gw
        .http
        .get(&link)
        .header(header::USER_AGENT, "MetaTrader 5")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(headers[header::CONTENT_LENGTH], "13");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment"), "{}", disposition);
    assert!(disposition.contains("report.pdf"), "{}", disposition);
    assert_eq!(response.text().await.unwrap(), REPORT);

    let locator = Locator::parse(&link).unwrap();
    let logs: Value = gw
        .http
        .get(gw.url(&locator.logs_path()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let logs = logs["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["ip"], "127.0.0.1");
    assert_eq!(logs[0]["userAgent"], "MetaTrader 5");
    assert!(logs[0]["timestamp"].is_string());

    // single-use link is spent
    let again = gw.http.get(&link).send().await.unwrap();
    assert_eq!(again.status(), StatusCode::FORBIDDEN);
    assert!(error_message(again).await.contains("limit"));
}

#[tokio::test]
async fn forwarded_address_is_logged() {
    let gw = TestGateway::start().await;
    let link = gw.create("/files/report.pdf", 2).await;

    let response = gw
        .http
        .get(&link)
        .header("x-forwarded-for", "203.0.113.5, 10.0.0.1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let locator = Locator::parse(&link).unwrap();
    let logs = gw
        .state
        .access_log
        .list(&locator.program_id, &locator.account_login, &locator.token_id)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].field("ip"), Some("203.0.113.5"));
}

#[tokio::test]
async fn create_accepts_numeric_identifiers() {
    let gw = TestGateway::start().await;
    let response = gw
        .post(
            "/create",
            json!({
                "target": "https://cdn.example.com/ea.ex5",
                "programID": 7,
                "expiryTimeInMins": 0.5,
                "maxLinkUse": 3,
                "accountLogin": 5550123,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let locator = Locator::parse(body["secureLink"].as_str().unwrap()).unwrap();
    assert_eq!(locator.program_id, "7");
    assert_eq!(locator.account_login, "5550123");
    assert_eq!(locator.token_id.len(), 64);
}

#[tokio::test]
async fn create_rejects_bad_requests() {
    let gw = TestGateway::start().await;

    let missing = gw
        .post("/create", json!({ "target": "https://x", "programID": "p" }))
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let zero_uses = gw
        .post(
            "/create",
            json!({
                "target": "https://x",
                "programID": "p",
                "expiryTimeInMins": 10,
                "maxLinkUse": 0,
                "accountLogin": "a",
            }),
        )
        .await;
    assert_eq!(zero_uses.status(), StatusCode::BAD_REQUEST);
    assert!(error_message(zero_uses).await.contains("maxLinkUse"));

    let reserved = gw
        .post(
            "/create",
            json!({
                "target": "https://x",
                "programID": "logs",
                "expiryTimeInMins": 10,
                "maxLinkUse": 1,
                "accountLogin": "a",
            }),
        )
        .await;
    assert_eq!(reserved.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_link_is_not_found() {
    let gw = TestGateway::start().await;
    let response = gw
        .http
        .get(gw.url("/ea-1/12345/0000000000000000"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    error_message(response).await;
}

#[tokio::test]
async fn link_under_another_owner_is_not_found() {
    let gw = TestGateway::start().await;
    let link = gw.create("/files/report.pdf", 1).await;
    let locator = Locator::parse(&link).unwrap();

    for (program, account) in [("ea-2", "12345"), ("ea-1", "99999")] {
        let response = gw
            .http
            .get(gw.url(&format!("/{}/{}/{}", program, account, locator.token_id)))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        error_message(response).await;
    }
    assert!(gw
        .state
        .access_log
        .list("ea-2", "12345", &locator.token_id)
        .await
        .unwrap()
        .is_empty());

    // the single use is still available to the owner
    let response = gw.http.get(&link).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), REPORT);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let gw = TestGateway::start().await;
    let limit = gw.state.config.max_body_bytes;

    let response = gw
        .post(
            "/create",
            json!({
                "target": format!("https://cdn.example.com/{}", "a".repeat(limit)),
                "programID": "ea-1",
                "expiryTimeInMins": 10,
                "maxLinkUse": 1,
                "accountLogin": "12345",
            }),
        )
        .await;
    assert!(response.status().is_client_error(), "{}", response.status());
    assert!(gw.state.links.store().load().await.unwrap().is_empty());
}

#[tokio::test]
async fn upstream_failure_is_bad_gateway() {
    let gw = TestGateway::start().await;
    let link = gw.create("/files/missing.pdf", 5).await;

    let response = gw.http.get(&link).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    error_message(response).await;
}

#[tokio::test]
async fn bind_then_verify() {
    let gw = TestGateway::start().await;

    let unbound: VerifyResponse = gw
        .post("/mql5/verify", json!({ "programID": "ea-1", "accountLogin": 77 }))
        .await
        .json()
        .await
        .unwrap();
    assert!(!unbound.valid);
    assert!(unbound.expiry_date.is_none());

    let bound = gw
        .post(
            "/bind",
            json!({ "programID": "ea-1", "accountLogin": 77, "days": 30, "isDemo": true }),
        )
        .await;
    assert_eq!(bound.status(), StatusCode::OK);
    let body: Value = bound.json().await.unwrap();
    assert_eq!(body["success"], true);

    let raw: Value = gw
        .post("/mql5/verify", json!({ "programID": "ea-1", "accountLogin": "77" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(raw["valid"], true);
    assert_eq!(raw["isDemo"], true);
    assert!(raw["expiryDate"].is_string());

    let no_days = gw
        .post("/bind", json!({ "programID": "ea-1", "accountLogin": 77 }))
        .await;
    assert_eq!(no_days.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn revoked_link_is_forbidden() {
    let gw = TestGateway::start().await;
    let link = gw.create("/files/report.pdf", 5).await;
    let locator = Locator::parse(&link).unwrap();

    let revoked = gw
        .post(
            "/revoke",
            json!({
                "programID": locator.program_id,
                "accountLogin": locator.account_login,
                "tokenID": locator.token_id,
            }),
        )
        .await;
    assert_eq!(revoked.status(), StatusCode::OK);

    let response = gw.http.get(&link).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(error_message(response).await.contains("revoked"));

    let unknown = gw
        .post(
            "/revoke",
            json!({ "programID": "ea-1", "accountLogin": "12345", "tokenID": "nope" }),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sdk_client_drives_the_gateway() {
    let gw = TestGateway::start().await;
    let client = GatewayClient::direct(&gw.base).unwrap();

    let locator = client
        .create_link(&CreateLinkRequest {
            target: format!("{}/files/report.pdf", gw.upstream),
            program_id: "ea-1".into(),
            expiry_time_in_mins: 5.0,
            max_link_use: 1,
            account_login: "12345".into(),
        })
        .await
        .unwrap();

    let body = client.download(&locator).await.unwrap().collect().await.unwrap();
    assert_eq!(body, REPORT.as_bytes());
    assert_eq!(client.logs(&locator).await.unwrap().len(), 1);

    match client.download(&locator).await {
        Err(SdkError::Gateway { status, .. }) => assert_eq!(status, 403),
        other => panic!("expected a 403, got {:?}", other.map(|u| u.status)),
    }
}

#[tokio::test]
async fn logs_are_kept_per_link() {
    let gw = TestGateway::start().await;
    let first = gw.create("/files/report.pdf", 3).await;
    let second = gw.create("/files/report.pdf", 3).await;
    assert_ne!(first, second);

    for link in [&first, &second] {
        let response = gw.http.get(link.as_str()).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.bytes().await.unwrap();
    }

    let client = GatewayClient::direct(&gw.base).unwrap();
    let first_logs = client.logs(&Locator::parse(&first).unwrap()).await.unwrap();
    let second_logs = client.logs(&Locator::parse(&second).unwrap()).await.unwrap();
    assert_eq!(first_logs.len(), 1);
    assert_eq!(second_logs.len(), 1);
    assert!(first_logs[0].timestamp <= second_logs[0].timestamp);
}
