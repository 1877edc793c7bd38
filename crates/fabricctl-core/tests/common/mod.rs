//! Mock Fabric / identity server shared by the integration tests

#![allow(dead_code)]

use std::time::Duration;

use fabricctl_core::progress::PollConfig;
use fabricctl_core::{Credentials, FabricClient, FabricClientBuilder};
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT: &str = "tenant-1";
pub const ACCESS_TOKEN: &str = "tok-1";
pub const TOKEN_PATH: &str = "/tenant-1/oauth2/v2.0/token";

/// Poll interval used by test clients
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct MockFabricServer {
    pub server: MockServer,
}

/// Installs a test subscriber once; `RUST_LOG` picks the level
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        tracing_subscriber::EnvFilter::new("fabricctl_core=warn")
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer().compact())
        .try_init();
}

impl MockFabricServer {
    pub async fn start() -> Self {
        init_tracing();
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Fabric API path on the mock server
    pub fn fabric(&self, suffix: &str) -> String {
        format!("/v1{suffix}")
    }

    /// Power BI API path on the mock server
    pub fn powerbi(&self, suffix: &str) -> String {
        format!("/pbi{suffix}")
    }

    pub fn token_response(expires_in: i64) -> serde_json::Value {
        json!({
            "token_type": "Bearer",
            "scope": "https://analysis.windows.net/powerbi/api/.default",
            "expires_in": expires_in,
            "ext_expires_in": expires_in,
            "access_token": ACCESS_TOKEN,
        })
    }

    /// Token endpoint that must be hit exactly `times` times
    pub async fn mock_token(&self, expires_in: i64, times: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(Self::token_response(expires_in)))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Token endpoint that accepts any number of calls
    pub async fn mock_token_any(&self) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(Self::token_response(3599)))
            .mount(&self.server)
            .await;
    }

    pub fn credentials() -> Credentials {
        Credentials::new("client-1", "secret-1", TENANT)
    }

    /// Builder pointed at the mock server for every endpoint
    pub fn builder(&self) -> FabricClientBuilder {
        FabricClient::builder(Self::credentials())
            .authority_host(self.uri())
            .fabric_base_url(format!("{}/v1", self.uri()))
            .powerbi_base_url(format!("{}/pbi", self.uri()))
            .settle_delay(Duration::ZERO)
            .poll_config(PollConfig {
                interval: POLL_INTERVAL,
                max_attempts: 10,
                timeout: None,
            })
    }

    pub fn client(&self) -> FabricClient {
        self.builder().build().expect("client builds")
    }

    /// Method and path of every request except token requests, in arrival order
    pub async fn api_calls(&self) -> Vec<(String, String)> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() != TOKEN_PATH)
            .map(|r| (r.method.to_string(), r.url.path().to_string()))
            .collect()
    }

    /// JSON bodies of the non-token requests, in arrival order
    pub async fn api_bodies(&self) -> Vec<serde_json::Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() != TOKEN_PATH)
            .map(|r| serde_json::from_slice(&r.body).unwrap_or(serde_json::Value::Null))
            .collect()
    }
}
