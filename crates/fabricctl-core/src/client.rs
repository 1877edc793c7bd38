//! Authenticated HTTP client for the Fabric and Power BI REST APIs.
//!
//! Every verb fetches a bearer token from the [`TokenStore`], sends one
//! request and classifies the response by status code. The classification is
//! deliberately verb-specific (see [`classify`]): resource handlers depend on
//! the exact set of statuses each verb accepts.

use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::auth::{Credentials, DEFAULT_AUTHORITY_HOST, TokenStore, TokenStoreOptions};
use crate::endpoints::{DEFAULT_FABRIC_BASE_URL, DEFAULT_POWERBI_BASE_URL, Endpoints};
use crate::error::{FabricError, Result};
use crate::policy::{NoRetryPolicy, RetryPolicy};
use crate::progress::{PollConfig, ProgressCallback, poll_operation};

/// Response header carrying the id of a long-running operation
pub const OPERATION_ID_HEADER: &str = "x-ms-operation-id";

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Request kinds, each with its own status classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    PostBytes,
    Put,
    Patch,
    PatchBytes,
    Delete,
}

impl Verb {
    fn method(self) -> reqwest::Method {
        match self {
            Verb::Get => reqwest::Method::GET,
            Verb::Post | Verb::PostBytes => reqwest::Method::POST,
            Verb::Put => reqwest::Method::PUT,
            Verb::Patch | Verb::PatchBytes => reqwest::Method::PATCH,
            Verb::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Successful outcome of a request
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// Success status with a JSON body
    Json(serde_json::Value),
    /// Success status with an empty body
    Empty,
}

impl ApiResponse {
    pub fn is_empty(&self) -> bool {
        matches!(self, ApiResponse::Empty)
    }

    /// The body as a JSON value; an empty body becomes `{}`.
    pub fn into_value(self) -> serde_json::Value {
        match self {
            ApiResponse::Json(value) => value,
            ApiResponse::Empty => serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Decodes the body into a typed response schema.
    ///
    /// # Errors
    ///
    /// [`FabricError::Decode`] if the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(self, context: &str) -> Result<T> {
        serde_json::from_value(self.into_value()).map_err(|e| FabricError::decode(context, e))
    }

    /// String field of a JSON object body, if present.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        match self {
            ApiResponse::Json(value) => value.get(field).and_then(|v| v.as_str()),
            ApiResponse::Empty => None,
        }
    }
}

/// Classify a response by verb and status code.
///
/// - `GET`: 404 is `NotFound`; other statuses are decoded as JSON, except that
///   a non-2xx status with an empty body is `Request`.
/// - `POST`: 200, 201 and 202 succeed; anything else is `Request` with the raw body.
/// - `PUT`: 200 and 201 succeed; 400 is `BadRequest`, 404 is `NotFound`.
/// - `PATCH`: 200 succeeds; 400 is `BadRequest`, 404 is `NotFound`.
/// - `DELETE`: only 200 succeeds.
///
/// Success statuses with an empty body yield [`ApiResponse::Empty`].
///
/// # Errors
///
/// The status-derived error, or [`FabricError::Decode`] for a malformed body
/// on an accepted status.
pub fn classify(verb: Verb, url: &str, status: u16, body: &str) -> Result<ApiResponse> {
    let status_error = || match status {
        400 if matches!(verb, Verb::Put | Verb::Patch | Verb::PatchBytes) => {
            FabricError::BadRequest {
                url: url.to_string(),
                body: body.to_string(),
            }
        }
        404 if !matches!(verb, Verb::Post | Verb::PostBytes | Verb::Delete) => {
            FabricError::NotFound {
                url: url.to_string(),
            }
        }
        _ => FabricError::Request {
            url: url.to_string(),
            status,
            body: body.to_string(),
        },
    };

    match verb {
        Verb::Get => {
            if status == 404 {
                return Err(status_error());
            }
            if !(200..300).contains(&status) {
                // nothing to decode, so surface the status
                if body.trim().is_empty() {
                    return Err(status_error());
                }
                warn!(url, status, "GET returned a non-success status, decoding body anyway");
            }
            parse_body(url, body)
        }
        Verb::Post | Verb::PostBytes => match status {
            200 | 201 | 202 => parse_body(url, body),
            _ => Err(status_error()),
        },
        Verb::Put => match status {
            200 | 201 => parse_body(url, body),
            _ => Err(status_error()),
        },
        Verb::Patch | Verb::PatchBytes => match status {
            200 => parse_body(url, body),
            _ => Err(status_error()),
        },
        Verb::Delete => match status {
            200 => Ok(ApiResponse::Empty),
            _ => Err(status_error()),
        },
    }
}

fn parse_body(url: &str, body: &str) -> Result<ApiResponse> {
    if body.trim().is_empty() {
        return Ok(ApiResponse::Empty);
    }
    serde_json::from_str(body)
        .map(ApiResponse::Json)
        .map_err(|e| FabricError::decode(url, e))
}

fn transport_error(url: &str, e: reqwest::Error) -> FabricError {
    if e.is_timeout() {
        FabricError::Timeout {
            url: url.to_string(),
        }
    } else {
        FabricError::Network {
            url: url.to_string(),
            source: e,
        }
    }
}

/// Fabric / Power BI API client
///
/// Cheap to clone; clones share the token store.
#[derive(Debug, Clone)]
pub struct FabricClient {
    http_client: reqwest::Client,
    token_store: Arc<TokenStore>,
    endpoints: Endpoints,
    retry_policy: Arc<dyn RetryPolicy>,
    poll_config: PollConfig,
    settle_delay: Duration,
    cancellation: Option<CancellationToken>,
}

impl FabricClient {
    /// Starts building a client for the given credentials.
    pub fn builder(credentials: Credentials) -> FabricClientBuilder {
        FabricClientBuilder::new(credentials)
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll_config
    }

    /// Delay between creating an item and reading it back, for endpoints
    /// that are only eventually consistent.
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.token_store
    }

    /// Returns a clone of this client that observes `token`.
    #[must_use]
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancellation: Some(token),
            ..self.clone()
        }
    }

    /// Performs a GET request.
    #[instrument(skip(self))]
    pub async fn get(&self, url: &str) -> Result<ApiResponse> {
        self.execute(Verb::Get, url, None).await.map(|(r, _)| r)
    }

    /// Performs a GET request and decodes the body into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get(url).await?.decode(url)
    }

    /// Performs a POST request with a JSON body.
    #[instrument(skip(self, body))]
    pub async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<ApiResponse> {
        let bytes = encode_body(url, body)?;
        self.execute(Verb::Post, url, Some(bytes))
            .await
            .map(|(r, _)| r)
    }

    /// Performs a POST request and decodes the body into `T`.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        self.post(url, body).await?.decode(url)
    }

    /// Performs a POST request with a pre-serialized JSON body.
    #[instrument(skip(self, body), fields(len = body.len()))]
    pub async fn post_bytes(&self, url: &str, body: Vec<u8>) -> Result<ApiResponse> {
        self.execute(Verb::PostBytes, url, Some(body))
            .await
            .map(|(r, _)| r)
    }

    /// Performs a PUT request with a JSON body.
    #[instrument(skip(self, body))]
    pub async fn put<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<ApiResponse> {
        let bytes = encode_body(url, body)?;
        self.execute(Verb::Put, url, Some(bytes))
            .await
            .map(|(r, _)| r)
    }

    /// Performs a PATCH request with a JSON body.
    #[instrument(skip(self, body))]
    pub async fn patch<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<ApiResponse> {
        let bytes = encode_body(url, body)?;
        self.execute(Verb::Patch, url, Some(bytes))
            .await
            .map(|(r, _)| r)
    }

    /// Performs a PATCH request with a pre-serialized JSON body.
    #[instrument(skip(self, body), fields(len = body.len()))]
    pub async fn patch_bytes(&self, url: &str, body: Vec<u8>) -> Result<ApiResponse> {
        self.execute(Verb::PatchBytes, url, Some(body))
            .await
            .map(|(r, _)| r)
    }

    /// Performs a DELETE request. Only status 200 counts as success.
    #[instrument(skip(self))]
    pub async fn delete(&self, url: &str) -> Result<()> {
        self.execute(Verb::Delete, url, None).await.map(|_| ())
    }

    /// POSTs a request that completes asynchronously and waits for its result.
    ///
    /// # Errors
    ///
    /// [`FabricError::OperationNotFound`] if the response has no
    /// `x-ms-operation-id` header; otherwise see [`poll_operation`].
    pub async fn post_with_operation_check<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<serde_json::Value> {
        self.post_with_operation_check_progress(url, body, None)
            .await
    }

    /// Same as [`post_with_operation_check`](Self::post_with_operation_check), reporting progress.
    #[instrument(skip(self, body, on_progress))]
    pub async fn post_with_operation_check_progress<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        on_progress: Option<ProgressCallback>,
    ) -> Result<serde_json::Value> {
        let bytes = encode_body(url, body)?;
        let (_, headers) = self.execute(Verb::Post, url, Some(bytes)).await?;

        let operation_id = headers
            .get(OPERATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FabricError::OperationNotFound {
                url: url.to_string(),
            })?
            .to_string();

        debug!(operation_id, "request accepted, polling operation");
        poll_operation(self, &operation_id, &self.poll_config, on_progress).await
    }

    /// Sleeps for `duration` unless cancelled first.
    pub(crate) async fn sleep(&self, duration: Duration) -> Result<()> {
        self.cancellable(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match &self.cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(FabricError::Cancelled),
                    result = fut => result,
                }
            }
            None => fut.await,
        }
    }

    /// Runs one logical request, consulting the retry policy after failures.
    async fn execute(
        &self,
        verb: Verb,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(ApiResponse, HeaderMap)> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match self
                .cancellable(self.send_once(verb, url, body.as_deref()))
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(FabricError::Cancelled) => return Err(FabricError::Cancelled),
                Err(e) => e,
            };

            match self.retry_policy.next_delay(attempt, &err) {
                Some(delay) => {
                    warn!(url, attempt, ?delay, error = %err, "request failed, retrying");
                    self.sleep(delay).await?;
                }
                None => return Err(err),
            }
        }
    }

    async fn send_once(
        &self,
        verb: Verb,
        url: &str,
        body: Option<&[u8]>,
    ) -> Result<(ApiResponse, HeaderMap)> {
        let token = self.token_store.ensure_valid_token().await?;

        let mut request = self
            .http_client
            .request(verb.method(), url)
            .bearer_auth(&token);

        if let Some(bytes) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(bytes.to_vec());
        }

        let response = request.send().await.map_err(|e| transport_error(url, e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(|e| transport_error(url, e))?;

        debug!(?verb, url, status, body_len = text.len(), "response received");

        let outcome = classify(verb, url, status, &text)?;
        Ok((outcome, headers))
    }
}

fn encode_body<B: Serialize + ?Sized>(url: &str, body: &B) -> Result<Vec<u8>> {
    serde_json::to_vec(body).map_err(|e| FabricError::decode(format!("request body for {url}"), e))
}

/// Builder for [`FabricClient`]
#[derive(Debug)]
pub struct FabricClientBuilder {
    credentials: Credentials,
    authority_host: String,
    fabric_base_url: String,
    powerbi_base_url: String,
    token_file: Option<PathBuf>,
    grace_period: chrono::Duration,
    request_timeout: Duration,
    retry_policy: Arc<dyn RetryPolicy>,
    poll_config: PollConfig,
    settle_delay: Duration,
    cancellation: Option<CancellationToken>,
}

impl FabricClientBuilder {
    fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            fabric_base_url: DEFAULT_FABRIC_BASE_URL.to_string(),
            powerbi_base_url: DEFAULT_POWERBI_BASE_URL.to_string(),
            token_file: None,
            grace_period: chrono::Duration::zero(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_policy: Arc::new(NoRetryPolicy),
            poll_config: PollConfig::default(),
            settle_delay: Duration::from_secs(15),
            cancellation: None,
        }
    }

    pub fn authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into();
        self
    }

    pub fn fabric_base_url(mut self, url: impl Into<String>) -> Self {
        self.fabric_base_url = url.into();
        self
    }

    pub fn powerbi_base_url(mut self, url: impl Into<String>) -> Self {
        self.powerbi_base_url = url.into();
        self
    }

    pub fn token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    pub fn grace_period(mut self, grace_period: chrono::Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    pub fn poll_config(mut self, poll_config: PollConfig) -> Self {
        self.poll_config = poll_config;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Builds the client, loading the persisted token if a token file is set.
    ///
    /// # Errors
    ///
    /// [`FabricError::Config`] for an invalid base URL or HTTP client setup,
    /// and the token file errors of [`TokenStore::new`].
    pub fn build(self) -> Result<FabricClient> {
        for base in [
            &self.authority_host,
            &self.fabric_base_url,
            &self.powerbi_base_url,
        ] {
            url::Url::parse(base)
                .map_err(|e| FabricError::Config(format!("Invalid base URL '{base}': {e}")))?;
        }

        let http_client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("fabricctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FabricError::Config(format!("Failed to create HTTP client: {e}")))?;

        let token_store = TokenStore::new(
            self.credentials,
            TokenStoreOptions {
                authority_host: self.authority_host,
                token_file: self.token_file,
                grace_period: self.grace_period,
                http_client: http_client.clone(),
            },
        )?;

        Ok(FabricClient {
            http_client,
            token_store: Arc::new(token_store),
            endpoints: Endpoints::new(self.fabric_base_url, self.powerbi_base_url),
            retry_policy: self.retry_policy,
            poll_config: self.poll_config,
            settle_delay: self.settle_delay,
            cancellation: self.cancellation,
        })
    }
}
