use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::auth::{CredentialStore, NoCredentials, bearer_credential};
use crate::config::ClientConfig;
use crate::errors::{ReauthReason, RequestError};
use crate::notify::{NotificationKind, NotificationSink, TracingSink};

pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";
pub(crate) const CONTENT_TYPE_STREAM: &str = "text/event-stream";
pub(crate) const CONTENT_TYPE_DOWNLOAD: &str = "application/octet-stream";

/// How the response body should be handed back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseMode {
    /// Decode the body (JSON, or bytes for download requests).
    #[default]
    Decoded,
    /// Return the raw response without touching the body.
    Raw,
}

#[derive(Clone, Debug)]
enum RequestBody {
    Json(Value),
    Raw {
        bytes: Bytes,
        content_type: Option<String>,
    },
}

/// One HTTP request descriptor. Built fluently, immutable once sent.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    method: Method,
    path: String,
    params: Vec<(String, String)>,
    body: Option<RequestBody>,
    headers: Vec<(String, String)>,
    public: bool,
    response_mode: ResponseMode,
}

impl ApiRequest {
    /// Creates a request for an arbitrary method.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            headers: Vec::new(),
            public: false,
            response_mode: ResponseMode::Decoded,
        }
    }

    /// GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// PATCH request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Adds a flat query parameter (URL-encoded on send for GET requests).
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Attaches a JSON body, serialized on send.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Attaches a pre-encoded body. With `content_type` of `None` no default
    /// content type is applied at all.
    pub fn raw_body(mut self, bytes: impl Into<Bytes>, content_type: Option<String>) -> Self {
        self.body = Some(RequestBody::Raw {
            bytes: bytes.into(),
            content_type,
        });
        self
    }

    /// Adds a header override.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Marks the target as a public/shared-app endpoint: the public base URL
    /// is used and a bearer credential is attached.
    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Selects raw (undecoded) response delivery.
    pub fn raw_response(mut self) -> Self {
        self.response_mode = ResponseMode::Raw;
        self
    }

    fn wants_download(&self) -> bool {
        let declared = |value: &str| value.eq_ignore_ascii_case(CONTENT_TYPE_DOWNLOAD);
        self.headers
            .iter()
            .any(|(name, value)| name.eq_ignore_ascii_case("content-type") && declared(value))
            || matches!(
                &self.body,
                Some(RequestBody::Raw { content_type: Some(ct), .. }) if declared(ct)
            )
    }
}

/// Decoded (or raw) result of a successful request.
#[derive(Debug)]
pub enum ApiResponse {
    /// JSON body, or the canonical `{"result":"success"}` for 204.
    Json(Value),
    /// Binary download body.
    Bytes(Bytes),
    /// Undecoded response, for callers that asked for it.
    Raw(reqwest::Response),
}

impl ApiResponse {
    /// Returns the decoded JSON body.
    pub fn into_json(self) -> Result<Value, RequestError> {
        match self {
            Self::Json(value) => Ok(value),
            other => Err(RequestError::transport(format!(
                "response is not decoded JSON: {other:?}"
            ))),
        }
    }

    /// Deserializes the decoded JSON body into `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, RequestError> {
        let value = self.into_json()?;
        serde_json::from_value(value)
            .map_err(|e| RequestError::transport(format!("failed to deserialize body: {e}")))
    }
}

/// HTTP client for one backend: owns the connection pool, the injected
/// configuration, and the credential/notification collaborators.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) http: reqwest::Client,
    pub(crate) config: ClientConfig,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) notifier: Arc<dyn NotificationSink>,
}

/// Builder for attaching collaborators before creating an [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl ApiClientBuilder {
    /// Replaces the default (empty) credential store.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = store;
        self
    }

    /// Replaces the default (tracing-backed) notification sink.
    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifier = sink;
        self
    }

    /// Builds the client.
    ///
    /// No client-wide timeout is set on the HTTP pool: the non-streaming
    /// timeout is raced per request, and streaming sessions must be allowed
    /// to run until cancelled.
    pub fn build(self) -> Result<ApiClient, RequestError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RequestError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(ApiClient {
            http,
            config: self.config,
            credentials: self.credentials,
            notifier: self.notifier,
        })
    }
}

impl ApiClient {
    /// Starts a builder with default collaborators.
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            credentials: Arc::new(NoCredentials),
            notifier: Arc::new(TracingSink),
        }
    }

    /// Creates a client with default collaborators.
    pub fn new(config: ClientConfig) -> Result<Self, RequestError> {
        Self::builder(config).build()
    }

    pub(crate) fn bearer_for_public(&self) -> String {
        let shared_token = self.config.shared_token.as_deref().unwrap_or_default();
        bearer_credential(self.credentials.as_ref(), shared_token)
    }

    /// Performs one round trip: decorates the request, races it against the
    /// configured timeout, classifies the status, and decodes the body.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        let url = self.config.url_for(request.public, &request.path);
        let mut builder = self.http.request(request.method.clone(), &url);

        if request.public {
            builder = builder.bearer_auth(self.bearer_for_public());
        }
        if request.method == Method::GET && !request.params.is_empty() {
            builder = builder.query(&request.params);
        }

        let mut has_content_type = false;
        match &request.body {
            Some(RequestBody::Json(value)) => {
                builder = builder.json(value);
                has_content_type = true;
            }
            Some(RequestBody::Raw {
                bytes,
                content_type,
            }) => {
                if let Some(content_type) = content_type {
                    builder = builder.header("Content-Type", content_type);
                }
                builder = builder.body(bytes.clone());
                has_content_type = true;
            }
            None => {}
        }
        for (name, value) in &request.headers {
            if name.eq_ignore_ascii_case("content-type") {
                has_content_type = true;
            }
            builder = builder.header(name, value);
        }
        if !has_content_type {
            builder = builder.header("Content-Type", CONTENT_TYPE_JSON);
        }

        debug!(method = %request.method, %url, public = request.public, "sending request");

        let response = match tokio::time::timeout(self.config.timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let message = format!("request failed: {e}");
                self.notifier.notify(NotificationKind::Error, &message);
                return Err(RequestError::transport(message));
            }
            Err(_) => return Err(RequestError::Timeout),
        };

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(self
                .classify_failure(status.as_u16(), response, request.public)
                .await);
        }

        if status.as_u16() == 204 {
            // No content to decode.
            return Ok(ApiResponse::Json(json!({ "result": "success" })));
        }
        if request.response_mode == ResponseMode::Raw {
            return Ok(ApiResponse::Raw(response));
        }
        if request.wants_download() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| RequestError::transport(format!("failed to read body: {e}")))?;
            return Ok(ApiResponse::Bytes(bytes));
        }
        let value = response
            .json::<Value>()
            .await
            .map_err(|e| RequestError::transport(format!("failed to decode body: {e}")))?;
        Ok(ApiResponse::Json(value))
    }

    /// Classifies a non-2xx/3xx response. Every branch that notifies the
    /// collaborator still returns the error.
    async fn classify_failure(
        &self,
        status: u16,
        response: reqwest::Response,
        public: bool,
    ) -> RequestError {
        let body = response.json::<Value>().await.unwrap_or_else(|_| json!({}));
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Server Error")
            .to_string();
        let code = body.get("code").and_then(Value::as_str).unwrap_or_default();
        debug!(status, code, "request failed");

        match status {
            401 if public => {
                self.notifier.notify(NotificationKind::Error, "Invalid token");
                RequestError::http(status, body)
            }
            401 => {
                let reason = if code == "not_setup" {
                    ReauthReason::Setup
                } else {
                    ReauthReason::Login
                };
                RequestError::RequiresReauth { reason }
            }
            403 => {
                self.notifier.notify(NotificationKind::Error, &message);
                if code == "already_setup" {
                    RequestError::RequiresReauth {
                        reason: ReauthReason::Login,
                    }
                } else {
                    RequestError::http(status, body)
                }
            }
            _ => {
                self.notifier.notify(NotificationKind::Error, &message);
                RequestError::http(status, body)
            }
        }
    }

    /// GET and deserialize a JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, RequestError> {
        let mut request = ApiRequest::get(path);
        for (key, value) in params {
            request = request.param(*key, *value);
        }
        self.send(request).await?.deserialize()
    }

    /// POST a JSON body and deserialize the response.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<T, RequestError> {
        self.send(ApiRequest::post(path).json(body)).await?.deserialize()
    }

    /// PUT a JSON body and deserialize the response.
    pub async fn put_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<T, RequestError> {
        self.send(ApiRequest::put(path).json(body)).await?.deserialize()
    }

    /// DELETE and deserialize the response.
    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.send(ApiRequest::delete(path)).await?.deserialize()
    }

    /// PATCH a JSON body and deserialize the response.
    pub async fn patch_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<T, RequestError> {
        self.send(ApiRequest::patch(path).json(body)).await?.deserialize()
    }
}
