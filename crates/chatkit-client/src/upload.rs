use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use reqwest::Body;
use serde_json::Value;
use tracing::debug;

use crate::errors::RequestError;
use crate::request::ApiClient;

/// Progress callback: `(bytes_sent, bytes_total)`.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

const UPLOAD_CHUNK: usize = 64 * 1024;

/// Descriptor for one streamed upload.
pub struct UploadRequest {
    path: String,
    content_type: String,
    data: Bytes,
    headers: Vec<(String, String)>,
    public: bool,
    on_progress: Option<Arc<ProgressFn>>,
}

impl UploadRequest {
    /// Creates an upload of `data` with the given content type.
    pub fn new(
        path: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            path: path.into(),
            content_type: content_type.into(),
            data: data.into(),
            headers: Vec::new(),
            public: false,
            on_progress: None,
        }
    }

    /// Adds a header override.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Targets the public base URL and attaches a bearer credential.
    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Registers a progress callback, invoked as chunks are handed to the
    /// transport.
    pub fn on_progress(mut self, callback: Arc<ProgressFn>) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

impl ApiClient {
    /// Streams an upload and decodes the JSON body of a 201 response.
    ///
    /// Any other status rejects with the parsed error body. No timeout race
    /// is applied; large uploads are legitimately slow.
    pub async fn upload(&self, request: UploadRequest) -> Result<Value, RequestError> {
        let url = self.config.url_for(request.public, &request.path);
        let total = request.data.len() as u64;
        debug!(%url, total, "starting upload");

        let mut chunks = Vec::with_capacity(request.data.len().div_ceil(UPLOAD_CHUNK));
        let mut offset = 0;
        while offset < request.data.len() {
            let end = usize::min(offset + UPLOAD_CHUNK, request.data.len());
            chunks.push(request.data.slice(offset..end));
            offset = end;
        }

        let progress = request.on_progress.clone();
        let mut sent = 0u64;
        let body_stream = stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            if let Some(progress) = progress.as_ref() {
                progress(sent, total);
            }
            Ok::<Bytes, std::convert::Infallible>(chunk)
        }));

        let mut builder = self
            .http
            .post(&url)
            .header("Content-Type", &request.content_type);
        if request.public {
            builder = builder.bearer_auth(self.bearer_for_public());
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .body(Body::wrap_stream(body_stream))
            .send()
            .await
            .map_err(|e| RequestError::transport(format!("upload failed: {e}")))?;

        let status = response.status().as_u16();
        if status != 201 {
            let body = response
                .json::<Value>()
                .await
                .unwrap_or_else(|_| serde_json::json!({}));
            return Err(RequestError::http(status, body));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| RequestError::transport(format!("failed to decode upload response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use wiremock::matchers::{body_bytes, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::ClientConfig;

    #[tokio::test]
    async fn upload_resolves_on_201_and_reports_progress() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/upload"))
            .and(body_bytes(vec![7u8; 100_000]))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "f1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(ClientConfig::new(server.uri(), server.uri())).expect("client");
        let reports: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let value = client
            .upload(
                UploadRequest::new("/files/upload", "application/octet-stream", vec![7u8; 100_000])
                    .on_progress(Arc::new(move |sent, total| {
                        sink.lock().expect("lock").push((sent, total));
                    })),
            )
            .await
            .expect("upload");

        assert_eq!(value, json!({"id": "f1"}));
        let reports = reports.lock().expect("lock").clone();
        assert_eq!(reports.last(), Some(&(100_000, 100_000)));
        assert!(reports.iter().all(|(sent, total)| sent <= total));
    }

    #[tokio::test]
    async fn upload_rejects_any_status_other_than_201() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "f1"})))
            .mount(&server)
            .await;

        let client = ApiClient::new(ClientConfig::new(server.uri(), server.uri())).expect("client");
        let err = client
            .upload(UploadRequest::new("/files/upload", "text/plain", "hello"))
            .await
            .expect_err("non-201 must reject");
        assert_eq!(err.status(), Some(200));
    }
}
