use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Url};
use serde_json::Value;
use snafu::{ResultExt, ensure};

use super::error::{
    ApiError, ApiResult, BuildClientSnafu, BuildMultipartSnafu, DecodeSnafu, HttpStatusSnafu,
    InvalidBaseUrlSnafu, ReadBodySnafu, RequestSnafu,
};
use super::types::{
    AddPdfResponse, PDF_MIME_TYPE, PdfUpload, PromptUpdate, SettingsAck, ThreadDetail, ThreadId,
    ThreadSummary, UserSettings, decode_thread_detail, decode_thread_directory,
};
use super::ChatBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout. `None` leaves requests unbounded.
    pub timeout: Option<Duration>,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().to_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// reqwest-backed implementation of [`ChatBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: ApiConfig) -> ApiResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|source| ApiError::InvalidBaseUrl {
            stage: "http-backend-parse-base-url",
            base_url: config.base_url.clone(),
            details: source.to_string(),
        })?;
        ensure!(
            matches!(base_url.scheme(), "http" | "https") && !base_url.cannot_be_a_base(),
            InvalidBaseUrlSnafu {
                stage: "http-backend-check-scheme",
                base_url: config.base_url.clone(),
                details: "expected an http:// or https:// URL".to_string(),
            }
        );

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context(BuildClientSnafu {
            stage: "http-backend-build-client",
        })?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Scheme was checked in `new`, so the URL always has path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_json(
        &self,
        stage: &'static str,
        url: Url,
        request: RequestBuilder,
    ) -> ApiResult<Value> {
        tracing::debug!(stage, url = %url, "sending backend request");

        let response = request.send().await.context(RequestSnafu {
            stage,
            url: url.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.context(ReadBodySnafu { stage })?;

        if !status.is_success() {
            return HttpStatusSnafu {
                stage,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        serde_json::from_str(&body).context(DecodeSnafu { stage })
    }

    pub async fn list_threads(&self, token: Option<&str>) -> ApiResult<Vec<ThreadSummary>> {
        let url = self.endpoint(&["all_threads"]);
        let request = Self::authorized(self.http.get(url.clone()), token);
        let payload = self.send_json("list-threads", url, request).await?;
        decode_thread_directory(payload)
    }

    pub async fn get_thread(
        &self,
        thread_id: &ThreadId,
        token: Option<&str>,
    ) -> ApiResult<ThreadDetail> {
        let url = self.endpoint(&["get_threads", thread_id.as_str()]);
        let request = Self::authorized(self.http.get(url.clone()), token);
        let payload = self.send_json("get-thread", url, request).await?;
        decode_thread_detail(payload)
    }

    pub async fn add_pdf(
        &self,
        thread_id: &ThreadId,
        upload: PdfUpload,
        token: &str,
    ) -> ApiResult<AddPdfResponse> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(PDF_MIME_TYPE)
            .context(BuildMultipartSnafu {
                stage: "add-pdf-file-part",
            })?;
        let form = Form::new()
            .part("pdf", part)
            .text("thread_id", thread_id.to_string());

        let url = self.endpoint(&["add_pdf"]);
        let request = self.http.post(url.clone()).bearer_auth(token).multipart(form);
        let payload = self.send_json("add-pdf", url, request).await?;
        serde_json::from_value(payload).context(DecodeSnafu {
            stage: "decode-add-pdf",
        })
    }

    pub async fn get_settings(&self, token: Option<&str>) -> ApiResult<UserSettings> {
        let url = self.endpoint(&["settings"]);
        let request = Self::authorized(self.http.get(url.clone()), token);
        let payload = self.send_json("get-settings", url, request).await?;
        serde_json::from_value(payload).context(DecodeSnafu {
            stage: "decode-settings",
        })
    }

    pub async fn save_prompt(
        &self,
        custom_prompt: Option<String>,
        token: Option<&str>,
    ) -> ApiResult<SettingsAck> {
        let url = self.endpoint(&["settings", "prompt"]);
        let request = Self::authorized(self.http.post(url.clone()), token)
            .json(&PromptUpdate { custom_prompt });
        let payload = self.send_json("save-prompt", url, request).await?;
        serde_json::from_value(payload).context(DecodeSnafu {
            stage: "decode-save-prompt",
        })
    }

    pub async fn reset_prompt(&self, token: Option<&str>) -> ApiResult<SettingsAck> {
        let url = self.endpoint(&["settings", "prompt"]);
        let request = Self::authorized(self.http.delete(url.clone()), token);
        let payload = self.send_json("reset-prompt", url, request).await?;
        serde_json::from_value(payload).context(DecodeSnafu {
            stage: "decode-reset-prompt",
        })
    }
}

impl ChatBackend for HttpBackend {
    fn list_threads<'a>(
        &'a self,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<Vec<ThreadSummary>>> {
        Box::pin(HttpBackend::list_threads(self, token))
    }

    fn get_thread<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<ThreadDetail>> {
        Box::pin(HttpBackend::get_thread(self, thread_id, token))
    }

    fn add_pdf<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        upload: PdfUpload,
        token: &'a str,
    ) -> BoxFuture<'a, ApiResult<AddPdfResponse>> {
        Box::pin(HttpBackend::add_pdf(self, thread_id, upload, token))
    }

    fn get_settings<'a>(&'a self, token: Option<&'a str>) -> BoxFuture<'a, ApiResult<UserSettings>> {
        Box::pin(HttpBackend::get_settings(self, token))
    }

    fn save_prompt<'a>(
        &'a self,
        custom_prompt: Option<String>,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<SettingsAck>> {
        Box::pin(HttpBackend::save_prompt(self, custom_prompt, token))
    }

    fn reset_prompt<'a>(&'a self, token: Option<&'a str>) -> BoxFuture<'a, ApiResult<SettingsAck>> {
        Box::pin(HttpBackend::reset_prompt(self, token))
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Multipart, Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::AddPdfStatus;

    #[derive(Clone, Default)]
    struct Captured {
        authorization: Arc<Mutex<Vec<Option<String>>>>,
        uploads: Arc<Mutex<Vec<(String, String)>>>,
    }

    fn record_auth(captured: &Captured, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        captured.authorization.lock().unwrap().push(value);
    }

    async fn start_backend_stub(captured: Captured) -> SocketAddr {
        async fn all_threads(State(captured): State<Captured>, headers: HeaderMap) -> Json<Value> {
            record_auth(&captured, &headers);
            Json(json!([
                {"thread_id": "t1", "preview": "Hi"},
                {"thread_id": "t2", "preview": "Bye"},
            ]))
        }

        async fn get_thread(Path(thread_id): Path<String>) -> (StatusCode, Json<Value>) {
            match thread_id.as_str() {
                "t1" => (StatusCode::OK, Json(json!({}))),
                "with space" => (
                    StatusCode::OK,
                    Json(json!({
                        "thread_id": "with space",
                        "messages": [{"role": "user", "content": "hello"}],
                    })),
                ),
                _ => (
                    StatusCode::NOT_FOUND,
                    Json(json!({"detail": "Thread not found"})),
                ),
            }
        }

        async fn add_pdf(
            State(captured): State<Captured>,
            mut multipart: Multipart,
        ) -> Json<Value> {
            let mut file_name = String::new();
            let mut thread_id = String::new();
            while let Ok(Some(field)) = multipart.next_field().await {
                match field.name() {
                    Some("pdf") => file_name = field.file_name().unwrap_or_default().to_string(),
                    Some("thread_id") => thread_id = field.text().await.unwrap_or_default(),
                    _ => {}
                }
            }
            captured
                .uploads
                .lock()
                .unwrap()
                .push((file_name, thread_id));
            Json(json!({"status": "exists"}))
        }

        async fn settings(headers: HeaderMap) -> Json<Value> {
            let email = if headers.contains_key("authorization") {
                "lawyer@example.com"
            } else {
                ""
            };
            Json(json!({"email": email, "user_id": "u1", "custom_prompt": null}))
        }

        async fn save_prompt(Json(body): Json<Value>) -> Json<Value> {
            let message = format!("saved {}", body["custom_prompt"]);
            Json(json!({"success": true, "message": message}))
        }

        async fn reset_prompt() -> Json<Value> {
            Json(json!({"success": true, "message": "Prompt reset to default"}))
        }

        let app = Router::new()
            .route("/api/all_threads", get(all_threads))
            .route("/api/get_threads/:thread_id", get(get_thread))
            .route("/api/add_pdf", post(add_pdf))
            .route("/api/settings", get(settings))
            .route("/api/settings/prompt", post(save_prompt).delete(reset_prompt))
            .with_state(captured);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .await
                .expect("backend stub server failed");
        });
        addr
    }

    fn backend_for(addr: SocketAddr) -> HttpBackend {
        HttpBackend::new(ApiConfig::new(format!("http://{addr}/api/"))).unwrap()
    }

    #[test]
    fn rejects_non_http_base_url() {
        for raw in ["", "ftp://example.com", "mailto:someone@example.com"] {
            let error = HttpBackend::new(ApiConfig::new(raw)).unwrap_err();
            assert!(matches!(error, ApiError::InvalidBaseUrl { .. }), "{raw}: {error}");
        }
    }

    #[tokio::test]
    async fn list_threads_sends_bearer_only_when_present() {
        let captured = Captured::default();
        let backend = backend_for(start_backend_stub(captured.clone()).await);

        let threads = backend.list_threads(Some("token-1")).await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id.as_str(), "t1");

        backend.list_threads(None).await.unwrap();

        let seen = captured.authorization.lock().unwrap().clone();
        assert_eq!(seen, vec![Some("Bearer token-1".to_string()), None]);
    }

    #[tokio::test]
    async fn get_thread_encodes_id_and_maps_status() {
        let backend = backend_for(start_backend_stub(Captured::default()).await);

        let empty = backend
            .get_thread(&ThreadId::from("t1"), Some("token"))
            .await
            .unwrap();
        assert!(empty.messages.is_empty());

        let detail = backend
            .get_thread(&ThreadId::from("with space"), Some("token"))
            .await
            .unwrap();
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.messages[0].text(), "hello");

        let error = backend
            .get_thread(&ThreadId::from("missing"), Some("token"))
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::HttpStatus { status: 404, .. }), "{error}");
        assert!(!error.is_shape_error());
    }

    #[tokio::test]
    async fn add_pdf_posts_multipart_form() {
        let captured = Captured::default();
        let backend = backend_for(start_backend_stub(captured.clone()).await);

        let response = backend
            .add_pdf(
                &ThreadId::from("t9"),
                PdfUpload::new("contract.pdf", b"%PDF-1.7".to_vec()),
                "token",
            )
            .await
            .unwrap();

        assert_eq!(response.outcome(), AddPdfStatus::Exists);
        let uploads = captured.uploads.lock().unwrap().clone();
        assert_eq!(
            uploads,
            vec![("contract.pdf".to_string(), "t9".to_string())]
        );
    }

    #[tokio::test]
    async fn settings_round_trip_through_endpoints() {
        let backend = backend_for(start_backend_stub(Captured::default()).await);

        let settings = backend.get_settings(Some("token")).await.unwrap();
        assert_eq!(settings.email.as_deref(), Some("lawyer@example.com"));
        assert_eq!(settings.custom_prompt, None);

        let ack = backend
            .save_prompt(Some("Answer briefly.".to_string()), Some("token"))
            .await
            .unwrap();
        assert!(ack.success);
        assert_eq!(ack.message.as_deref(), Some(r#"saved "Answer briefly.""#));

        let ack = backend.reset_prompt(Some("token")).await.unwrap();
        assert_eq!(ack.message.as_deref(), Some("Prompt reset to default"));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let error = backend_for(addr).list_threads(None).await.unwrap_err();
        assert!(matches!(error, ApiError::Request { .. }), "{error}");
    }
}
