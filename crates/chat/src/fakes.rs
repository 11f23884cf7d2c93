//! In-memory collaborators for page tests.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use qanoon_api::{
    AddPdfResponse, ApiError, ApiResult, ChatBackend, PdfUpload, SettingsAck, ThreadDetail,
    ThreadId, ThreadSummary, UserSettings, decode_thread_detail, decode_thread_directory,
};
use qanoon_session::{OAuthRedirect, Session, SessionError, SessionProvider, SessionResult};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct FakeSession {
    session: Mutex<Option<Session>>,
    failing: bool,
    get_session_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl FakeSession {
    fn build(session: Option<Session>, failing: bool) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
            failing,
            get_session_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn signed_in(session: Session) -> Arc<Self> {
        Self::build(Some(session), false)
    }

    pub(crate) fn signed_out() -> Arc<Self> {
        Self::build(None, false)
    }

    pub(crate) fn failing() -> Arc<Self> {
        Self::build(None, true)
    }

    pub(crate) fn set_session(&self, session: Option<Session>) {
        *lock(&self.session) = session;
    }

    pub(crate) fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    fn unavailable(stage: &'static str) -> SessionError {
        SessionError::HttpStatus {
            stage,
            status: 503,
            body: "identity provider unavailable".to_string(),
        }
    }
}

impl SessionProvider for FakeSession {
    fn get_session(&self) -> BoxFuture<'_, SessionResult<Option<Session>>> {
        Box::pin(async move {
            self.get_session_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                return Err(Self::unavailable("fake-get-session"));
            }
            Ok(lock(&self.session).clone())
        })
    }

    fn sign_in_with_oauth<'a>(
        &'a self,
        provider: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, SessionResult<OAuthRedirect>> {
        Box::pin(async move {
            Ok(OAuthRedirect {
                provider: provider.to_string(),
                url: format!("https://auth.test/authorize?provider={provider}&redirect_to={redirect_to}"),
            })
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(async move {
            self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                return Err(Self::unavailable("fake-sign-out"));
            }
            *lock(&self.session) = None;
            Ok(())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BackendCall {
    ListThreads {
        token: Option<String>,
    },
    GetThread {
        thread_id: String,
        token: Option<String>,
    },
    AddPdf {
        thread_id: String,
        file_name: String,
        token: String,
    },
    GetSettings,
    SavePrompt {
        custom_prompt: Option<String>,
    },
    ResetPrompt,
}

#[derive(Debug, Clone)]
enum Canned {
    Json(Value),
    Status(u16),
}

impl Canned {
    fn payload(&self, stage: &'static str) -> ApiResult<Value> {
        match self {
            Self::Json(value) => Ok(value.clone()),
            Self::Status(status) => Err(ApiError::HttpStatus {
                stage,
                status: *status,
                body: json!({ "detail": "stub failure" }).to_string(),
            }),
        }
    }

    fn decode<T: DeserializeOwned>(&self, stage: &'static str) -> ApiResult<T> {
        serde_json::from_value(self.payload(stage)?)
            .map_err(|source| ApiError::Decode { stage, source })
    }
}

#[derive(Default)]
struct Responses {
    /// Served in order; the last entry repeats.
    directory: Vec<Canned>,
    threads: HashMap<String, Canned>,
    thread_gates: HashMap<String, Arc<Notify>>,
    directory_gate: Option<Arc<Notify>>,
    add_pdf: Option<Canned>,
    settings: Option<Canned>,
    save_prompt: Option<Canned>,
    reset_prompt: Option<Canned>,
}

/// Scripted backend that records every call it receives.
#[derive(Default)]
pub(crate) struct FakeBackend {
    responses: Mutex<Responses>,
    calls: Mutex<Vec<BackendCall>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(self: Arc<Self>, edit: impl FnOnce(&mut Responses)) -> Arc<Self> {
        edit(&mut *lock(&self.responses));
        self
    }

    pub(crate) fn with_directory_json(self: Arc<Self>, payload: Value) -> Arc<Self> {
        self.script(|responses| responses.directory.push(Canned::Json(payload)))
    }

    pub(crate) fn with_directory_status(self: Arc<Self>, status: u16) -> Arc<Self> {
        self.script(|responses| responses.directory.push(Canned::Status(status)))
    }

    pub(crate) fn with_thread_json(self: Arc<Self>, thread_id: &str, payload: Value) -> Arc<Self> {
        self.script(|responses| {
            responses
                .threads
                .insert(thread_id.to_string(), Canned::Json(payload));
        })
    }

    pub(crate) fn with_thread_status(self: Arc<Self>, thread_id: &str, status: u16) -> Arc<Self> {
        self.script(|responses| {
            responses
                .threads
                .insert(thread_id.to_string(), Canned::Status(status));
        })
    }

    pub(crate) fn with_add_pdf_json(self: Arc<Self>, payload: Value) -> Arc<Self> {
        self.script(|responses| responses.add_pdf = Some(Canned::Json(payload)))
    }

    pub(crate) fn with_add_pdf_status(self: Arc<Self>, status: u16) -> Arc<Self> {
        self.script(|responses| responses.add_pdf = Some(Canned::Status(status)))
    }

    pub(crate) fn with_settings_json(self: Arc<Self>, payload: Value) -> Arc<Self> {
        self.script(|responses| responses.settings = Some(Canned::Json(payload)))
    }

    pub(crate) fn with_settings_status(self: Arc<Self>, status: u16) -> Arc<Self> {
        self.script(|responses| responses.settings = Some(Canned::Status(status)))
    }

    pub(crate) fn with_save_prompt_status(self: Arc<Self>, status: u16) -> Arc<Self> {
        self.script(|responses| responses.save_prompt = Some(Canned::Status(status)))
    }

    pub(crate) fn with_reset_prompt_status(self: Arc<Self>, status: u16) -> Arc<Self> {
        self.script(|responses| responses.reset_prompt = Some(Canned::Status(status)))
    }

    /// Holds `get_thread(thread_id)` until the returned handle is notified.
    pub(crate) fn hold_thread(&self, thread_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.responses)
            .thread_gates
            .insert(thread_id.to_string(), gate.clone());
        gate
    }

    /// Holds the next `list_threads` call, after it has picked its response,
    /// until the returned handle is notified.
    pub(crate) fn hold_directory(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.responses).directory_gate = Some(gate.clone());
        gate
    }

    pub(crate) fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&BackendCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| matches(call)).count()
    }

    fn record(&self, call: BackendCall) {
        lock(&self.calls).push(call);
    }

    fn next_directory(&self) -> Canned {
        let mut responses = lock(&self.responses);
        match responses.directory.len() {
            0 => Canned::Json(json!([])),
            1 => responses.directory[0].clone(),
            _ => responses.directory.remove(0),
        }
    }

    fn canned(&self, pick: impl FnOnce(&Responses) -> Option<Canned>, fallback: Value) -> Canned {
        pick(&*lock(&self.responses)).unwrap_or(Canned::Json(fallback))
    }
}

impl ChatBackend for FakeBackend {
    fn list_threads<'a>(
        &'a self,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<Vec<ThreadSummary>>> {
        Box::pin(async move {
            self.record(BackendCall::ListThreads {
                token: token.map(str::to_string),
            });
            let canned = self.next_directory();
            let gate = lock(&self.responses).directory_gate.take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            decode_thread_directory(canned.payload("fake-list-threads")?)
        })
    }

    fn get_thread<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<ThreadDetail>> {
        Box::pin(async move {
            self.record(BackendCall::GetThread {
                thread_id: thread_id.to_string(),
                token: token.map(str::to_string),
            });
            let gate = lock(&self.responses)
                .thread_gates
                .get(thread_id.as_str())
                .cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let canned = self.canned(
                |responses| responses.threads.get(thread_id.as_str()).cloned(),
                json!({ "thread_id": thread_id.as_str(), "messages": [] }),
            );
            decode_thread_detail(canned.payload("fake-get-thread")?)
        })
    }

    fn add_pdf<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        upload: PdfUpload,
        token: &'a str,
    ) -> BoxFuture<'a, ApiResult<AddPdfResponse>> {
        Box::pin(async move {
            self.record(BackendCall::AddPdf {
                thread_id: thread_id.to_string(),
                file_name: upload.file_name,
                token: token.to_string(),
            });
            self.canned(
                |responses| responses.add_pdf.clone(),
                json!({ "status": "success" }),
            )
            .decode("fake-add-pdf")
        })
    }

    fn get_settings<'a>(&'a self, _token: Option<&'a str>) -> BoxFuture<'a, ApiResult<UserSettings>> {
        Box::pin(async move {
            self.record(BackendCall::GetSettings);
            self.canned(|responses| responses.settings.clone(), json!({}))
                .decode("fake-get-settings")
        })
    }

    fn save_prompt<'a>(
        &'a self,
        custom_prompt: Option<String>,
        _token: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<SettingsAck>> {
        Box::pin(async move {
            self.record(BackendCall::SavePrompt { custom_prompt });
            self.canned(
                |responses| responses.save_prompt.clone(),
                json!({ "success": true, "message": "Prompt saved" }),
            )
            .decode("fake-save-prompt")
        })
    }

    fn reset_prompt<'a>(&'a self, _token: Option<&'a str>) -> BoxFuture<'a, ApiResult<SettingsAck>> {
        Box::pin(async move {
            self.record(BackendCall::ResetPrompt);
            self.canned(
                |responses| responses.reset_prompt.clone(),
                json!({ "success": true, "message": "Prompt reset" }),
            )
            .decode("fake-reset-prompt")
        })
    }
}
