//! Typed client for the qanoon backend HTTP API.
pub mod client;
pub mod error;
pub mod types;

use futures::future::BoxFuture;

pub use client::{ApiConfig, HttpBackend};
pub use error::{ApiError, ApiResult};
pub use types::{
    AddPdfResponse, AddPdfStatus, Message, PDF_MIME_TYPE, PdfUpload, PromptUpdate, SettingsAck,
    ThreadDetail, ThreadId, ThreadSummary, UNTITLED_THREAD_PREVIEW, UserSettings,
    decode_thread_detail, decode_thread_directory,
};

/// Backend operations the chat core depends on.
///
/// `token` is the bearer credential of the current session. Read paths accept
/// `None` and still issue the request; authorization is enforced server-side.
pub trait ChatBackend: Send + Sync {
    fn list_threads<'a>(
        &'a self,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<Vec<ThreadSummary>>>;

    fn get_thread<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<ThreadDetail>>;

    fn add_pdf<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        upload: PdfUpload,
        token: &'a str,
    ) -> BoxFuture<'a, ApiResult<AddPdfResponse>>;

    fn get_settings<'a>(&'a self, token: Option<&'a str>) -> BoxFuture<'a, ApiResult<UserSettings>>;

    fn save_prompt<'a>(
        &'a self,
        custom_prompt: Option<String>,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<SettingsAck>>;

    fn reset_prompt<'a>(&'a self, token: Option<&'a str>) -> BoxFuture<'a, ApiResult<SettingsAck>>;
}
