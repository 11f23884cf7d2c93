use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ApiResult, UnexpectedShapeSnafu};

/// Sidebar label used when the backend sends no preview text.
pub const UNTITLED_THREAD_PREVIEW: &str = "Untitled Chat";
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Wire keys carrying the thread identifier, in preference order.
const THREAD_ID_KEYS: [&str; 2] = ["thread_id", "id"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// One entry of the thread directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub preview: Option<String>,
    pub doc_id: Option<String>,
    /// Server fields this client does not interpret.
    pub extra: Map<String, Value>,
}

impl ThreadSummary {
    pub fn new(id: impl Into<ThreadId>, preview: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            preview: Some(preview.into()),
            doc_id: None,
            extra: Map::new(),
        }
    }

    pub fn display_title(&self) -> &str {
        match self.preview.as_deref() {
            Some(preview) if !preview.trim().is_empty() => preview,
            _ => UNTITLED_THREAD_PREVIEW,
        }
    }

    /// Decodes one directory entry, returning `None` when it has no usable id.
    pub fn from_wire(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };

        let id_key = THREAD_ID_KEYS
            .into_iter()
            .find(|key| fields.get(*key).and_then(scalar_text).is_some())?;
        let id = fields.remove(id_key).as_ref().and_then(scalar_text)?;

        let preview = match fields.remove("preview") {
            Some(Value::String(preview)) => Some(preview),
            _ => None,
        };
        let doc_id = fields.remove("doc_id").as_ref().and_then(scalar_text);

        Some(Self {
            id: ThreadId::new(id),
            preview,
            doc_id,
            extra: fields,
        })
    }
}

/// One renderable conversation entry. Everything except `role` and `content` is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            content: Value::String(content.into()),
            extra: Map::new(),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        match &self.content {
            Value::String(text) => Cow::Borrowed(text),
            Value::Null => Cow::Borrowed(""),
            other => Cow::Owned(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThreadDetail {
    pub thread_id: Option<ThreadId>,
    pub doc_id: Option<String>,
    pub messages: Vec<Message>,
}

/// A PDF picked by the user, held in memory until it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PdfUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddPdfStatus {
    Success,
    Exists,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddPdfResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AddPdfResponse {
    pub fn outcome(&self) -> AddPdfStatus {
        match self.status.as_deref() {
            Some("success") => AddPdfStatus::Success,
            Some("exists") => AddPdfStatus::Exists,
            Some(other) => AddPdfStatus::Other(other.to_string()),
            None => AddPdfStatus::Other(String::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptUpdate {
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct SettingsAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Decodes the `/all_threads` payload. Anything other than a list is a shape error.
pub fn decode_thread_directory(payload: Value) -> ApiResult<Vec<ThreadSummary>> {
    let Value::Array(entries) = payload else {
        return UnexpectedShapeSnafu {
            stage: "decode-thread-directory",
            expected: "an array",
            found: json_kind(&payload),
        }
        .fail();
    };

    let threads = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let thread = ThreadSummary::from_wire(entry);
            if thread.is_none() {
                tracing::warn!(index, "skipping thread directory entry without a usable id");
            }
            thread
        })
        .collect();

    Ok(threads)
}

/// Decodes the `/get_threads/{id}` payload.
///
/// A missing or malformed `messages` field decodes to an empty list; only a
/// non-object body is a shape error.
pub fn decode_thread_detail(payload: Value) -> ApiResult<ThreadDetail> {
    let Value::Object(mut fields) = payload else {
        return UnexpectedShapeSnafu {
            stage: "decode-thread-detail",
            expected: "an object",
            found: json_kind(&payload),
        }
        .fail();
    };

    let messages = match fields.remove("messages") {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value::<Message>(entry) {
                Ok(message) => Some(message),
                Err(error) => {
                    tracing::warn!(index, error = %error, "skipping undecodable message");
                    None
                }
            })
            .collect(),
        Some(other) => {
            tracing::warn!(
                found = json_kind(&other),
                "thread detail messages field is not a list"
            );
            Vec::new()
        }
        None => Vec::new(),
    };

    Ok(ThreadDetail {
        thread_id: fields
            .remove("thread_id")
            .as_ref()
            .and_then(scalar_text)
            .map(ThreadId::new),
        doc_id: fields.remove("doc_id").as_ref().and_then(scalar_text),
        messages,
    })
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
