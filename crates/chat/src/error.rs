use std::path::PathBuf;

use qanoon_api::ApiError;
use qanoon_session::SessionError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("'{file_name}' is not a PDF file"))]
    NotPdf {
        stage: &'static str,
        file_name: String,
    },
    #[snafu(display("failed to read {path:?} on `{stage}`: {source}"))]
    ReadFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("no thread is selected"))]
    NoActiveThread { stage: &'static str },
    #[snafu(display("a PDF upload is already in progress"))]
    UploadInProgress { stage: &'static str },
    #[snafu(display("no auth token"))]
    MissingToken { stage: &'static str },
    #[snafu(display("session lookup failed on `{stage}`: {source}"))]
    Session {
        stage: &'static str,
        source: SessionError,
    },
    #[snafu(display("backend call failed on `{stage}`: {source}"))]
    Backend {
        stage: &'static str,
        source: ApiError,
    },
}

pub type ChatResult<T> = Result<T, ChatError>;
