use qanoon_api::ApiError;
use qanoon_chat::ChatError;
use qanoon_session::SessionError;
use snafu::Snafu;

use crate::config::SettingsError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("settings error on `{stage}`: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("backend client error on `{stage}`: {source}"))]
    Backend {
        stage: &'static str,
        source: ApiError,
    },
    #[snafu(display("identity provider error on `{stage}`: {source}"))]
    Identity {
        stage: &'static str,
        source: SessionError,
    },
    #[snafu(display("{source}"))]
    Chat {
        stage: &'static str,
        source: ChatError,
    },
    #[snafu(display("not signed in; run `qanoon login` first"))]
    NotSignedIn { stage: &'static str },
    #[snafu(display("could not check the current session: {message}"))]
    SessionUnavailable {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("thread '{thread_id}' is not in your chat list"))]
    ThreadNotFound {
        stage: &'static str,
        thread_id: String,
    },
}

pub type AppResult<T> = Result<T, AppError>;
