use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("backend base URL '{base_url}' is invalid: {details}"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
        details: String,
    },
    #[snafu(display("failed to build HTTP client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} failed on `{stage}`: {source}"))]
    Request {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read response body on `{stage}`: {source}"))]
    ReadBody {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("backend returned status {status} on `{stage}`: {body}"))]
    HttpStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode backend JSON on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("backend payload on `{stage}` should be {expected}, got {found}"))]
    UnexpectedShape {
        stage: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[snafu(display("failed to build multipart body on `{stage}`: {source}"))]
    BuildMultipart {
        stage: &'static str,
        source: reqwest::Error,
    },
}

impl ApiError {
    /// True when the backend answered but the payload did not match the schema.
    pub fn is_shape_error(&self) -> bool {
        matches!(self, Self::UnexpectedShape { .. } | Self::Decode { .. })
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidBaseUrl { stage, .. }
            | Self::BuildClient { stage, .. }
            | Self::Request { stage, .. }
            | Self::ReadBody { stage, .. }
            | Self::HttpStatus { stage, .. }
            | Self::Decode { stage, .. }
            | Self::UnexpectedShape { stage, .. }
            | Self::BuildMultipart { stage, .. } => stage,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
