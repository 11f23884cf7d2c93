use std::sync::Arc;

use qanoon_session::{SessionProvider, bearer_token};
use snafu::ResultExt;

use crate::error::{ChatResult, SessionSnafu};

/// Result of the one-shot session check run when the chat page activates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// A bearer token is present; the page may load data with it.
    Open { token: String },
    /// Nobody is signed in. The login view is shown and nothing else runs.
    SignedOut,
    /// The identity provider could not be queried.
    Failed { message: String },
}

impl GateOutcome {
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Open { token } => Some(token),
            Self::SignedOut | Self::Failed { .. } => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

#[derive(Clone)]
pub struct SessionGate {
    session: Arc<dyn SessionProvider>,
}

impl SessionGate {
    pub fn new(session: Arc<dyn SessionProvider>) -> Self {
        Self { session }
    }

    /// Opens only on an explicit, non-blank token. A failing session query is
    /// reported as `Failed`, never as `SignedOut`.
    pub async fn check(&self) -> GateOutcome {
        match current_token(self.session.as_ref(), "session-gate-check").await {
            Ok(Some(token)) => GateOutcome::Open { token },
            Ok(None) => {
                tracing::info!("no active session; showing login");
                GateOutcome::SignedOut
            }
            Err(error) => {
                tracing::error!(error = %error, "session gate could not query the identity provider");
                GateOutcome::Failed {
                    message: error.to_string(),
                }
            }
        }
    }
}

/// Re-queries the identity provider and returns the current bearer token.
pub(crate) async fn current_token(
    session: &dyn SessionProvider,
    stage: &'static str,
) -> ChatResult<Option<String>> {
    let current = session.get_session().await.context(SessionSnafu { stage })?;
    Ok(bearer_token(current.as_ref()).map(str::to_string))
}
