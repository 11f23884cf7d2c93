use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures::future::BoxFuture;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use snafu::{ResultExt, ensure};

use super::error::{
    BuildClientSnafu, DecodeSnafu, EmptyOAuthProviderSnafu, HttpStatusSnafu, InvalidAuthUrlSnafu,
    RequestSnafu, SessionError, SessionResult,
};
use super::file::SessionFile;
use super::session::{OAuthRedirect, Session, current_unix_timestamp_seconds};
use super::SessionProvider;

pub const DEFAULT_OAUTH_PROVIDER: &str = "google";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub auth_url: String,
    pub anon_key: String,
    /// Mirror of the signed-in session; `None` keeps it in memory only.
    pub session_file: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl SupabaseConfig {
    pub fn new(auth_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into().trim().to_string(),
            anon_key: anon_key.into().trim().to_string(),
            session_file: None,
            timeout: None,
        }
    }

    pub fn with_session_file(mut self, path: PathBuf) -> Self {
        self.session_file = Some(path);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    expires_at: Option<u64>,
    #[serde(default)]
    user: Option<TokenUser>,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self, now_unix_seconds: u64) -> Session {
        let expires_at = self.expires_at.or_else(|| {
            self.expires_in
                .map(|expires_in| now_unix_seconds.saturating_add(expires_in))
        });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user_email: self.user.and_then(|user| user.email),
        }
    }
}

/// Session provider speaking the Supabase GoTrue REST protocol.
pub struct SupabaseSessionProvider {
    auth_url: Url,
    anon_key: String,
    http: reqwest::Client,
    session: ArcSwapOption<Session>,
    store: Option<SessionFile>,
}

impl SupabaseSessionProvider {
    pub fn new(config: SupabaseConfig) -> SessionResult<Self> {
        let auth_url = Url::parse(&config.auth_url).map_err(|source| SessionError::InvalidAuthUrl {
            stage: "supabase-parse-auth-url",
            auth_url: config.auth_url.clone(),
            details: source.to_string(),
        })?;
        ensure!(
            matches!(auth_url.scheme(), "http" | "https") && !auth_url.cannot_be_a_base(),
            InvalidAuthUrlSnafu {
                stage: "supabase-check-scheme",
                auth_url: config.auth_url.clone(),
                details: "expected an http:// or https:// URL".to_string(),
            }
        );

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context(BuildClientSnafu {
            stage: "supabase-build-client",
        })?;

        let store = config.session_file.map(SessionFile::new);
        let restored = store.as_ref().and_then(SessionFile::load);
        if restored.is_some() {
            tracing::debug!("restored session from session file");
        }

        Ok(Self {
            auth_url,
            anon_key: config.anon_key,
            http,
            session: ArcSwapOption::new(restored.map(Arc::new)),
            store,
        })
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.session.load_full()
    }

    /// Stores the session handed back by the OAuth callback.
    pub fn complete_sign_in(&self, session: Session) -> SessionResult<()> {
        if let Some(store) = &self.store {
            store.save(&session)?;
        }
        self.session.store(Some(Arc::new(session)));
        tracing::info!("signed in");
        Ok(())
    }

    pub fn authorize_url(&self, provider: &str, redirect_to: &str) -> SessionResult<OAuthRedirect> {
        let provider = provider.trim();
        ensure!(
            !provider.is_empty(),
            EmptyOAuthProviderSnafu {
                stage: "supabase-authorize-url",
            }
        );

        let mut url = self.endpoint(&["auth", "v1", "authorize"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("provider", provider);
            if !redirect_to.trim().is_empty() {
                query.append_pair("redirect_to", redirect_to.trim());
            }
        }

        Ok(OAuthRedirect {
            provider: provider.to_string(),
            url: url.to_string(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.auth_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn refresh(&self, refresh_token: &str) -> SessionResult<Session> {
        let mut url = self.endpoint(&["auth", "v1", "token"]);
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .context(RequestSnafu {
                stage: "supabase-refresh-send",
            })?;
        let status = response.status();
        let body = response.text().await.context(RequestSnafu {
            stage: "supabase-refresh-read",
        })?;
        if !status.is_success() {
            return HttpStatusSnafu {
                stage: "supabase-refresh-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let token = serde_json::from_str::<TokenResponse>(&body).context(DecodeSnafu {
            stage: "supabase-refresh-decode",
        })?;
        Ok(token.into_session(current_unix_timestamp_seconds()))
    }

    fn clear_local(&self) {
        self.session.store(None);
        if let Some(store) = &self.store
            && let Err(error) = store.remove()
        {
            tracing::warn!(error = %error, "failed to remove session file");
        }
    }

    async fn resolve_session(&self) -> SessionResult<Option<Session>> {
        let Some(current) = self.current() else {
            return Ok(None);
        };
        if !current.is_expired_at(current_unix_timestamp_seconds()) {
            return Ok(Some(Session::clone(&current)));
        }

        let Some(refresh_token) = current.refresh_token.as_deref() else {
            tracing::info!("session expired without a refresh token");
            self.clear_local();
            return Ok(None);
        };

        match self.refresh(refresh_token).await {
            Ok(refreshed) => {
                self.complete_sign_in(refreshed.clone())?;
                tracing::debug!("refreshed expired session");
                Ok(Some(refreshed))
            }
            Err(error) if refresh_was_rejected(&error) => {
                tracing::warn!(error = %error, "refresh token rejected; signing out locally");
                self.clear_local();
                Ok(None)
            }
            Err(error) => {
                tracing::warn!(error = %error, "session refresh failed; keeping stored session");
                Err(error)
            }
        }
    }

    async fn revoke_and_clear(&self) -> SessionResult<()> {
        let token = self
            .current()
            .and_then(|session| session.bearer_token().map(str::to_string));

        if let Some(token) = token {
            let url = self.endpoint(&["auth", "v1", "logout"]);
            let result = self
                .http
                .post(url)
                .header("apikey", &self.anon_key)
                .bearer_auth(token)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => tracing::warn!(
                    status = response.status().as_u16(),
                    "identity provider rejected logout"
                ),
                Err(error) => tracing::warn!(error = %error, "logout request failed"),
            }
        }

        // Local sign-out wins even when the provider could not be reached.
        self.clear_local();
        tracing::info!("signed out");
        Ok(())
    }
}

/// The provider answered and refused the refresh token. Transport failures
/// and server errors leave the stored session for a later retry.
fn refresh_was_rejected(error: &SessionError) -> bool {
    match error {
        SessionError::HttpStatus { status, .. } => matches!(status, 400 | 401 | 403),
        SessionError::Decode { .. } => true,
        _ => false,
    }
}

impl SessionProvider for SupabaseSessionProvider {
    fn get_session(&self) -> BoxFuture<'_, SessionResult<Option<Session>>> {
        Box::pin(self.resolve_session())
    }

    fn sign_in_with_oauth<'a>(
        &'a self,
        provider: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, SessionResult<OAuthRedirect>> {
        Box::pin(async move { self.authorize_url(provider, redirect_to) })
    }

    fn sign_out(&self) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(self.revoke_and_clear())
    }
}
