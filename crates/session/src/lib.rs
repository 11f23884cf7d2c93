//! Identity collaborator contract and the Supabase-backed implementation.
pub mod error;
pub mod file;
pub mod session;
pub mod supabase;

use futures::future::BoxFuture;

pub use error::{SessionError, SessionResult};
pub use file::{SESSION_FILE_NAME, SessionFile};
pub use session::{OAuthRedirect, Session, bearer_token};
pub use supabase::{DEFAULT_OAUTH_PROVIDER, SupabaseConfig, SupabaseSessionProvider};

/// Capability the chat core uses to reach the identity provider.
///
/// The core only reads session presence and the bearer token; refreshing
/// and persisting credentials is the provider's business.
pub trait SessionProvider: Send + Sync {
    /// Current session, or `None` when nobody is signed in.
    fn get_session(&self) -> BoxFuture<'_, SessionResult<Option<Session>>>;

    fn sign_in_with_oauth<'a>(
        &'a self,
        provider: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, SessionResult<OAuthRedirect>>;

    fn sign_out(&self) -> BoxFuture<'_, SessionResult<()>>;
}
