use std::sync::Arc;

use qanoon_api::{ApiResult, ChatBackend, Message, ThreadId, ThreadSummary};
use qanoon_session::SessionProvider;

use crate::gate::current_token;

/// Fetches the signed-in user's thread directory.
#[derive(Clone)]
pub struct ThreadDirectoryLoader {
    backend: Arc<dyn ChatBackend>,
}

impl ThreadDirectoryLoader {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Like [`Self::load`], but transport and HTTP failures are returned to the
    /// caller. A body that is not a list still yields an empty directory.
    pub async fn fetch(&self, token: Option<&str>) -> ApiResult<Vec<ThreadSummary>> {
        match self.backend.list_threads(token).await {
            Ok(threads) => {
                tracing::debug!(count = threads.len(), "loaded thread directory");
                Ok(threads)
            }
            Err(error) if error.is_shape_error() => {
                tracing::warn!(error = %error, "thread directory payload is not a list; using empty directory");
                Ok(Vec::new())
            }
            Err(error) => Err(error),
        }
    }

    /// Never fails; every error degrades to an empty directory.
    pub async fn load(&self, token: Option<&str>) -> Vec<ThreadSummary> {
        self.fetch(token).await.unwrap_or_else(|error| {
            tracing::error!(error = %error, stage = error.stage(), "failed to load thread directory");
            Vec::new()
        })
    }
}

/// Fetches the messages of one thread with a freshly queried token.
#[derive(Clone)]
pub struct ThreadDetailLoader {
    session: Arc<dyn SessionProvider>,
    backend: Arc<dyn ChatBackend>,
}

impl ThreadDetailLoader {
    pub fn new(session: Arc<dyn SessionProvider>, backend: Arc<dyn ChatBackend>) -> Self {
        Self { session, backend }
    }

    /// Never fails; session, transport and shape errors all degrade to no messages.
    pub async fn load(&self, thread_id: &ThreadId) -> Vec<Message> {
        let token = match current_token(self.session.as_ref(), "thread-detail-session").await {
            Ok(token) => token,
            Err(error) => {
                tracing::error!(thread_id = %thread_id, error = %error, "session lookup failed before loading thread");
                return Vec::new();
            }
        };

        match self.backend.get_thread(thread_id, token.as_deref()).await {
            Ok(detail) => {
                tracing::debug!(thread_id = %thread_id, count = detail.messages.len(), "loaded thread messages");
                detail.messages
            }
            Err(error) if error.is_shape_error() => {
                tracing::warn!(thread_id = %thread_id, error = %error, "thread detail payload has unexpected shape");
                Vec::new()
            }
            Err(error) => {
                tracing::error!(thread_id = %thread_id, error = %error, "failed to load thread messages");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use qanoon_session::Session;
    use serde_json::json;

    use super::*;
    use crate::fakes::{BackendCall, FakeBackend, FakeSession};

    #[tokio::test]
    async fn directory_keeps_backend_order() {
        let backend = FakeBackend::new().with_directory_json(json!([
            { "thread_id": "t1", "preview": "Hi" },
            { "thread_id": "t2", "preview": "Bye" },
        ]));
        let loader = ThreadDirectoryLoader::new(backend.clone());

        let threads = loader.load(Some("token")).await;

        let ids: Vec<_> = threads.iter().map(|thread| thread.id.as_str()).collect();
        assert_eq!(ids, ["t1", "t2"]);
        assert_eq!(threads[0].display_title(), "Hi");
        assert_eq!(
            backend.calls(),
            vec![BackendCall::ListThreads {
                token: Some("token".to_string())
            }]
        );
    }

    #[tokio::test]
    async fn non_list_directory_is_empty_not_an_error() {
        let backend = FakeBackend::new().with_directory_json(json!({ "detail": "Unauthorized" }));
        let loader = ThreadDirectoryLoader::new(backend);

        assert_eq!(loader.fetch(None).await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn http_failure_degrades_to_empty_on_load_only() {
        let backend = FakeBackend::new().with_directory_status(500);
        let loader = ThreadDirectoryLoader::new(backend);

        assert!(loader.fetch(Some("token")).await.is_err());
        assert!(loader.load(Some("token")).await.is_empty());
    }

    #[tokio::test]
    async fn absent_token_still_calls_the_backend() {
        let backend = FakeBackend::new().with_directory_json(json!([]));
        let loader = ThreadDirectoryLoader::new(backend.clone());

        loader.load(None).await;

        assert_eq!(backend.calls(), vec![BackendCall::ListThreads { token: None }]);
    }

    #[tokio::test]
    async fn detail_without_messages_is_empty() {
        let backend = FakeBackend::new().with_thread_json("t1", json!({}));
        let loader = ThreadDetailLoader::new(
            FakeSession::signed_in(Session::new("token")),
            backend.clone(),
        );

        assert!(loader.load(&ThreadId::from("t1")).await.is_empty());
        assert_eq!(
            backend.calls(),
            vec![BackendCall::GetThread {
                thread_id: "t1".to_string(),
                token: Some("token".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn detail_requeries_the_session_each_time() {
        let session = FakeSession::signed_in(Session::new("token"));
        let backend = FakeBackend::new().with_thread_json(
            "t1",
            json!({ "thread_id": "t1", "messages": [{ "role": "user", "content": "hello" }] }),
        );
        let loader = ThreadDetailLoader::new(session.clone(), backend.clone());

        let messages = loader.load(&ThreadId::from("t1")).await;
        session.set_session(None);
        loader.load(&ThreadId::from("t1")).await;

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "hello");
        assert_eq!(session.get_session_calls(), 2);
        assert_eq!(
            backend.calls().last(),
            Some(&BackendCall::GetThread {
                thread_id: "t1".to_string(),
                token: None,
            })
        );
    }

    #[tokio::test]
    async fn detail_errors_degrade_to_empty() {
        let backend = FakeBackend::new()
            .with_thread_status("t1", 404)
            .with_thread_json("t2", json!(["not", "an", "object"]));
        let loader = ThreadDetailLoader::new(FakeSession::signed_in(Session::new("token")), backend.clone());

        assert!(loader.load(&ThreadId::from("t1")).await.is_empty());
        assert!(loader.load(&ThreadId::from("t2")).await.is_empty());

        let failing = ThreadDetailLoader::new(FakeSession::failing(), backend.clone());
        assert!(failing.load(&ThreadId::from("t1")).await.is_empty());
        assert_eq!(backend.calls().len(), 2);
    }
}
