use std::sync::{Arc, Mutex, PoisonError};

use qanoon_api::{ChatBackend, Message, ThreadId, ThreadSummary};
use qanoon_session::{OAuthRedirect, SessionProvider};
use snafu::ResultExt;
use tokio::sync::{OnceCell, watch};

use crate::conversation::{ActiveConversation, DetailOutcome, DetailTicket, PendingFile};
use crate::error::{ChatResult, SessionSnafu};
use crate::gate::{GateOutcome, SessionGate, current_token};
use crate::loader::{ThreadDetailLoader, ThreadDirectoryLoader};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageView {
    /// The session gate has not finished yet.
    #[default]
    Loading,
    Login,
    Chat,
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Blocking message shown to the user until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Everything the chat page renders, published as one snapshot per transition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageState {
    pub view: PageView,
    /// Thread directory in backend order, newest first.
    pub threads: Vec<ThreadSummary>,
    pub conversation: ActiveConversation,
    pub uploading: bool,
    pub notice: Option<Notice>,
    /// Bumped whenever the directory is replaced or cleared outside activation.
    pub(crate) directory_epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The newest thread became active.
    Selected(ThreadId),
    /// The refreshed directory was empty; the selection was kept.
    EmptyDirectory,
    /// The refresh failed and nothing changed.
    Unchanged,
}

/// Handle to one activation of the chat page. Clones share the same state.
#[derive(Clone)]
pub struct ChatPage {
    session: Arc<dyn SessionProvider>,
    pub(crate) backend: Arc<dyn ChatBackend>,
    gate: SessionGate,
    directory: ThreadDirectoryLoader,
    detail: ThreadDetailLoader,
    state: Arc<Mutex<PageState>>,
    published: Arc<watch::Sender<PageState>>,
    activation: Arc<OnceCell<GateOutcome>>,
}

impl ChatPage {
    pub fn new(session: Arc<dyn SessionProvider>, backend: Arc<dyn ChatBackend>) -> Self {
        let (published, _) = watch::channel(PageState::default());
        Self {
            gate: SessionGate::new(session.clone()),
            directory: ThreadDirectoryLoader::new(backend.clone()),
            detail: ThreadDetailLoader::new(session.clone(), backend.clone()),
            session,
            backend,
            state: Arc::new(Mutex::new(PageState::default())),
            published: Arc::new(published),
            activation: Arc::new(OnceCell::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState> {
        self.published.subscribe()
    }

    pub fn snapshot(&self) -> PageState {
        self.published.borrow().clone()
    }

    pub(crate) fn session(&self) -> &dyn SessionProvider {
        self.session.as_ref()
    }

    /// Applies one transition and publishes the resulting snapshot while the
    /// state is still locked, so observers see transitions in order.
    pub(crate) fn update<R>(&self, apply: impl FnOnce(&mut PageState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let output = apply(&mut state);
        self.published.send_replace(state.clone());
        output
    }

    /// Runs the session gate once and, when it opens, loads the thread directory.
    /// Later calls return the first outcome without querying the session again.
    pub async fn activate(&self) -> GateOutcome {
        self.activation
            .get_or_init(|| self.run_gate())
            .await
            .clone()
    }

    async fn run_gate(&self) -> GateOutcome {
        let outcome = self.gate.check().await;
        match &outcome {
            GateOutcome::Open { token } => {
                let epoch = self.update(|state| {
                    state.view = PageView::Chat;
                    state.directory_epoch
                });
                let threads = self.directory.load(Some(token)).await;
                self.update(|state| {
                    if state.view == PageView::Chat && state.directory_epoch == epoch {
                        state.threads = threads;
                    } else {
                        tracing::debug!("discarding thread directory loaded before a sign out or refresh");
                    }
                });
            }
            GateOutcome::SignedOut => self.update(|state| state.view = PageView::Login),
            GateOutcome::Failed { message } => self.update(|state| {
                state.view = PageView::Failed {
                    message: message.clone(),
                }
            }),
        }
        outcome
    }

    /// Selects `thread`, then fills in its messages unless the selection moved on meanwhile.
    pub async fn select_thread(&self, thread: ThreadSummary) -> DetailOutcome {
        let ticket = self.begin_select(thread);
        let messages = self.detail.load(&ticket.thread_id).await;
        self.finish_select(&ticket, messages)
    }

    pub fn begin_select(&self, thread: ThreadSummary) -> DetailTicket {
        tracing::debug!(thread_id = %thread.id, "selecting thread");
        self.update(|state| state.conversation.select_thread(thread))
    }

    pub fn finish_select(
        &self,
        ticket: &DetailTicket,
        messages: Vec<Message>,
    ) -> DetailOutcome {
        let outcome = self.update(|state| state.conversation.apply_messages(ticket, messages));
        if outcome == DetailOutcome::Stale {
            tracing::debug!(thread_id = %ticket.thread_id, "discarding messages for a superseded selection");
        }
        outcome
    }

    pub fn new_chat(&self) {
        self.update(|state| state.conversation.new_chat());
    }

    pub fn attach_file(&self, file: Option<PendingFile>) {
        self.update(|state| state.conversation.attach_file(file));
    }

    pub fn clear_file(&self) -> bool {
        self.update(|state| state.conversation.clear_file())
    }

    /// Called after a thread was created server-side: refreshes the directory
    /// and makes its newest entry active without fetching its messages.
    pub async fn on_thread_created(&self) -> RefreshOutcome {
        let token = match current_token(self.session(), "refresh-thread-directory").await {
            Ok(token) => token,
            Err(error) => {
                tracing::error!(error = %error, "session lookup failed while refreshing threads");
                return RefreshOutcome::Unchanged;
            }
        };

        let threads = match self.directory.fetch(token.as_deref()).await {
            Ok(threads) => threads,
            Err(error) => {
                tracing::error!(error = %error, "failed to refresh thread directory");
                return RefreshOutcome::Unchanged;
            }
        };

        self.update(|state| {
            let newest = threads.first().cloned();
            state.threads = threads;
            state.directory_epoch += 1;
            match newest {
                Some(thread) => {
                    let thread_id = thread.id.clone();
                    state.conversation.promote_thread(thread);
                    tracing::info!(thread_id = %thread_id, "selected newly created thread");
                    RefreshOutcome::Selected(thread_id)
                }
                None => RefreshOutcome::EmptyDirectory,
            }
        })
    }

    pub async fn sign_in(&self, provider: &str, redirect_to: &str) -> ChatResult<OAuthRedirect> {
        self.session
            .sign_in_with_oauth(provider, redirect_to)
            .await
            .context(SessionSnafu {
                stage: "page-sign-in",
            })
    }

    /// Signs out and returns to the login view. On failure the page is left
    /// as it was and an error notice is raised.
    pub async fn sign_out(&self) -> ChatResult<()> {
        if let Err(error) = self.session.sign_out().await {
            tracing::error!(error = %error, "sign out failed");
            self.update(|state| state.notice = Some(Notice::error("Failed to sign out")));
            return Err(error).context(SessionSnafu {
                stage: "page-sign-out",
            });
        }

        self.update(|state| {
            state.view = PageView::Login;
            state.threads.clear();
            state.directory_epoch += 1;
            state.conversation.new_chat();
            state.uploading = false;
        });
        tracing::info!("signed out");
        Ok(())
    }

    pub fn dismiss_notice(&self) -> Option<Notice> {
        self.update(|state| state.notice.take())
    }
}
