use std::sync::Arc;

use qanoon_api::{ChatBackend, SettingsAck};
use qanoon_session::SessionProvider;
use snafu::ResultExt;

use crate::error::{BackendSnafu, ChatResult};
use crate::gate::current_token;
use crate::page::Notice;

/// Account details and the editable system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettingsState {
    pub email: String,
    /// Draft text; empty means the default prompt is used.
    pub custom_prompt: String,
    pub loading: bool,
    pub saving: bool,
    pub status: Option<Notice>,
}

pub struct SettingsPanel {
    session: Arc<dyn SessionProvider>,
    backend: Arc<dyn ChatBackend>,
    state: SettingsState,
}

impl SettingsPanel {
    pub fn new(session: Arc<dyn SessionProvider>, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            session,
            backend,
            state: SettingsState::default(),
        }
    }

    pub fn state(&self) -> &SettingsState {
        &self.state
    }

    pub fn set_custom_prompt(&mut self, prompt: impl Into<String>) {
        self.state.custom_prompt = prompt.into();
    }

    pub fn can_reset(&self) -> bool {
        !self.state.custom_prompt.is_empty() && !self.state.saving
    }

    pub async fn load(&mut self) -> ChatResult<()> {
        self.state.loading = true;
        let result = self.fetch().await;
        self.state.loading = false;

        match &result {
            Ok(()) => tracing::debug!("loaded user settings"),
            Err(error) => {
                tracing::error!(error = %error, "failed to load settings");
                self.state.status = Some(Notice::error("Failed to load settings"));
            }
        }
        result
    }

    async fn fetch(&mut self) -> ChatResult<()> {
        let token = current_token(self.session.as_ref(), "settings-load-session").await?;
        let settings = self
            .backend
            .get_settings(token.as_deref())
            .await
            .context(BackendSnafu {
                stage: "settings-load",
            })?;
        self.state.email = settings.email.unwrap_or_default();
        self.state.custom_prompt = settings.custom_prompt.unwrap_or_default();
        Ok(())
    }

    /// Saves the draft prompt as typed. A blank draft is sent as `null`, which selects the default prompt.
    pub async fn save(&mut self) -> ChatResult<SettingsAck> {
        let prompt = Some(&self.state.custom_prompt)
            .filter(|prompt| !prompt.trim().is_empty())
            .cloned();

        self.state.saving = true;
        self.state.status = None;
        let result = self.send_save(prompt).await;
        self.state.saving = false;

        self.state.status = Some(match &result {
            Ok(_) => Notice::info("Prompt saved successfully!"),
            Err(error) => {
                tracing::error!(error = %error, "failed to save prompt");
                Notice::error("Failed to save prompt")
            }
        });
        result
    }

    async fn send_save(&self, prompt: Option<String>) -> ChatResult<SettingsAck> {
        let token = current_token(self.session.as_ref(), "settings-save-session").await?;
        self.backend
            .save_prompt(prompt, token.as_deref())
            .await
            .context(BackendSnafu {
                stage: "settings-save-prompt",
            })
    }

    /// Drops the custom prompt server-side and clears the draft on success.
    pub async fn reset(&mut self) -> ChatResult<SettingsAck> {
        self.state.saving = true;
        self.state.status = None;
        let result = self.send_reset().await;
        self.state.saving = false;

        self.state.status = Some(match &result {
            Ok(_) => {
                self.state.custom_prompt.clear();
                Notice::info("Reset to default prompt!")
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to reset prompt");
                Notice::error("Failed to reset prompt")
            }
        });
        result
    }

    async fn send_reset(&self) -> ChatResult<SettingsAck> {
        let token = current_token(self.session.as_ref(), "settings-reset-session").await?;
        self.backend
            .reset_prompt(token.as_deref())
            .await
            .context(BackendSnafu {
                stage: "settings-reset-prompt",
            })
    }
}
