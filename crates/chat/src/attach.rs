use qanoon_api::{AddPdfStatus, ThreadId};
use snafu::{OptionExt, ResultExt, ensure};

use crate::conversation::PendingFile;
use crate::error::{
    BackendSnafu, ChatResult, MissingTokenSnafu, NoActiveThreadSnafu, UploadInProgressSnafu,
};
use crate::gate::current_token;
use crate::page::{ChatPage, Notice};

impl ChatPage {
    /// Uploads `file` into the selected thread and raises a notice describing the outcome.
    /// Only one upload runs at a time.
    pub async fn add_pdf_to_active_thread(&self, file: PendingFile) -> ChatResult<AddPdfStatus> {
        let file_name = file.file_name().to_string();
        let thread_id = self.update(|state| -> ChatResult<ThreadId> {
            ensure!(
                !state.uploading,
                UploadInProgressSnafu {
                    stage: "add-pdf-in-progress",
                }
            );
            let thread_id = state
                .conversation
                .active_thread_id()
                .cloned()
                .context(NoActiveThreadSnafu {
                    stage: "add-pdf-active-thread",
                })?;
            state.uploading = true;
            Ok(thread_id)
        })?;
        let result = self.upload_pdf(&thread_id, file).await;

        let notice = match &result {
            Ok(AddPdfStatus::Success) => {
                tracing::info!(thread_id = %thread_id, file_name = %file_name, "added PDF to thread");
                Notice::info(format!("PDF \"{file_name}\" added successfully!"))
            }
            Ok(AddPdfStatus::Exists) => Notice::info("This PDF is already in this thread."),
            Ok(AddPdfStatus::Other(status)) => {
                tracing::warn!(thread_id = %thread_id, status = %status, "unexpected add_pdf status");
                Notice::warning(format!("Unexpected response while adding PDF: {status:?}"))
            }
            Err(error) => {
                tracing::error!(thread_id = %thread_id, error = %error, "failed to add PDF");
                Notice::error("Failed to add PDF")
            }
        };
        self.update(|state| {
            state.uploading = false;
            state.notice = Some(notice);
        });

        result
    }

    async fn upload_pdf(&self, thread_id: &ThreadId, file: PendingFile) -> ChatResult<AddPdfStatus> {
        let token = current_token(self.session(), "add-pdf-session")
            .await?
            .context(MissingTokenSnafu {
                stage: "add-pdf-session",
            })?;

        let response = self
            .backend
            .add_pdf(thread_id, file.into_upload(), &token)
            .await
            .context(BackendSnafu {
                stage: "add-pdf-upload",
            })?;
        Ok(response.outcome())
    }
}
