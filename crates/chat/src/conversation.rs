use std::path::Path;

use qanoon_api::{Message, PdfUpload, ThreadId, ThreadSummary};
use snafu::{ResultExt, ensure};

use crate::error::{ChatResult, NotPdfSnafu, ReadFileSnafu};

/// A PDF the user picked to start a new conversation with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    file_name: String,
    bytes: Vec<u8>,
}

impl PendingFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> ChatResult<Self> {
        let file_name = file_name.into();
        ensure!(
            is_pdf_file_name(&file_name),
            NotPdfSnafu {
                stage: "pending-file-new",
                file_name,
            }
        );
        Ok(Self { file_name, bytes })
    }

    pub fn from_path(path: &Path) -> ChatResult<Self> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        ensure!(
            is_pdf_file_name(&file_name),
            NotPdfSnafu {
                stage: "pending-file-from-path",
                file_name,
            }
        );

        let bytes = std::fs::read(path).context(ReadFileSnafu {
            stage: "pending-file-read",
            path: path.to_path_buf(),
        })?;
        Ok(Self { file_name, bytes })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_upload(self) -> PdfUpload {
        PdfUpload::new(self.file_name, self.bytes)
    }
}

fn is_pdf_file_name(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"))
}

/// Monotonic counter bumped on every selection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SelectionGeneration(u64);

impl SelectionGeneration {
    fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Issued when a thread is selected; a detail result must present it to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailTicket {
    pub thread_id: ThreadId,
    pub generation: SelectionGeneration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailOutcome {
    Applied,
    /// The selection moved on while the fetch was in flight.
    Stale,
}

/// What the conversation pane shows. A pending file and a selected thread
/// are separate variants, so they can never coexist.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Selection {
    #[default]
    Empty,
    Thread {
        thread: ThreadSummary,
        messages: Vec<Message>,
    },
    File(PendingFile),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActiveConversation {
    selection: Selection,
    generation: SelectionGeneration,
}

impl ActiveConversation {
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn generation(&self) -> SelectionGeneration {
        self.generation
    }

    pub fn active_thread(&self) -> Option<&ThreadSummary> {
        match &self.selection {
            Selection::Thread { thread, .. } => Some(thread),
            Selection::Empty | Selection::File(_) => None,
        }
    }

    pub fn active_thread_id(&self) -> Option<&ThreadId> {
        self.active_thread().map(|thread| &thread.id)
    }

    pub fn messages(&self) -> &[Message] {
        match &self.selection {
            Selection::Thread { messages, .. } => messages,
            Selection::Empty | Selection::File(_) => &[],
        }
    }

    pub fn pending_file(&self) -> Option<&PendingFile> {
        match &self.selection {
            Selection::File(file) => Some(file),
            Selection::Empty | Selection::Thread { .. } => None,
        }
    }

    /// Selects `thread` with an empty message placeholder and drops any pending file.
    pub fn select_thread(&mut self, thread: ThreadSummary) -> DetailTicket {
        let thread_id = thread.id.clone();
        self.replace(Selection::Thread {
            thread,
            messages: Vec::new(),
        });
        DetailTicket {
            thread_id,
            generation: self.generation,
        }
    }

    pub fn new_chat(&mut self) {
        self.replace(Selection::Empty);
    }

    /// `Some` replaces any thread selection; `None` only clears a pending file.
    pub fn attach_file(&mut self, file: Option<PendingFile>) {
        match file {
            Some(file) => self.replace(Selection::File(file)),
            None => {
                self.clear_file();
            }
        }
    }

    /// Returns whether a pending file was dropped.
    pub fn clear_file(&mut self) -> bool {
        if matches!(self.selection, Selection::File(_)) {
            self.replace(Selection::Empty);
            true
        } else {
            false
        }
    }

    /// Makes `thread` active without scheduling a detail fetch.
    pub fn promote_thread(&mut self, thread: ThreadSummary) {
        self.replace(Selection::Thread {
            thread,
            messages: Vec::new(),
        });
    }

    pub fn apply_messages(&mut self, ticket: &DetailTicket, messages: Vec<Message>) -> DetailOutcome {
        if ticket.generation != self.generation {
            return DetailOutcome::Stale;
        }
        match &mut self.selection {
            Selection::Thread {
                thread,
                messages: current,
            } if thread.id == ticket.thread_id => {
                *current = messages;
                DetailOutcome::Applied
            }
            Selection::Empty | Selection::Thread { .. } | Selection::File(_) => DetailOutcome::Stale,
        }
    }

    fn replace(&mut self, selection: Selection) {
        self.selection = selection;
        self.generation = self.generation.next();
    }
}
