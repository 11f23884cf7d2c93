//! Session-gated chat page core.
//!
//! [`ChatPage`] owns the page state: the login/chat view, the thread
//! directory and the active conversation. Every transition is published as a
//! whole [`PageState`] snapshot on a `watch` channel, and message fetches are
//! applied only while the selection that started them is still current.
mod attach;
pub mod conversation;
pub mod error;
pub mod gate;
pub mod loader;
pub mod page;
pub mod settings;

#[cfg(test)]
mod fakes;

pub use conversation::{
    ActiveConversation, DetailOutcome, DetailTicket, PendingFile, Selection, SelectionGeneration,
};
pub use error::{ChatError, ChatResult};
pub use gate::{GateOutcome, SessionGate};
pub use loader::{ThreadDetailLoader, ThreadDirectoryLoader};
pub use page::{ChatPage, Notice, NoticeLevel, PageState, PageView, RefreshOutcome};
pub use settings::{SettingsPanel, SettingsState};
