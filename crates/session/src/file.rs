use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use super::error::{
    CreateDirSnafu, RemoveFileSnafu, RenameTempFileSnafu, SerializeSessionSnafu, SessionResult,
    WriteFileSnafu,
};
use super::session::Session;

pub const SESSION_FILE_NAME: &str = "session.json";

/// JSON mirror of the signed-in session so it survives restarts.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SESSION_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unreadable or corrupt files load as "no session".
    pub fn load(&self) -> Option<Session> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return None,
            Err(error) => {
                tracing::warn!(path = ?self.path, error = %error, "failed to read session file");
                return None;
            }
        };

        match serde_json::from_str::<Session>(&content) {
            Ok(session) => Some(session),
            Err(error) => {
                tracing::warn!(path = ?self.path, error = %error, "ignoring corrupt session file");
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-session-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(session).context(SerializeSessionSnafu {
            stage: "serialize-session-json",
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-session-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.path).context(RenameTempFileSnafu {
            stage: "rename-temporary-session-file",
            from: temp_path,
            to: self.path.clone(),
        })?;

        tracing::debug!(path = ?self.path, "saved session file");
        Ok(())
    }

    pub fn remove(&self) -> SessionResult<()> {
        match std::fs::remove_file(&self.path) {
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            result => result.context(RemoveFileSnafu {
                stage: "remove-session-file",
                path: self.path.clone(),
            }),
        }
    }
}
