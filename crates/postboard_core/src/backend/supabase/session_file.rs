//! On-disk persistence for the signed-in session.
//!
//! The file holds bearer tokens, so it is created owner-only (0600) on unix
//! and its contents are never logged.

use crate::model::session::Session;
use log::warn;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// JSON file that survives process restarts with the last session.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored session.
    ///
    /// A missing file means "no session". An unreadable or corrupt file is
    /// logged and also treated as "no session".
    pub fn load(&self) -> Option<Session> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(
                    "event=session_file_load module=auth status=error error_code=read_failed error={}",
                    err
                );
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(
                    "event=session_file_load module=auth status=error error_code=decode_failed error={}",
                    err
                );
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_vec_pretty(session).map_err(io::Error::other)?;

        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(&contents)?;
        file.sync_all()
    }

    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
