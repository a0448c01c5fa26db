//! Per-invocation working directories.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::{RECV_DIR_PREFIX, SEND_DIR_PREFIX};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Send,
    Receive,
}

impl SessionKind {
    fn prefix(&self) -> &'static str {
        match self {
            SessionKind::Send => SEND_DIR_PREFIX,
            SessionKind::Receive => RECV_DIR_PREFIX,
        }
    }
}

/// A freshly created, uniquely named directory holding one invocation's store.
///
/// Removed by [`SessionDir::remove`] on graceful completion. Dropping it
/// leaves the directory in place.
#[derive(Debug)]
pub struct SessionDir {
    path: PathBuf,
}

impl SessionDir {
    /// Create `<parent>/.sendme-<kind>-<uuid>`.
    pub async fn create(parent: impl AsRef<Path>, kind: SessionKind) -> Result<Self> {
        let name = format!("{}{}", kind.prefix(), Uuid::new_v4().simple());
        Self::create_named(parent.as_ref().join(name)).await
    }

    /// Create a session directory at an exact path. Fails if it exists.
    pub async fn create_named(path: PathBuf) -> Result<Self> {
        match fs::create_dir(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "created session directory");
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::SessionExists { path }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.path).await?;
        info!(path = %self.path.display(), "removed session directory");
        Ok(())
    }
}
