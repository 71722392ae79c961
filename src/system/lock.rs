// src/system/lock.rs

use crate::constants::LOCK_FILENAME;
use crate::system::executor::{ExecutionError, RemoteExecutor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Exit status of the acquire command when the lock file already exists.
const HELD_EXIT_CODE: i32 = 75;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Path '{0}' cannot be quoted for the remote shell.")]
    Quote(String),
    #[error(
        "Another installation script is running against '{root}' on {host}. Remove '{lock}' if no other script is running."
    )]
    Held { host: String, root: String, lock: String },
    #[error("Could not lock '{root}' on {host}: {source}")]
    Execution {
        host: String,
        root: String,
        #[source]
        source: ExecutionError,
    },
}

/// Advisory lock on the install root of one host.
///
/// `<root>/.lock` is created with `noclobber` through the host's executor, so
/// two deployments against the same root exclude each other whichever
/// machine or configuration file they run from. The file holds the owner's
/// pid and is removed when the lock is dropped.
pub struct InstallLock {
    executor: Arc<dyn RemoteExecutor>,
    host: String,
    user: Option<String>,
    path: PathBuf,
}

fn quote(path: &Path) -> Result<String, LockError> {
    let raw = path.to_string_lossy();
    shlex::try_quote(&raw)
        .map(|q| q.into_owned())
        .map_err(|_| LockError::Quote(raw.into_owned()))
}

impl InstallLock {
    /// Takes the lock without waiting.
    pub fn acquire(
        executor: Arc<dyn RemoteExecutor>,
        host: &str,
        user: Option<&str>,
        root: &Path,
    ) -> Result<Self, LockError> {
        let path = root.join(LOCK_FILENAME);
        let command = format!(
            "mkdir -p {root} && {{ (set -C; echo {pid} > {lock}) 2>/dev/null || exit {held}; }}",
            root = quote(root)?,
            pid = std::process::id(),
            lock = quote(&path)?,
            held = HELD_EXIT_CODE,
        );

        match executor.run_remote(&command, host, user) {
            Ok(_) => {}
            Err(ExecutionError::CommandFailed { exit_code, .. }) if exit_code == HELD_EXIT_CODE => {
                return Err(LockError::Held {
                    host: host.to_string(),
                    root: root.display().to_string(),
                    lock: path.display().to_string(),
                });
            }
            Err(source) => {
                return Err(LockError::Execution {
                    host: host.to_string(),
                    root: root.display().to_string(),
                    source,
                });
            }
        }

        log::debug!("Acquired install lock '{}' on {}.", path.display(), host);
        Ok(Self {
            executor,
            host: host.to_string(),
            user: user.map(str::to_string),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let command = match quote(&self.path) {
            Ok(lock) => format!("rm -f {}", lock),
            Err(e) => {
                log::debug!("Failed to release lock on {}: {}", self.host, e);
                return;
            }
        };
        if let Err(e) = self.executor.run_remote(&command, &self.host, self.user.as_deref()) {
            log::debug!(
                "Failed to remove lock '{}' on {}: {}",
                self.path.display(),
                self.host,
                e
            );
        }
    }
}
