//! Registry mapping notebook identities to live sessions.
//!
//! One session per notebook path; attaching to an already-attached path is
//! rejected rather than silently joined, so callers always know whether
//! they created the session they are using.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{self, Duration};
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::document::jupyter::JupyterDocument;
use crate::document::sync::DocumentSync;
use crate::kernel::channel::KernelChannel;
use crate::kernel::jupyter::JupyterKernel;
use crate::session::machine::NotebookSession;
use crate::{AppError, Result};

/// Normalize a caller-supplied notebook path to its canonical identity.
///
/// Callers routinely omit the extension; the server stores notebooks with
/// it, so the identity always carries it.
#[must_use]
pub fn ensure_ipynb_extension(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.ends_with(".ipynb") {
        trimmed.to_owned()
    } else {
        format!("{trimmed}.ipynb")
    }
}

/// Holds every live [`NotebookSession`], keyed by notebook path.
pub struct SessionRegistry {
    config: Arc<GlobalConfig>,
    sessions: Mutex<HashMap<String, Arc<NotebookSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry sharing the loaded configuration.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a new session for `notebook_path` against the configured
    /// Jupyter server, binding both the kernel channel and the document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyAttached` if a session for this path is
    /// live, and `AppError::AttachFailed` / `AppError::KernelUnavailable`
    /// when either binding cannot be established within the attach timeout.
    pub async fn attach(&self, notebook_path: &str) -> Result<Arc<NotebookSession>> {
        let path = ensure_ipynb_extension(notebook_path);
        {
            let sessions = self.sessions.lock().await;
            if sessions.contains_key(&path) {
                return Err(AppError::AlreadyAttached(path));
            }
        }

        let attach_timeout = Duration::from_secs(self.config.timeouts.attach_seconds);
        let document = time::timeout(
            attach_timeout,
            JupyterDocument::connect(&self.config.server_url, &self.config.token, &path),
        )
        .await
        .map_err(|_| {
            AppError::AttachFailed(format!(
                "document binding for {path} timed out after {}s",
                self.config.timeouts.attach_seconds
            ))
        })??;
        let kernel = time::timeout(
            attach_timeout,
            JupyterKernel::connect(&self.config.server_url, &self.config.token, &path),
        )
        .await
        .map_err(|_| {
            AppError::AttachFailed(format!(
                "kernel binding for {path} timed out after {}s",
                self.config.timeouts.attach_seconds
            ))
        })??;

        self.attach_with(&path, Arc::new(kernel), Arc::new(document))
            .await
    }

    /// Attach a session over pre-built kernel and document bindings.
    ///
    /// # Errors
    ///
    /// As [`Self::attach`], minus the adapter construction failures.
    pub async fn attach_with(
        &self,
        notebook_path: &str,
        kernel: Arc<dyn KernelChannel>,
        document: Arc<dyn DocumentSync>,
    ) -> Result<Arc<NotebookSession>> {
        let path = ensure_ipynb_extension(notebook_path);
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&path) {
            return Err(AppError::AlreadyAttached(path));
        }

        let session = NotebookSession::attach(
            path.clone(),
            Arc::clone(&self.config),
            kernel,
            document,
        )
        .await?;
        sessions.insert(path, Arc::clone(&session));
        Ok(session)
    }

    /// Look up the live session for a notebook path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` when no session is attached for
    /// this path.
    pub async fn get(&self, notebook_path: &str) -> Result<Arc<NotebookSession>> {
        let path = ensure_ipynb_extension(notebook_path);
        let sessions = self.sessions.lock().await;
        sessions.get(&path).cloned().ok_or_else(|| {
            AppError::SessionClosed(format!("no session attached for {path}"))
        })
    }

    /// Close and remove the session for a notebook path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` when no session is attached for
    /// this path.
    pub async fn close(&self, notebook_path: &str) -> Result<()> {
        let path = ensure_ipynb_extension(notebook_path);
        let session = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(&path).ok_or_else(|| {
                AppError::SessionClosed(format!("no session attached for {path}"))
            })?
        };
        session.close().await
    }

    /// Close every live session, used during server shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<NotebookSession>)> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().collect()
        };
        for (path, session) in drained {
            if let Err(err) = session.close().await {
                warn!(%err, notebook_path = %path, "error closing session during shutdown");
            }
        }
        info!("all sessions closed");
    }

    /// Paths of the currently attached sessions.
    pub async fn attached_paths(&self) -> Vec<String> {
        let sessions = self.sessions.lock().await;
        let mut paths: Vec<String> = sessions.keys().cloned().collect();
        paths.sort();
        paths
    }
}
