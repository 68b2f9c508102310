//! The per-notebook session state machine.
//!
//! One [`NotebookSession`] is the authoritative coordinator for one
//! notebook identity: it owns the lifecycle, serializes mutating
//! operations through a single per-session lock, and reconciles kernel
//! execution events into the document. Operations from any number of
//! concurrent callers funnel through it; a second mutating operation is
//! rejected with `SessionBusy` rather than queued.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::document::sync::{ChangeEvent, DocumentSync};
use crate::kernel::channel::{KernelChannel, KernelEvent};
use crate::models::cell::{CellKind, CellRecord, DocumentSnapshot, OutputFragment};
use crate::models::execution::{
    ExecutionOutcome, ExecutionRequest, ExecutionStatus, OutcomeStatus,
};
use crate::session::guard;
use crate::session::recovery::{self, FailureClass, RetryContext};
use crate::session::state::LifecycleState;
use crate::{AppError, Result};

/// Mutable session bookkeeping behind the state lock.
struct Inner {
    lifecycle: LifecycleState,
    last_execution_id: Option<String>,
    in_flight: Option<ExecutionRequest>,
    /// Most recent document revision this session has observed.
    last_revision: Option<u64>,
}

/// Terminal disposition of one kernel submission, machine-internal.
enum Terminal {
    Completed { execution_count: Option<u32> },
    Failed {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    Interrupted,
}

/// Status payload reported to the calling layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Notebook identity this session is bound to.
    pub notebook_path: String,
    /// Current lifecycle state.
    pub lifecycle: LifecycleState,
    /// Id of the most recently submitted execution.
    pub last_execution_id: Option<String>,
    /// Id of the outstanding execution, when one is in flight.
    pub in_flight_execution_id: Option<String>,
    /// Most recent document revision observed by this session.
    pub document_revision: Option<u64>,
    /// When the session was attached.
    pub attached_at: DateTime<Utc>,
}

/// Authoritative coordinator for one open notebook.
pub struct NotebookSession {
    notebook_path: String,
    config: Arc<GlobalConfig>,
    kernel: Arc<dyn KernelChannel>,
    document: Arc<dyn DocumentSync>,
    inner: Arc<StdMutex<Inner>>,
    /// Single serialization point for mutating operations. Acquired with
    /// `try_lock` so contention surfaces as `SessionBusy`, never a queue.
    op_lock: Arc<AsyncMutex<()>>,
    /// Bumped on restart and close to wake any event-draining loop.
    restart_epoch: watch::Sender<u64>,
    watcher: StdMutex<Option<tokio::task::JoinHandle<()>>>,
    attached_at: DateTime<Utc>,
}

impl NotebookSession {
    /// Bind a kernel and document together for a notebook identity.
    ///
    /// Verifies the document is readable before entering `Idle` and starts
    /// a watcher consuming external change events.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AttachFailed` if the initial document read fails.
    pub async fn attach(
        notebook_path: String,
        config: Arc<GlobalConfig>,
        kernel: Arc<dyn KernelChannel>,
        document: Arc<dyn DocumentSync>,
    ) -> Result<Arc<Self>> {
        let session = Arc::new(Self {
            notebook_path,
            config,
            kernel,
            document,
            inner: Arc::new(StdMutex::new(Inner {
                lifecycle: LifecycleState::Disconnected,
                last_execution_id: None,
                in_flight: None,
                last_revision: None,
            })),
            op_lock: Arc::new(AsyncMutex::new(())),
            restart_epoch: watch::channel(0).0,
            watcher: StdMutex::new(None),
            attached_at: Utc::now(),
        });

        session.set_lifecycle(LifecycleState::Attaching);

        // A readable snapshot proves the document binding; the kernel
        // binding was proven when the adapter connected.
        let snapshot = session.document.snapshot().await.map_err(|err| {
            session.set_lifecycle(LifecycleState::Disconnected);
            AppError::AttachFailed(format!("document unreachable: {err}"))
        })?;
        session.note_revision(snapshot.revision);
        session.set_lifecycle(LifecycleState::Idle);

        session.spawn_change_watcher();
        info!(
            notebook_path = %session.notebook_path,
            revision = snapshot.revision,
            cells = snapshot.cells.len(),
            "session attached"
        );
        Ok(session)
    }

    /// Notebook identity this session coordinates.
    #[must_use]
    pub fn notebook_path(&self) -> &str {
        &self.notebook_path
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        self.inner_lock().lifecycle
    }

    /// Point-in-time view of the cell list.
    ///
    /// Read-only; allowed concurrently with an in-flight execution.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` after close, or a document error.
    pub async fn list_cells(&self) -> Result<DocumentSnapshot> {
        self.ensure_open()?;
        let snapshot = self.document.snapshot().await?;
        self.note_revision(snapshot.revision);
        Ok(snapshot)
    }

    /// Read one cell by stable identity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CellNotFound` if the identity does not exist.
    pub async fn read_cell(&self, cell_id: &str) -> Result<CellRecord> {
        let snapshot = self.list_cells().await?;
        snapshot
            .find_cell(cell_id)
            .cloned()
            .ok_or_else(|| AppError::CellNotFound(cell_id.to_owned()))
    }

    /// Insert a cell; returns the new cell's stable identity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionBusy` while an execution is outstanding,
    /// `AppError::StaleRevision` on revision mismatch.
    pub async fn add_cell(
        &self,
        after_cell_id: Option<&str>,
        kind: CellKind,
        source: &str,
        expected_revision: Option<u64>,
    ) -> Result<String> {
        let _permit = self.acquire_op_permit()?;
        guard::ensure_writable(self.lifecycle())?;

        let cell_id = self
            .document
            .insert_cell(after_cell_id, kind, source, expected_revision)
            .await?;
        info!(notebook_path = %self.notebook_path, cell_id, "cell added");
        Ok(cell_id)
    }

    /// Replace a cell's source text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CellNotFound` / `AppError::StaleRevision` when
    /// the guard rejects the caller's assumptions.
    pub async fn edit_cell(
        &self,
        cell_id: &str,
        source: &str,
        expected_revision: u64,
    ) -> Result<()> {
        let _permit = self.acquire_op_permit()?;
        guard::ensure_writable(self.lifecycle())?;

        let snapshot = self.document.snapshot().await?;
        self.note_revision(snapshot.revision);
        guard::validate_cell(&snapshot, cell_id, Some(expected_revision))?;

        // The adapter re-checks revision and identity atomically under its
        // own lock, so the check-then-apply pair cannot be interleaved.
        self.document
            .replace_cell_source(cell_id, source, expected_revision)
            .await?;
        info!(notebook_path = %self.notebook_path, cell_id, "cell source replaced");
        Ok(())
    }

    /// Delete a cell.
    ///
    /// # Errors
    ///
    /// As [`Self::edit_cell`].
    pub async fn delete_cell(&self, cell_id: &str, expected_revision: u64) -> Result<()> {
        let _permit = self.acquire_op_permit()?;
        guard::ensure_writable(self.lifecycle())?;

        let snapshot = self.document.snapshot().await?;
        self.note_revision(snapshot.revision);
        guard::validate_cell(&snapshot, cell_id, Some(expected_revision))?;

        self.document.delete_cell(cell_id, expected_revision).await?;
        info!(notebook_path = %self.notebook_path, cell_id, "cell deleted");
        Ok(())
    }

    /// Execute a code cell, blocking until a terminal event or `timeout`.
    ///
    /// Streamed fragments are appended to the cell as they arrive, so
    /// partial output is visible to every viewer before completion. On
    /// timeout the caller regains control with `TimedOut` while a detached
    /// task keeps reconciling events; the session stays `Executing` until
    /// the kernel actually reports a terminal event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionBusy`, `AppError::StaleRevision`,
    /// `AppError::CellNotFound`, `AppError::TimedOut`,
    /// `AppError::KernelUnavailable`, or `AppError::KernelRestarted`.
    /// A runtime error in the executed code is not an `Err`: it surfaces
    /// as an outcome with `status = error` after reconciliation.
    pub async fn execute_cell(
        &self,
        cell_id: &str,
        expected_revision: Option<u64>,
        timeout: Duration,
    ) -> Result<ExecutionOutcome> {
        let _permit = self.acquire_op_permit()?;
        guard::ensure_writable(self.lifecycle())?;

        let snapshot = self.document.snapshot().await?;
        self.note_revision(snapshot.revision);
        let cell = guard::validate_execution_target(&snapshot, cell_id, expected_revision)?;
        let code = cell.source.clone();

        self.document.clear_outputs(cell_id).await?;

        let execution_id = self.kernel.submit(&code).await?;
        self.begin_execution(&execution_id, cell_id, snapshot.revision);
        info!(
            notebook_path = %self.notebook_path,
            cell_id,
            execution_id,
            "execution submitted"
        );

        let deadline = Instant::now() + timeout;
        let mut epoch_rx = self.restart_epoch.subscribe();
        let mut outputs = Vec::new();
        let terminal = self
            .drain(&execution_id, Some(cell_id), deadline, &mut epoch_rx, &mut outputs)
            .await?;

        match terminal {
            Terminal::Completed { execution_count } => {
                // The terminal event is already consumed; a failed document
                // write must not leave the session wedged in `Executing`.
                if let Some(count) = execution_count {
                    if let Err(err) = self.document.set_execution_count(cell_id, count).await {
                        self.finish(ExecutionStatus::Failed);
                        return Err(err);
                    }
                }
                self.finish(ExecutionStatus::Completed);
                info!(execution_id, ?execution_count, "execution completed");
                Ok(ExecutionOutcome {
                    execution_id,
                    status: OutcomeStatus::Ok,
                    execution_count,
                    outputs,
                })
            }
            Terminal::Interrupted => {
                self.finish(ExecutionStatus::Failed);
                info!(execution_id, "execution interrupted");
                Ok(ExecutionOutcome {
                    execution_id,
                    status: OutcomeStatus::Interrupted,
                    execution_count: None,
                    outputs,
                })
            }
            Terminal::Failed {
                ename,
                evalue,
                traceback,
            } => {
                self.reconcile_error(cell_id, &ename, &evalue, traceback, &mut outputs)
                    .await;
                self.recover(cell_id, &code, execution_id, ename, evalue, deadline, &mut epoch_rx, outputs)
                    .await
            }
        }
    }

    /// Add a cell installing `packages` and execute it.
    ///
    /// The install runs through the normal execute path so its output is
    /// part of the document history, matching how an operator would do it.
    ///
    /// # Errors
    ///
    /// As [`Self::add_cell`] and [`Self::execute_cell`].
    pub async fn install_packages(
        &self,
        packages: &str,
        timeout: Duration,
    ) -> Result<ExecutionOutcome> {
        let command =
            recovery::install_command(&self.config.remediation.install_command, packages);
        let cell_id = self.add_cell(None, CellKind::Code, &command, None).await?;
        self.execute_cell(&cell_id, None, timeout).await
    }

    /// Best-effort signal to abort the running execution.
    ///
    /// A no-op when nothing is running; the eventual terminal event is
    /// still reconciled normally.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` after close.
    pub async fn interrupt(&self) -> Result<()> {
        match self.lifecycle() {
            LifecycleState::Closed => Err(AppError::SessionClosed(
                "session is closed; re-attach to continue".into(),
            )),
            LifecycleState::Executing | LifecycleState::Recovering => {
                info!(notebook_path = %self.notebook_path, "interrupt requested");
                self.kernel.interrupt().await
            }
            _ => Ok(()),
        }
    }

    /// Restart the kernel, discarding all interpreter state.
    ///
    /// Any in-flight execution request is forced to failed; waiting
    /// callers observe `KernelRestarted`. Cell execution counts in the
    /// document are left untouched (history is preserved).
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` after close, or
    /// `AppError::KernelFault` if the restart request fails.
    pub async fn restart(&self) -> Result<()> {
        self.ensure_open()?;
        self.kernel.restart().await?;

        {
            let mut inner = self.inner_lock();
            if let Some(request) = inner.in_flight.take() {
                warn!(
                    execution_id = %request.execution_id,
                    "in-flight execution invalidated by restart"
                );
            }
            if matches!(
                inner.lifecycle,
                LifecycleState::Executing | LifecycleState::Recovering
            ) {
                inner.lifecycle = LifecycleState::Idle;
            }
        }
        self.restart_epoch.send_modify(|epoch| *epoch += 1);
        info!(notebook_path = %self.notebook_path, "kernel restarted");
        Ok(())
    }

    /// Release the kernel and document bindings.
    ///
    /// Terminal: every subsequent operation fails with `SessionClosed`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` if already closed.
    pub async fn close(&self) -> Result<()> {
        {
            let mut inner = self.inner_lock();
            if inner.lifecycle == LifecycleState::Closed {
                return Err(AppError::SessionClosed("session already closed".into()));
            }
            inner.lifecycle = LifecycleState::Closed;
            inner.in_flight = None;
        }
        // Wake any draining loop so it observes the closed state.
        self.restart_epoch.send_modify(|epoch| *epoch += 1);

        if let Some(handle) = self.watcher_lock().take() {
            handle.abort();
        }
        if let Err(err) = self.kernel.disconnect().await {
            warn!(%err, "error releasing kernel binding");
        }
        info!(notebook_path = %self.notebook_path, "session closed");
        Ok(())
    }

    /// Current status payload for the calling layer.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let inner = self.inner_lock();
        SessionStatus {
            notebook_path: self.notebook_path.clone(),
            lifecycle: inner.lifecycle,
            last_execution_id: inner.last_execution_id.clone(),
            in_flight_execution_id: inner
                .in_flight
                .as_ref()
                .map(|request| request.execution_id.clone()),
            document_revision: inner.last_revision,
            attached_at: self.attached_at,
        }
    }

    // ── internal ────────────────────────────────────────

    /// Drain kernel events for `execution_id` until its terminal event.
    ///
    /// Fragments are appended to `cell_id` (when given) as they arrive and
    /// collected into `outputs`. Returns `TimedOut` after `deadline`,
    /// having handed reconciliation to a detached task; returns
    /// `KernelRestarted` when a restart invalidates the execution, and
    /// `SessionClosed` when the session closes mid-drain.
    async fn drain(
        &self,
        execution_id: &str,
        cell_id: Option<&str>,
        deadline: Instant,
        epoch_rx: &mut watch::Receiver<u64>,
        outputs: &mut Vec<OutputFragment>,
    ) -> Result<Terminal> {
        loop {
            tokio::select! {
                _ = epoch_rx.changed() => {
                    if self.lifecycle() == LifecycleState::Closed {
                        return Err(AppError::SessionClosed(
                            "session closed while execution was in flight".into(),
                        ));
                    }
                    return Err(AppError::KernelRestarted(
                        "kernel restarted while execution was in flight".into(),
                    ));
                }
                () = time::sleep_until(deadline) => {
                    self.spawn_reconcile(cell_id.map(str::to_owned), execution_id.to_owned());
                    return Err(AppError::TimedOut(format!(
                        "execution {execution_id} produced no terminal event in time; \
                         it continues in the background"
                    )));
                }
                event = self.kernel.next_event() => match event {
                    Err(err) => return Err(self.channel_fault(cell_id, &err).await),
                    Ok(event) if event.execution_id() != execution_id => {
                        debug!(
                            got = event.execution_id(),
                            want = execution_id,
                            "skipping event for another execution"
                        );
                    }
                    Ok(KernelEvent::Fragment { fragment, .. }) => {
                        self.mark_running();
                        outputs.push(fragment.clone());
                        if let Some(id) = cell_id {
                            if let Err(err) = self.document.append_output(id, fragment).await {
                                warn!(%err, cell_id = id, "failed to append output fragment");
                            }
                        }
                    }
                    Ok(KernelEvent::Completed { execution_count, .. }) => {
                        return Ok(Terminal::Completed { execution_count });
                    }
                    Ok(KernelEvent::Failed { ename, evalue, traceback, .. }) => {
                        return Ok(Terminal::Failed { ename, evalue, traceback });
                    }
                    Ok(KernelEvent::Interrupted { .. }) => {
                        return Ok(Terminal::Interrupted);
                    }
                }
            }
        }
    }

    /// Apply the failure recovery policy after a terminal failure.
    #[allow(clippy::too_many_arguments)]
    async fn recover(
        &self,
        cell_id: &str,
        code: &str,
        original_execution_id: String,
        ename: String,
        evalue: String,
        deadline: Instant,
        epoch_rx: &mut watch::Receiver<u64>,
        original_outputs: Vec<OutputFragment>,
    ) -> Result<ExecutionOutcome> {
        let classification = recovery::classify(&ename, &evalue);
        let mut ctx = RetryContext::new(original_execution_id.clone(), classification.clone());

        if !ctx.may_remediate(self.config.remediation.enabled) {
            self.finish(ExecutionStatus::Failed);
            info!(execution_id = %original_execution_id, ename, "failure surfaced without retry");
            return Ok(ExecutionOutcome {
                execution_id: original_execution_id,
                status: OutcomeStatus::Error { ename, evalue },
                execution_count: None,
                outputs: original_outputs,
            });
        }
        let FailureClass::MissingDependency { module } = classification else {
            // may_remediate only passes for MissingDependency.
            self.finish(ExecutionStatus::Failed);
            return Ok(ExecutionOutcome {
                execution_id: original_execution_id,
                status: OutcomeStatus::Error { ename, evalue },
                execution_count: None,
                outputs: original_outputs,
            });
        };

        self.set_lifecycle(LifecycleState::Recovering);
        info!(module, execution_id = %original_execution_id, "attempting dependency remediation");

        // One install attempt through the kernel, not written to the cell.
        let command =
            recovery::install_command(&self.config.remediation.install_command, &module);
        let install_id = match self.kernel.submit(&command).await {
            Ok(id) => id,
            Err(err) => {
                self.finish(ExecutionStatus::Failed);
                return Err(err);
            }
        };
        let mut install_outputs = Vec::new();
        let install_terminal = self
            .drain(&install_id, None, deadline, epoch_rx, &mut install_outputs)
            .await?;
        ctx.mark_remediated();

        match install_terminal {
            Terminal::Interrupted => {
                // Operator aborted the install; surface the original failure.
                self.finish(ExecutionStatus::Failed);
                return Ok(ExecutionOutcome {
                    execution_id: original_execution_id,
                    status: OutcomeStatus::Error { ename, evalue },
                    execution_count: None,
                    outputs: original_outputs,
                });
            }
            Terminal::Failed {
                ename: install_ename,
                ..
            } => {
                // The retry below gives the definitive answer either way.
                warn!(module, install_ename, "dependency install reported an error");
            }
            Terminal::Completed { .. } => {
                debug!(module, "dependency install completed");
            }
        }

        // Resubmit the original code exactly once.
        if let Err(err) = self.document.clear_outputs(cell_id).await {
            self.finish(ExecutionStatus::Failed);
            return Err(err);
        }
        let retry_id = match self.kernel.submit(code).await {
            Ok(id) => id,
            Err(err) => {
                self.finish(ExecutionStatus::Failed);
                return Err(err);
            }
        };
        {
            let mut inner = self.inner_lock();
            inner.last_execution_id = Some(retry_id.clone());
            inner.in_flight = Some(ExecutionRequest::new(
                retry_id.clone(),
                cell_id.to_owned(),
                inner.last_revision.unwrap_or_default(),
            ));
        }
        info!(execution_id = %retry_id, "resubmitted original code after remediation");

        let mut retry_outputs = Vec::new();
        let terminal = self
            .drain(&retry_id, Some(cell_id), deadline, epoch_rx, &mut retry_outputs)
            .await?;

        match terminal {
            Terminal::Completed { execution_count } => {
                if let Some(count) = execution_count {
                    if let Err(err) = self.document.set_execution_count(cell_id, count).await {
                        self.finish(ExecutionStatus::Failed);
                        return Err(err);
                    }
                }
                self.finish(ExecutionStatus::Completed);
                info!(execution_id = %retry_id, "remediated execution completed");
                Ok(ExecutionOutcome {
                    execution_id: retry_id,
                    status: OutcomeStatus::Ok,
                    execution_count,
                    outputs: retry_outputs,
                })
            }
            Terminal::Interrupted => {
                self.finish(ExecutionStatus::Failed);
                Ok(ExecutionOutcome {
                    execution_id: retry_id,
                    status: OutcomeStatus::Interrupted,
                    execution_count: None,
                    outputs: retry_outputs,
                })
            }
            Terminal::Failed {
                ename: retry_ename,
                evalue: retry_evalue,
                traceback,
            } => {
                // Remediation budget spent: the resubmission's failure is
                // surfaced verbatim, not the original's.
                self.reconcile_error(cell_id, &retry_ename, &retry_evalue, traceback, &mut retry_outputs)
                    .await;
                self.finish(ExecutionStatus::Failed);
                info!(execution_id = %retry_id, retry_ename, "retry failed; surfacing second failure");
                Ok(ExecutionOutcome {
                    execution_id: retry_id,
                    status: OutcomeStatus::Error {
                        ename: retry_ename,
                        evalue: retry_evalue,
                    },
                    execution_count: None,
                    outputs: retry_outputs,
                })
            }
        }
    }

    /// Append the terminal error as an output fragment so the document's
    /// output history reflects the failure.
    async fn reconcile_error(
        &self,
        cell_id: &str,
        ename: &str,
        evalue: &str,
        traceback: Vec<String>,
        outputs: &mut Vec<OutputFragment>,
    ) {
        let fragment = OutputFragment::Error {
            ename: ename.to_owned(),
            evalue: evalue.to_owned(),
            traceback,
        };
        outputs.push(fragment.clone());
        if let Err(err) = self.document.append_output(cell_id, fragment).await {
            warn!(%err, cell_id, "failed to reconcile error output");
        }
    }

    /// Handle a kernel channel fault mid-drain: restart the kernel and
    /// surface `KernelRestarted` without resubmitting, since interpreter
    /// state is gone and a silent resubmit could reorder dependent work.
    async fn channel_fault(&self, cell_id: Option<&str>, err: &AppError) -> AppError {
        warn!(%err, "kernel channel fault during execution");
        if let Err(restart_err) = self.kernel.restart().await {
            warn!(%restart_err, "kernel restart after fault failed");
        }
        if let Some(id) = cell_id {
            let fragment = OutputFragment::Error {
                ename: "KernelRestarted".into(),
                evalue: err.to_string(),
                traceback: Vec::new(),
            };
            if let Err(doc_err) = self.document.append_output(id, fragment).await {
                warn!(%doc_err, "failed to record kernel fault in document");
            }
        }
        self.finish(ExecutionStatus::Failed);
        AppError::KernelRestarted(format!("kernel connection lost: {err}"))
    }

    /// Continue reconciling an execution after the caller gave up waiting.
    fn spawn_reconcile(&self, cell_id: Option<String>, execution_id: String) {
        let kernel = Arc::clone(&self.kernel);
        let document = Arc::clone(&self.document);
        let inner = Arc::clone(&self.inner);
        let mut epoch_rx = self.restart_epoch.subscribe();
        info!(execution_id, "caller timed out; reconciling execution in the background");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Restart or close already reset the session state.
                    _ = epoch_rx.changed() => return,
                    event = kernel.next_event() => match event {
                        Err(err) => {
                            warn!(%err, "kernel channel fault during deferred reconcile");
                            break;
                        }
                        Ok(event) if event.execution_id() != execution_id => {}
                        Ok(KernelEvent::Fragment { fragment, .. }) => {
                            if let Some(id) = cell_id.as_deref() {
                                if let Err(err) = document.append_output(id, fragment).await {
                                    warn!(%err, "deferred append failed");
                                }
                            }
                        }
                        Ok(KernelEvent::Completed { execution_count, .. }) => {
                            if let (Some(id), Some(count)) = (cell_id.as_deref(), execution_count) {
                                if let Err(err) = document.set_execution_count(id, count).await {
                                    warn!(%err, "deferred execution count update failed");
                                }
                            }
                            break;
                        }
                        Ok(KernelEvent::Failed { ename, evalue, traceback, .. }) => {
                            if let Some(id) = cell_id.as_deref() {
                                let fragment = OutputFragment::Error { ename, evalue, traceback };
                                if let Err(err) = document.append_output(id, fragment).await {
                                    warn!(%err, "deferred error reconcile failed");
                                }
                            }
                            break;
                        }
                        Ok(KernelEvent::Interrupted { .. }) => break,
                    }
                }
            }

            let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
            guard.in_flight = None;
            if matches!(
                guard.lifecycle,
                LifecycleState::Executing | LifecycleState::Recovering
            ) {
                guard.lifecycle = LifecycleState::Idle;
            }
        });
    }

    /// Track externally-originated edits for status reporting.
    fn spawn_change_watcher(&self) {
        let mut changes = self.document.subscribe();
        let inner = Arc::clone(&self.inner);
        let notebook_path = self.notebook_path.clone();

        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(ChangeEvent::ExternalEdit { revision }) => {
                        debug!(notebook_path, revision, "external edit observed");
                        let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
                        guard.last_revision = Some(revision);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(notebook_path, skipped, "change watcher lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *self.watcher_lock() = Some(handle);
    }

    fn acquire_op_permit(&self) -> Result<tokio::sync::OwnedMutexGuard<()>> {
        Arc::clone(&self.op_lock).try_lock_owned().map_err(|_| {
            AppError::SessionBusy("another operation holds the session".into())
        })
    }

    fn begin_execution(&self, execution_id: &str, cell_id: &str, revision: u64) {
        let mut inner = self.inner_lock();
        inner.lifecycle = LifecycleState::Executing;
        inner.last_execution_id = Some(execution_id.to_owned());
        inner.in_flight = Some(ExecutionRequest::new(
            execution_id.to_owned(),
            cell_id.to_owned(),
            revision,
        ));
    }

    fn mark_running(&self) {
        let mut inner = self.inner_lock();
        if let Some(request) = inner.in_flight.as_mut() {
            request.status = ExecutionStatus::Running;
        }
    }

    /// Reconcile the in-flight request and return to `Idle`.
    fn finish(&self, status: ExecutionStatus) {
        let mut inner = self.inner_lock();
        if let Some(mut request) = inner.in_flight.take() {
            request.status = status;
        }
        if inner.lifecycle != LifecycleState::Closed {
            inner.lifecycle = LifecycleState::Idle;
        }
    }

    fn set_lifecycle(&self, next: LifecycleState) {
        let mut inner = self.inner_lock();
        if !inner.lifecycle.can_transition_to(next) {
            warn!(
                from = %inner.lifecycle,
                to = %next,
                "illegal lifecycle transition requested"
            );
        }
        inner.lifecycle = next;
    }

    fn note_revision(&self, revision: u64) {
        self.inner_lock().last_revision = Some(revision);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.lifecycle() == LifecycleState::Closed {
            return Err(AppError::SessionClosed(
                "session is closed; re-attach to continue".into(),
            ));
        }
        Ok(())
    }

    fn inner_lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watcher_lock(&self) -> std::sync::MutexGuard<'_, Option<tokio::task::JoinHandle<()>>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for NotebookSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotebookSession")
            .field("notebook_path", &self.notebook_path)
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

impl Drop for NotebookSession {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher_lock().take() {
            handle.abort();
        }
    }
}
