//! Shared fakes and builders for integration tests.
//!
//! `FakeKernel` replays scripted event sequences per submission and
//! `FakeDocument` applies the same revision rules as the live adapter,
//! so tests drive a real `NotebookSession` without a Jupyter server.

#![allow(dead_code)] // Each test file links its own copy of the helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};

use notebook_mcp::config::GlobalConfig;
use notebook_mcp::document::sync::{ChangeEvent, DocumentSync};
use notebook_mcp::kernel::channel::{KernelChannel, KernelEvent};
use notebook_mcp::models::cell::{CellKind, CellRecord, DocumentSnapshot, OutputFragment};
use notebook_mcp::{AppError, Result};

/// Scripted event for one submission, before its execution id is known.
#[derive(Debug, Clone)]
pub enum Ev {
    Stream(&'static str),
    Completed(Option<u32>),
    Failed {
        ename: &'static str,
        evalue: &'static str,
    },
    Interrupted,
    /// Deliver a channel fault to the consumer.
    Fault,
}

/// Kernel channel whose responses are scripted per submission.
///
/// An empty (or missing) script produces no events, which exercises the
/// timeout path. Events for later delivery can be pushed with [`emit`].
pub struct FakeKernel {
    scripts: StdMutex<VecDeque<Vec<Ev>>>,
    submissions: StdMutex<Vec<(String, String)>>,
    events_tx: mpsc::UnboundedSender<Result<KernelEvent>>,
    events_rx: AsyncMutex<mpsc::UnboundedReceiver<Result<KernelEvent>>>,
    next_id: AtomicUsize,
    pub interrupts: AtomicUsize,
    pub restarts: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl FakeKernel {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            scripts: StdMutex::new(VecDeque::new()),
            submissions: StdMutex::new(Vec::new()),
            events_tx,
            events_rx: AsyncMutex::new(events_rx),
            next_id: AtomicUsize::new(0),
            interrupts: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    /// Queue the event script for the next submission.
    pub fn script(&self, events: Vec<Ev>) {
        self.scripts.lock().unwrap().push_back(events);
    }

    /// Code strings submitted so far, in order.
    pub fn submitted_code(&self) -> Vec<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .map(|(_, code)| code.clone())
            .collect()
    }

    /// Execution id of the most recent submission.
    pub fn last_execution_id(&self) -> Option<String> {
        self.submissions
            .lock()
            .unwrap()
            .last()
            .map(|(id, _)| id.clone())
    }

    /// Deliver events for an execution after the fact.
    pub fn emit(&self, execution_id: &str, events: Vec<Ev>) {
        for event in events {
            let _ = self.events_tx.send(translate(&event, execution_id));
        }
    }
}

fn translate(event: &Ev, execution_id: &str) -> Result<KernelEvent> {
    let execution_id = execution_id.to_owned();
    match event {
        Ev::Stream(text) => Ok(KernelEvent::Fragment {
            execution_id,
            fragment: OutputFragment::Stream {
                name: "stdout".into(),
                text: (*text).to_owned(),
            },
        }),
        Ev::Completed(execution_count) => Ok(KernelEvent::Completed {
            execution_id,
            execution_count: *execution_count,
        }),
        Ev::Failed { ename, evalue } => Ok(KernelEvent::Failed {
            execution_id,
            ename: (*ename).to_owned(),
            evalue: (*evalue).to_owned(),
            traceback: vec![format!("{ename}: {evalue}")],
        }),
        Ev::Interrupted => Ok(KernelEvent::Interrupted { execution_id }),
        Ev::Fault => Err(AppError::KernelFault("scripted fault".into())),
    }
}

#[async_trait]
impl KernelChannel for FakeKernel {
    async fn submit(&self, code: &str) -> Result<String> {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let execution_id = format!("exec-{seq}");
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        for event in &script {
            let _ = self.events_tx.send(translate(event, &execution_id));
        }
        self.submissions
            .lock()
            .unwrap()
            .push((execution_id.clone(), code.to_owned()));
        Ok(execution_id)
    }

    async fn next_event(&self) -> Result<KernelEvent> {
        let mut rx = self.events_rx.lock().await;
        match rx.recv().await {
            Some(event) => event,
            None => Err(AppError::KernelFault("event stream closed".into())),
        }
    }

    async fn interrupt(&self) -> Result<()> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct DocState {
    revision: u64,
    cells: Vec<CellRecord>,
}

/// In-memory document applying the live adapter's revision rules.
pub struct FakeDocument {
    state: StdMutex<DocState>,
    changes: broadcast::Sender<ChangeEvent>,
    fail_set_execution_count: AtomicBool,
    clear_outputs_calls: AtomicUsize,
    fail_clear_outputs_on_call: AtomicUsize,
}

impl FakeDocument {
    pub fn new() -> Arc<Self> {
        Self::with_cells(Vec::new())
    }

    pub fn with_cells(cells: Vec<CellRecord>) -> Arc<Self> {
        let (changes, _) = broadcast::channel(16);
        Arc::new(Self {
            state: StdMutex::new(DocState { revision: 1, cells }),
            changes,
            fail_set_execution_count: AtomicBool::new(false),
            clear_outputs_calls: AtomicUsize::new(0),
            fail_clear_outputs_on_call: AtomicUsize::new(0),
        })
    }

    /// Make the next `set_execution_count` fail with a document error.
    pub fn fail_next_set_execution_count(&self) {
        self.fail_set_execution_count.store(true, Ordering::SeqCst);
    }

    /// Make the n-th `clear_outputs` call (1-based) fail.
    pub fn fail_clear_outputs_on_call(&self, call: usize) {
        self.fail_clear_outputs_on_call.store(call, Ordering::SeqCst);
    }

    /// Build a code cell with a predictable identity for assertions.
    pub fn code_cell(id: &str, position: usize, source: &str) -> CellRecord {
        let mut cell = CellRecord::new(position, CellKind::Code, source);
        cell.id = id.into();
        cell
    }

    /// Build a markdown cell with a predictable identity.
    pub fn markdown_cell(id: &str, position: usize, source: &str) -> CellRecord {
        let mut cell = CellRecord::new(position, CellKind::Markdown, source);
        cell.id = id.into();
        cell
    }

    /// Advance the revision as a human edit in the UI would.
    pub fn simulate_external_edit(&self) {
        let revision = {
            let mut state = self.state.lock().unwrap();
            state.revision += 1;
            state.revision
        };
        let _ = self.changes.send(ChangeEvent::ExternalEdit { revision });
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().unwrap().revision
    }

    /// Clone a cell for assertions.
    pub fn cell(&self, cell_id: &str) -> Option<CellRecord> {
        self.state
            .lock()
            .unwrap()
            .cells
            .iter()
            .find(|cell| cell.id == cell_id)
            .cloned()
    }

    fn check_revision(state: &DocState, expected: u64) -> Result<()> {
        if expected != state.revision {
            return Err(AppError::StaleRevision {
                expected,
                actual: state.revision,
            });
        }
        Ok(())
    }

    fn reindex(state: &mut DocState) {
        for (position, cell) in state.cells.iter_mut().enumerate() {
            cell.position = position;
        }
    }
}

#[async_trait]
impl DocumentSync for FakeDocument {
    async fn snapshot(&self) -> Result<DocumentSnapshot> {
        let state = self.state.lock().unwrap();
        Ok(DocumentSnapshot {
            revision: state.revision,
            cells: state.cells.clone(),
        })
    }

    async fn insert_cell(
        &self,
        after_cell_id: Option<&str>,
        kind: CellKind,
        source: &str,
        expected_revision: Option<u64>,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(expected) = expected_revision {
            Self::check_revision(&state, expected)?;
        }
        let index = match after_cell_id {
            Some(anchor) => {
                let position = state
                    .cells
                    .iter()
                    .position(|cell| cell.id == anchor)
                    .ok_or_else(|| AppError::CellNotFound(anchor.to_owned()))?;
                position + 1
            }
            None => state.cells.len(),
        };
        let cell = CellRecord::new(index, kind, source);
        let id = cell.id.clone();
        state.cells.insert(index, cell);
        Self::reindex(&mut state);
        state.revision += 1;
        Ok(id)
    }

    async fn replace_cell_source(
        &self,
        cell_id: &str,
        source: &str,
        expected_revision: u64,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_revision(&state, expected_revision)?;
        let cell = state
            .cells
            .iter_mut()
            .find(|cell| cell.id == cell_id)
            .ok_or_else(|| AppError::CellNotFound(cell_id.to_owned()))?;
        cell.source = source.to_owned();
        state.revision += 1;
        Ok(())
    }

    async fn delete_cell(&self, cell_id: &str, expected_revision: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_revision(&state, expected_revision)?;
        let position = state
            .cells
            .iter()
            .position(|cell| cell.id == cell_id)
            .ok_or_else(|| AppError::CellNotFound(cell_id.to_owned()))?;
        state.cells.remove(position);
        Self::reindex(&mut state);
        state.revision += 1;
        Ok(())
    }

    async fn append_output(&self, cell_id: &str, fragment: OutputFragment) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let cell = state
            .cells
            .iter_mut()
            .find(|cell| cell.id == cell_id)
            .ok_or_else(|| AppError::CellNotFound(cell_id.to_owned()))?;
        cell.outputs.push(fragment);
        state.revision += 1;
        Ok(())
    }

    async fn clear_outputs(&self, cell_id: &str) -> Result<()> {
        let call = self.clear_outputs_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_clear_outputs_on_call.load(Ordering::SeqCst) {
            return Err(AppError::Document("injected save failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        let cell = state
            .cells
            .iter_mut()
            .find(|cell| cell.id == cell_id)
            .ok_or_else(|| AppError::CellNotFound(cell_id.to_owned()))?;
        cell.outputs.clear();
        cell.execution_count = None;
        state.revision += 1;
        Ok(())
    }

    async fn set_execution_count(&self, cell_id: &str, count: u32) -> Result<()> {
        if self.fail_set_execution_count.swap(false, Ordering::SeqCst) {
            return Err(AppError::Document("injected save failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        let cell = state
            .cells
            .iter_mut()
            .find(|cell| cell.id == cell_id)
            .ok_or_else(|| AppError::CellNotFound(cell_id.to_owned()))?;
        cell.execution_count = Some(count);
        state.revision += 1;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

/// Default test configuration (all defaults, remediation enabled).
pub fn test_config() -> Arc<GlobalConfig> {
    Arc::new(GlobalConfig::from_toml_str("").expect("default config"))
}

/// Test configuration with dependency remediation switched off.
pub fn config_without_remediation() -> Arc<GlobalConfig> {
    Arc::new(
        GlobalConfig::from_toml_str("[remediation]\nenabled = false\n")
            .expect("valid config"),
    )
}
