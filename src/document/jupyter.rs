//! Live document sync adapter over the Jupyter contents REST API.
//!
//! Reads and writes the whole notebook through `/api/contents/{path}`,
//! creating an empty nbformat-4 notebook (with the server's default
//! kernelspec) when the path does not exist yet. The server-side RTC
//! infrastructure still fans changes out to other viewers.
//!
//! Revisions are maintained locally: every mutation this adapter applies
//! advances the counter, and a reload whose cell-content hash differs from
//! the last observed hash is attributed to an external writer, advancing
//! the counter and emitting a [`ChangeEvent`].

use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::document::nbformat;
use crate::document::sync::{ChangeEvent, DocumentSync};
use crate::models::cell::{CellKind, CellRecord, DocumentSnapshot, OutputFragment};
use crate::{AppError, Result};

/// Capacity of the external-change broadcast channel.
const CHANGE_QUEUE_DEPTH: usize = 64;

struct DocState {
    revision: u64,
    cells: Vec<CellRecord>,
    last_hash: String,
    /// Notebook-level metadata preserved verbatim across saves.
    metadata: Value,
}

/// Document adapter bound to one notebook path on a Jupyter server.
pub struct JupyterDocument {
    http: reqwest::Client,
    server_url: String,
    token: String,
    path: String,
    state: Mutex<DocState>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl JupyterDocument {
    /// Connect to the notebook at `path`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AttachFailed` if the server is unreachable or
    /// rejects the bearer credential.
    pub async fn connect(server_url: &str, token: &str, path: &str) -> Result<Self> {
        let http = reqwest::Client::new();
        let server_url = server_url.trim_end_matches('/').to_owned();

        let document = Self {
            http,
            server_url,
            token: token.to_owned(),
            path: path.to_owned(),
            state: Mutex::new(DocState {
                revision: 0,
                cells: Vec::new(),
                last_hash: String::new(),
                metadata: Value::Object(serde_json::Map::new()),
            }),
            changes: broadcast::channel(CHANGE_QUEUE_DEPTH).0,
        };

        let content = match document.load_content().await {
            Ok(content) => content,
            Err(AppError::CellNotFound(_)) => document.create_empty_notebook().await?,
            Err(AppError::Document(msg)) => return Err(AppError::AttachFailed(msg)),
            Err(err) => return Err(err),
        };

        {
            let mut state = document.state.lock().await;
            state.metadata = content
                .get("metadata")
                .cloned()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
            state.cells = parse_cells(&content);
            state.last_hash = nbformat::cells_hash(&state.cells);
        }

        info!(path, "connected to notebook document");
        Ok(document)
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.token)
    }

    /// Fetch the notebook content object from the server.
    ///
    /// A 404 is reported as `CellNotFound` so `connect` can distinguish
    /// "notebook absent" from transport failures.
    async fn load_content(&self) -> Result<Value> {
        let url = format!("{}/api/contents/{}", self.server_url, self.path);
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|err| AppError::Document(format!("contents fetch failed: {err}")))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => {
                Err(AppError::CellNotFound(format!("notebook {}", self.path)))
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => Err(
                AppError::Document("jupyter server rejected the bearer credential".into()),
            ),
            status if !status.is_success() => Err(AppError::Document(format!(
                "contents fetch returned {status}"
            ))),
            _ => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|err| AppError::Document(format!("invalid contents body: {err}")))?;
                Ok(body.get("content").cloned().unwrap_or(Value::Null))
            }
        }
    }

    /// Create an empty notebook carrying the server's default kernelspec.
    async fn create_empty_notebook(&self) -> Result<Value> {
        let specs_url = format!("{}/api/kernelspecs", self.server_url);
        let specs: Value = self
            .http
            .get(&specs_url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|err| AppError::AttachFailed(format!("kernelspecs fetch failed: {err}")))?
            .json()
            .await
            .map_err(|err| AppError::AttachFailed(format!("invalid kernelspecs body: {err}")))?;

        let default_name = specs
            .get("default")
            .and_then(Value::as_str)
            .unwrap_or("python3");
        let spec = specs
            .pointer(&format!("/kernelspecs/{default_name}/spec"))
            .cloned()
            .unwrap_or(Value::Null);
        let display_name = spec
            .get("display_name")
            .and_then(Value::as_str)
            .unwrap_or("Python 3");
        let language = spec
            .get("language")
            .and_then(Value::as_str)
            .unwrap_or("python");

        let content = json!({
            "cells": [],
            "metadata": {
                "kernelspec": {
                    "display_name": display_name,
                    "language": language,
                    "name": default_name,
                },
                "language_info": { "name": language },
            },
            "nbformat": 4,
            "nbformat_minor": 5,
        });

        self.put_notebook(&content).await?;
        info!(path = %self.path, "created empty notebook");
        Ok(content)
    }

    async fn put_notebook(&self, content: &Value) -> Result<()> {
        let url = format!("{}/api/contents/{}", self.server_url, self.path);
        let response = self
            .http
            .put(&url)
            .header("Authorization", self.auth_header())
            .json(&json!({ "type": "notebook", "format": "json", "content": content }))
            .send()
            .await
            .map_err(|err| AppError::Document(format!("notebook save failed: {err}")))?;
        if !response.status().is_success() {
            return Err(AppError::Document(format!(
                "notebook save returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Persist the locally-held cells and remember their hash.
    async fn save(&self, state: &mut DocState) -> Result<()> {
        let content = json!({
            "cells": state.cells.iter().map(nbformat::cell_to_nb).collect::<Vec<_>>(),
            "metadata": state.metadata,
            "nbformat": 4,
            "nbformat_minor": 5,
        });
        self.put_notebook(&content).await?;
        state.last_hash = nbformat::cells_hash(&state.cells);
        debug!(path = %self.path, revision = state.revision, "notebook saved");
        Ok(())
    }

    /// Reload from the server and fold in any externally-originated edit.
    async fn refresh(&self, state: &mut DocState) -> Result<()> {
        let content = self.load_content().await?;
        let cells = parse_cells(&content);
        let hash = nbformat::cells_hash(&cells);

        if hash != state.last_hash {
            state.cells = cells;
            state.last_hash = hash;
            state.revision += 1;
            debug!(
                path = %self.path,
                revision = state.revision,
                "external edit detected"
            );
            // Receivers may lag or be absent; both are fine.
            let _ = self.changes.send(ChangeEvent::ExternalEdit {
                revision: state.revision,
            });
        }
        Ok(())
    }

    fn check_revision(state: &DocState, expected: u64) -> Result<()> {
        if state.revision == expected {
            Ok(())
        } else {
            Err(AppError::StaleRevision {
                expected,
                actual: state.revision,
            })
        }
    }

    fn position_of(state: &DocState, cell_id: &str) -> Result<usize> {
        state
            .cells
            .iter()
            .position(|cell| cell.id == cell_id)
            .ok_or_else(|| AppError::CellNotFound(cell_id.to_owned()))
    }

    fn reindex(state: &mut DocState) {
        for (position, cell) in state.cells.iter_mut().enumerate() {
            cell.position = position;
        }
    }
}

#[async_trait::async_trait]
impl DocumentSync for JupyterDocument {
    async fn snapshot(&self) -> Result<DocumentSnapshot> {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await?;
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
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await?;
        if let Some(expected) = expected_revision {
            Self::check_revision(&state, expected)?;
        }

        let position = match after_cell_id {
            Some(after) => Self::position_of(&state, after)? + 1,
            None => state.cells.len(),
        };
        let cell = CellRecord::new(position, kind, source);
        let cell_id = cell.id.clone();
        state.cells.insert(position, cell);
        Self::reindex(&mut state);
        state.revision += 1;
        self.save(&mut state).await?;
        Ok(cell_id)
    }

    async fn replace_cell_source(
        &self,
        cell_id: &str,
        source: &str,
        expected_revision: u64,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await?;
        Self::check_revision(&state, expected_revision)?;

        let position = Self::position_of(&state, cell_id)?;
        state.cells[position].source = source.to_owned();
        state.revision += 1;
        self.save(&mut state).await
    }

    async fn delete_cell(&self, cell_id: &str, expected_revision: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await?;
        Self::check_revision(&state, expected_revision)?;

        let position = Self::position_of(&state, cell_id)?;
        state.cells.remove(position);
        Self::reindex(&mut state);
        state.revision += 1;
        self.save(&mut state).await
    }

    async fn append_output(&self, cell_id: &str, fragment: OutputFragment) -> Result<()> {
        let mut state = self.state.lock().await;
        // Fold in edits saved by another writer since the last reload, so
        // the full-notebook save below cannot clobber them.
        self.refresh(&mut state).await?;
        let position = Self::position_of(&state, cell_id)?;
        state.cells[position].outputs.push(fragment);
        state.revision += 1;
        self.save(&mut state).await
    }

    async fn clear_outputs(&self, cell_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await?;
        let position = Self::position_of(&state, cell_id)?;
        state.cells[position].outputs.clear();
        state.cells[position].execution_count = None;
        state.revision += 1;
        self.save(&mut state).await
    }

    async fn set_execution_count(&self, cell_id: &str, count: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await?;
        let position = Self::position_of(&state, cell_id)?;
        state.cells[position].execution_count = Some(count);
        state.revision += 1;
        self.save(&mut state).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

fn parse_cells(content: &Value) -> Vec<CellRecord> {
    content
        .get("cells")
        .and_then(Value::as_array)
        .map(|cells| {
            cells
                .iter()
                .enumerate()
                .filter_map(|(position, cell)| nbformat::cell_from_nb(cell, position))
                .collect()
        })
        .unwrap_or_default()
}
