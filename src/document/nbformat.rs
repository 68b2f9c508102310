//! Mapping between nbformat-4 cell JSON and the domain cell model.
//!
//! Jupyter stores source and stream text either as a plain string or as a
//! list of lines; both are accepted on read, and plain strings are written
//! back. Cells without an `id` (pre-4.5 notebooks) get a generated one.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::cell::{CellKind, CellRecord, OutputFragment};

/// Parse one nbformat cell object into a [`CellRecord`].
///
/// Unrecognized output objects are dropped rather than failing the whole
/// snapshot; the document stays readable even when another client wrote an
/// output shape this core does not model.
#[must_use]
pub fn cell_from_nb(value: &Value, position: usize) -> Option<CellRecord> {
    let kind = match value.get("cell_type").and_then(Value::as_str)? {
        "code" => CellKind::Code,
        "markdown" => CellKind::Markdown,
        _ => return None,
    };

    let id = value
        .get("id")
        .and_then(Value::as_str)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

    let source = value.get("source").map(joined_text).unwrap_or_default();

    let execution_count = value
        .get("execution_count")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());

    let outputs = value
        .get("outputs")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| serde_json::from_value(normalize_output(entry)).ok())
                .collect()
        })
        .unwrap_or_default();

    Some(CellRecord {
        id,
        position,
        kind,
        source,
        execution_count,
        outputs,
    })
}

/// Serialize a [`CellRecord`] back to an nbformat cell object.
#[must_use]
pub fn cell_to_nb(cell: &CellRecord) -> Value {
    match cell.kind {
        CellKind::Code => json!({
            "id": cell.id,
            "cell_type": "code",
            "source": cell.source,
            "metadata": {},
            "execution_count": cell.execution_count,
            "outputs": cell
                .outputs
                .iter()
                .filter_map(|fragment| serde_json::to_value(fragment).ok())
                .collect::<Vec<_>>(),
        }),
        CellKind::Markdown => json!({
            "id": cell.id,
            "cell_type": "markdown",
            "source": cell.source,
            "metadata": {},
        }),
    }
}

/// Content hash over the serialized cell list.
///
/// Used to detect externally-originated edits between reloads: a reload
/// whose hash differs from the hash of the content this process last wrote
/// or observed advances the document revision.
#[must_use]
pub fn cells_hash(cells: &[CellRecord]) -> String {
    let mut hasher = Sha256::new();
    for cell in cells {
        hasher.update(cell.id.as_bytes());
        hasher.update([0]);
        hasher.update(cell.source.as_bytes());
        hasher.update([0]);
        if let Ok(outputs) = serde_json::to_vec(&cell.outputs) {
            hasher.update(&outputs);
        }
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}

/// Flatten list-of-lines text fields so serde can parse the output object.
fn normalize_output(entry: &Value) -> Value {
    let mut entry = entry.clone();
    if let Some(object) = entry.as_object_mut() {
        if let Some(text) = object.get("text") {
            let joined = joined_text(text);
            object.insert("text".into(), Value::String(joined));
        }
        // Drop fields the domain model does not carry.
        object.remove("metadata");
        object.remove("transient");
    }
    entry
}

fn joined_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(lines) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .concat(),
        _ => String::new(),
    }
}
