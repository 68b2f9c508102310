//! Consistency guard: precondition checks applied before every mutating
//! operation.
//!
//! Expressed as ordinary validation over a point-in-time snapshot so the
//! contract is testable in isolation from any specific operation. The
//! session state machine evaluates the guard and the subsequent mutation
//! under its single per-notebook serialization point, so no other mutating
//! operation can interleave between check and apply.

use crate::models::cell::{CellKind, CellRecord, DocumentSnapshot};
use crate::session::state::LifecycleState;
use crate::{AppError, Result};

/// Reject a mutating operation unless the session is idle.
///
/// # Errors
///
/// Returns `AppError::SessionClosed` for a closed session,
/// `AppError::SessionBusy` while an execution is outstanding, and
/// `AppError::AttachFailed` before the session is bound.
pub fn ensure_writable(lifecycle: LifecycleState) -> Result<()> {
    match lifecycle {
        LifecycleState::Idle => Ok(()),
        LifecycleState::Closed => Err(AppError::SessionClosed(
            "session is closed; re-attach to continue".into(),
        )),
        LifecycleState::Executing | LifecycleState::Recovering => Err(AppError::SessionBusy(
            "an execution is in flight; retry when the session is idle".into(),
        )),
        LifecycleState::Disconnected | LifecycleState::Attaching => Err(AppError::AttachFailed(
            "session is not attached yet".into(),
        )),
    }
}

/// Validate that a referenced cell still exists at the expected revision.
///
/// Returns the current cell record from the snapshot; callers must use this
/// record (not any earlier copy) to derive the mutation.
///
/// # Errors
///
/// Returns `AppError::CellNotFound` if the identity is gone and
/// `AppError::StaleRevision` if the caller's declared revision no longer
/// matches, so the caller re-reads instead of clobbering a concurrent edit.
pub fn validate_cell<'snap>(
    snapshot: &'snap DocumentSnapshot,
    cell_id: &str,
    expected_revision: Option<u64>,
) -> Result<&'snap CellRecord> {
    if let Some(expected) = expected_revision {
        if expected != snapshot.revision {
            return Err(AppError::StaleRevision {
                expected,
                actual: snapshot.revision,
            });
        }
    }

    snapshot
        .find_cell(cell_id)
        .ok_or_else(|| AppError::CellNotFound(cell_id.to_owned()))
}

/// Validate an execution target: the cell must exist, match the expected
/// revision, and be executable.
///
/// # Errors
///
/// As [`validate_cell`]; additionally returns `AppError::CellNotFound` when
/// the cell exists but is not a code cell.
pub fn validate_execution_target<'snap>(
    snapshot: &'snap DocumentSnapshot,
    cell_id: &str,
    expected_revision: Option<u64>,
) -> Result<&'snap CellRecord> {
    let cell = validate_cell(snapshot, cell_id, expected_revision)?;
    if cell.kind != CellKind::Code {
        return Err(AppError::CellNotFound(format!(
            "{cell_id} is not a code cell"
        )));
    }
    Ok(cell)
}
