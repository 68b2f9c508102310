//! Unit tests for the cell and execution data models.

use notebook_mcp::models::cell::{CellKind, CellRecord, DocumentSnapshot, OutputFragment};
use notebook_mcp::models::execution::{
    ExecutionOutcome, ExecutionRequest, ExecutionStatus, OutcomeStatus,
};

#[test]
fn new_cells_get_unique_identities() {
    let a = CellRecord::new(0, CellKind::Code, "x = 1");
    let b = CellRecord::new(1, CellKind::Code, "x = 1");
    assert_ne!(a.id, b.id);
    assert!(a.execution_count.is_none());
    assert!(a.outputs.is_empty());
}

#[test]
fn snapshot_finds_cells_by_identity_not_position() {
    let mut first = CellRecord::new(0, CellKind::Code, "a");
    first.id = "cell-a".into();
    let mut second = CellRecord::new(1, CellKind::Markdown, "b");
    second.id = "cell-b".into();
    let snapshot = DocumentSnapshot {
        revision: 1,
        cells: vec![first, second],
    };

    assert_eq!(snapshot.find_cell("cell-b").map(|c| c.position), Some(1));
    assert!(snapshot.find_cell("cell-c").is_none());
}

#[test]
fn output_fragments_serialize_with_nbformat_tags() {
    let stream = serde_json::to_value(OutputFragment::Stream {
        name: "stdout".into(),
        text: "hi\n".into(),
    })
    .expect("serialize");
    assert_eq!(stream["output_type"], "stream");
    assert_eq!(stream["name"], "stdout");

    let error = serde_json::to_value(OutputFragment::Error {
        ename: "ValueError".into(),
        evalue: "bad".into(),
        traceback: vec!["line".into()],
    })
    .expect("serialize");
    assert_eq!(error["output_type"], "error");
}

#[test]
fn output_fragment_round_trips() {
    let raw = serde_json::json!({
        "output_type": "execute_result",
        "data": { "text/plain": "42" },
        "execution_count": 3,
    });
    let fragment: OutputFragment = serde_json::from_value(raw).expect("deserialize");
    assert!(matches!(
        fragment,
        OutputFragment::ExecuteResult {
            execution_count: Some(3),
            ..
        }
    ));
    assert_eq!(fragment.as_text(), "42");
}

#[test]
fn error_fragment_text_rendering() {
    let fragment = OutputFragment::Error {
        ename: "NameError".into(),
        evalue: "name 'x' is not defined".into(),
        traceback: Vec::new(),
    };
    assert_eq!(fragment.as_text(), "NameError: name 'x' is not defined");
}

#[test]
fn execution_request_starts_queued() {
    let request = ExecutionRequest::new("exec-1".into(), "cell-1".into(), 7);
    assert_eq!(request.status, ExecutionStatus::Queued);
    assert_eq!(request.submitted_revision, 7);
}

#[test]
fn outcome_status_flattens_into_payload() {
    let outcome = ExecutionOutcome {
        execution_id: "exec-1".into(),
        status: OutcomeStatus::Error {
            ename: "TypeError".into(),
            evalue: "nope".into(),
        },
        execution_count: None,
        outputs: Vec::new(),
    };
    let value = serde_json::to_value(&outcome).expect("serialize");
    assert_eq!(value["status"], "error");
    assert_eq!(value["ename"], "TypeError");
    assert_eq!(value["execution_id"], "exec-1");
    assert!(!outcome.is_ok());
}

#[test]
fn ok_outcome_serializes_status_ok() {
    let outcome = ExecutionOutcome {
        execution_id: "exec-2".into(),
        status: OutcomeStatus::Ok,
        execution_count: Some(4),
        outputs: vec![OutputFragment::Stream {
            name: "stdout".into(),
            text: "done\n".into(),
        }],
    };
    let value = serde_json::to_value(&outcome).expect("serialize");
    assert_eq!(value["status"], "ok");
    assert_eq!(value["execution_count"], 4);
    assert!(outcome.is_ok());
}
