//! Integration tests for the bounded dependency remediation policy.

use std::time::Duration;

use notebook_mcp::models::cell::OutputFragment;
use notebook_mcp::models::execution::OutcomeStatus;
use notebook_mcp::session::{LifecycleState, SessionRegistry};

use super::test_helpers::{config_without_remediation, test_config, Ev, FakeDocument, FakeKernel};

const EXECUTE_TIMEOUT: Duration = Duration::from_secs(5);

const MISSING_POLARS: Ev = Ev::Failed {
    ename: "ModuleNotFoundError",
    evalue: "No module named 'polars'",
};

#[tokio::test]
async fn missing_dependency_is_installed_and_retried_once() {
    let registry = SessionRegistry::new(test_config());
    let kernel = FakeKernel::new();
    let document =
        FakeDocument::with_cells(vec![FakeDocument::code_cell("c1", 0, "import polars")]);
    let session = registry
        .attach_with("nb.ipynb", kernel.clone(), document.clone())
        .await
        .expect("attach");

    kernel.script(vec![MISSING_POLARS]);
    kernel.script(vec![Ev::Stream("installed polars\n"), Ev::Completed(None)]);
    kernel.script(vec![Ev::Stream("ok\n"), Ev::Completed(Some(1))]);

    let outcome = session
        .execute_cell("c1", None, EXECUTE_TIMEOUT)
        .await
        .expect("execute");
    assert!(outcome.is_ok());
    assert_eq!(outcome.execution_count, Some(1));

    let submitted = kernel.submitted_code();
    assert_eq!(
        submitted,
        vec![
            "import polars".to_owned(),
            "!uv pip install polars".to_owned(),
            "import polars".to_owned(),
        ]
    );

    // The transient failure was cleared; only the successful run remains.
    let cell = document.cell("c1").expect("cell");
    assert!(!cell
        .outputs
        .iter()
        .any(|f| matches!(f, OutputFragment::Error { .. })));
    assert_eq!(cell.execution_count, Some(1));
    assert_eq!(session.lifecycle(), LifecycleState::Idle);
}

#[tokio::test]
async fn second_failure_is_surfaced_verbatim_without_another_retry() {
    let registry = SessionRegistry::new(test_config());
    let kernel = FakeKernel::new();
    let document =
        FakeDocument::with_cells(vec![FakeDocument::code_cell("c1", 0, "import polars")]);
    let session = registry
        .attach_with("nb.ipynb", kernel.clone(), document.clone())
        .await
        .expect("attach");

    kernel.script(vec![MISSING_POLARS]);
    kernel.script(vec![Ev::Completed(None)]);
    // The install did not actually help; the retry fails the same way.
    kernel.script(vec![MISSING_POLARS]);

    let outcome = session
        .execute_cell("c1", None, EXECUTE_TIMEOUT)
        .await
        .expect("execute");
    assert_eq!(
        outcome.status,
        OutcomeStatus::Error {
            ename: "ModuleNotFoundError".into(),
            evalue: "No module named 'polars'".into(),
        }
    );

    // Exactly two executions of the original code, no third.
    assert_eq!(kernel.submitted_code().len(), 3);
    let cell = document.cell("c1").expect("cell");
    assert!(cell
        .outputs
        .iter()
        .any(|f| matches!(f, OutputFragment::Error { .. })));
    assert_eq!(session.lifecycle(), LifecycleState::Idle);
}

#[tokio::test]
async fn user_code_errors_are_never_remediated() {
    let registry = SessionRegistry::new(test_config());
    let kernel = FakeKernel::new();
    let document = FakeDocument::with_cells(vec![FakeDocument::code_cell("c1", 0, "1/0")]);
    let session = registry
        .attach_with("nb.ipynb", kernel.clone(), document)
        .await
        .expect("attach");

    kernel.script(vec![Ev::Failed {
        ename: "ZeroDivisionError",
        evalue: "division by zero",
    }]);
    let outcome = session
        .execute_cell("c1", None, EXECUTE_TIMEOUT)
        .await
        .expect("execute");

    assert!(matches!(outcome.status, OutcomeStatus::Error { .. }));
    assert_eq!(kernel.submitted_code().len(), 1);
}

#[tokio::test]
async fn disabled_remediation_surfaces_missing_dependency_directly() {
    let registry = SessionRegistry::new(config_without_remediation());
    let kernel = FakeKernel::new();
    let document =
        FakeDocument::with_cells(vec![FakeDocument::code_cell("c1", 0, "import polars")]);
    let session = registry
        .attach_with("nb.ipynb", kernel.clone(), document)
        .await
        .expect("attach");

    kernel.script(vec![MISSING_POLARS]);
    let outcome = session
        .execute_cell("c1", None, EXECUTE_TIMEOUT)
        .await
        .expect("execute");

    assert!(matches!(outcome.status, OutcomeStatus::Error { .. }));
    assert_eq!(kernel.submitted_code().len(), 1);
}

#[tokio::test]
async fn interrupted_install_surfaces_the_original_failure() {
    let registry = SessionRegistry::new(test_config());
    let kernel = FakeKernel::new();
    let document =
        FakeDocument::with_cells(vec![FakeDocument::code_cell("c1", 0, "import polars")]);
    let session = registry
        .attach_with("nb.ipynb", kernel.clone(), document)
        .await
        .expect("attach");

    kernel.script(vec![MISSING_POLARS]);
    kernel.script(vec![Ev::Interrupted]);

    let outcome = session
        .execute_cell("c1", None, EXECUTE_TIMEOUT)
        .await
        .expect("execute");
    assert_eq!(
        outcome.status,
        OutcomeStatus::Error {
            ename: "ModuleNotFoundError".into(),
            evalue: "No module named 'polars'".into(),
        }
    );
    // The original code was not resubmitted after the aborted install.
    assert_eq!(kernel.submitted_code().len(), 2);
    assert_eq!(session.lifecycle(), LifecycleState::Idle);
}

#[tokio::test]
async fn failed_clear_before_retry_returns_the_session_to_idle() {
    let registry = SessionRegistry::new(test_config());
    let kernel = FakeKernel::new();
    let document =
        FakeDocument::with_cells(vec![FakeDocument::code_cell("c1", 0, "import polars")]);
    let session = registry
        .attach_with("nb.ipynb", kernel.clone(), document.clone())
        .await
        .expect("attach");

    // First clear precedes the original run; the second precedes the retry.
    document.fail_clear_outputs_on_call(2);
    kernel.script(vec![MISSING_POLARS]);
    kernel.script(vec![Ev::Completed(None)]);

    let err = session
        .execute_cell("c1", None, EXECUTE_TIMEOUT)
        .await
        .expect_err("clear failure");
    assert!(matches!(err, notebook_mcp::AppError::Document(_)));

    // The install ran but the original code was not resubmitted, and the
    // session is usable again.
    assert_eq!(kernel.submitted_code().len(), 2);
    assert_eq!(session.lifecycle(), LifecycleState::Idle);
    session
        .add_cell(None, notebook_mcp::models::cell::CellKind::Code, "y = 2", None)
        .await
        .expect("mutation after failed retry setup");
}

#[tokio::test]
async fn install_packages_runs_through_a_new_cell() {
    let registry = SessionRegistry::new(test_config());
    let kernel = FakeKernel::new();
    let document = FakeDocument::new();
    let session = registry
        .attach_with("nb.ipynb", kernel.clone(), document.clone())
        .await
        .expect("attach");

    kernel.script(vec![Ev::Stream("installed\n"), Ev::Completed(Some(1))]);
    let outcome = session
        .install_packages("polars numpy", EXECUTE_TIMEOUT)
        .await
        .expect("install");

    assert!(outcome.is_ok());
    assert_eq!(
        kernel.submitted_code(),
        vec!["!uv pip install polars numpy".to_owned()]
    );
    // The install command lives in the document as a regular cell.
    let snapshot = session.list_cells().await.expect("list");
    assert_eq!(snapshot.cells.len(), 1);
    assert_eq!(snapshot.cells[0].source, "!uv pip install polars numpy");
}

/// End-to-end collaborative flow: agent writes and runs a cell, a missing
/// dependency is remediated transparently, then a human edit forces the
/// agent to re-read before editing again.
#[tokio::test]
async fn shared_session_scenario() {
    let registry = SessionRegistry::new(test_config());
    let kernel = FakeKernel::new();
    let document = FakeDocument::new();
    let session = registry
        .attach_with("analysis.ipynb", kernel.clone(), document.clone())
        .await
        .expect("attach");

    let cell_id = session
        .add_cell(
            None,
            notebook_mcp::models::cell::CellKind::Code,
            "import polars as pl\npl.DataFrame({'a': [1]})",
            None,
        )
        .await
        .expect("add");

    kernel.script(vec![MISSING_POLARS]);
    kernel.script(vec![Ev::Completed(None)]);
    kernel.script(vec![Ev::Stream("shape: (1, 1)\n"), Ev::Completed(Some(1))]);
    let outcome = session
        .execute_cell(&cell_id, None, EXECUTE_TIMEOUT)
        .await
        .expect("execute");
    assert!(outcome.is_ok());

    // A human edits the notebook in the UI.
    let observed = session.list_cells().await.expect("list").revision;
    document.simulate_external_edit();

    let err = session
        .edit_cell(&cell_id, "print('v2')", observed)
        .await
        .expect_err("stale");
    assert!(matches!(
        err,
        notebook_mcp::AppError::StaleRevision { .. }
    ));

    let current = session.list_cells().await.expect("list").revision;
    session
        .edit_cell(&cell_id, "print('v2')", current)
        .await
        .expect("edit after re-read");

    registry.close("analysis.ipynb").await.expect("close");
    assert_eq!(session.lifecycle(), LifecycleState::Closed);
}
