//! Integration tests for the session registry.

use notebook_mcp::session::{LifecycleState, SessionRegistry};
use notebook_mcp::AppError;

use super::test_helpers::{test_config, FakeDocument, FakeKernel};

#[tokio::test]
async fn notebook_paths_are_normalized_to_ipynb() {
    let registry = SessionRegistry::new(test_config());
    let session = registry
        .attach_with("reports/quarterly", FakeKernel::new(), FakeDocument::new())
        .await
        .expect("attach");
    assert_eq!(session.notebook_path(), "reports/quarterly.ipynb");

    // Lookups with or without the extension find the same session.
    assert!(registry.get("reports/quarterly").await.is_ok());
    assert!(registry.get("reports/quarterly.ipynb").await.is_ok());

    // And a second attach under either spelling is rejected.
    let err = registry
        .attach_with(
            "reports/quarterly.ipynb",
            FakeKernel::new(),
            FakeDocument::new(),
        )
        .await
        .expect_err("duplicate");
    assert!(matches!(err, AppError::AlreadyAttached(_)));
}

#[tokio::test]
async fn lookup_of_unattached_notebook_fails() {
    let registry = SessionRegistry::new(test_config());
    let err = registry.get("nowhere.ipynb").await.expect_err("get");
    assert!(matches!(err, AppError::SessionClosed(_)));
    let err = registry.close("nowhere.ipynb").await.expect_err("close");
    assert!(matches!(err, AppError::SessionClosed(_)));
}

#[tokio::test]
async fn close_all_releases_every_session() {
    let registry = SessionRegistry::new(test_config());
    let a = registry
        .attach_with("a.ipynb", FakeKernel::new(), FakeDocument::new())
        .await
        .expect("attach a");
    let b = registry
        .attach_with("b.ipynb", FakeKernel::new(), FakeDocument::new())
        .await
        .expect("attach b");

    assert_eq!(
        registry.attached_paths().await,
        vec!["a.ipynb".to_owned(), "b.ipynb".to_owned()]
    );

    registry.close_all().await;
    assert!(registry.attached_paths().await.is_empty());
    assert_eq!(a.lifecycle(), LifecycleState::Closed);
    assert_eq!(b.lifecycle(), LifecycleState::Closed);
}
