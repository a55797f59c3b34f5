//! Shared test utilities for engine integration tests
#![allow(dead_code)]

use common::context::ReconciliationContext;
use common::testkit::{record, TestBackend};
use serde_json::json;

/// Install a log subscriber honoring `RUST_LOG`, once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A backend with one indexed admin, matching the index document
pub fn single_admin() -> TestBackend {
    init_tracing();
    let backend = TestBackend::new();
    backend.add_user(record("u1", "a@x", "", json!({"admin": true})));
    backend.index("u1", "a@x");
    backend
}

/// Run List and return the context it populated
pub async fn listed(backend: &TestBackend) -> ReconciliationContext {
    let mut ctx = backend.context();
    backend
        .engine()
        .list(&mut ctx, &backend.cancel)
        .await
        .unwrap();
    ctx
}
