/// Lightweight harness for engine integration tests
///
/// This module wires an [`Engine`](crate::engine::Engine) to in-memory
/// collaborators and a scripted decider, so whole workflows can run
/// in-process without a real identity provider or document store.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::{record, TestBackend};
/// use serde_json::json;
///
/// #[tokio::test]
/// async fn test_list() -> anyhow::Result<()> {
///     let backend = TestBackend::new();
///     backend.add_user(record("u1", "a@x", "", json!({"admin": true})));
///     backend.index("u1", "a@x");
///
///     let mut ctx = backend.context();
///     backend.engine().list(&mut ctx, &backend.cancel).await?;
///     assert_eq!(ctx.visible(), ["u1".to_string()]);
///     Ok(())
/// }
/// ```
mod backend;
mod decider;

pub use backend::{record, TestBackend};
pub use decider::ScriptedDecider;
