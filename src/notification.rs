//! Out-of-band notification registry (C12, §4.10), delivered through the job
//! pipeline (C9) rather than invoked inline.
//!
//! Grounded on the same registry shape as [`crate::interceptor::InterceptorRegistry`]
//! and the teacher's `kernel/jobs/registry.rs` dispatch-by-key pattern.

use crate::error::KurbisioError;
use crate::model::config_doc::Operation;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxedNotificationHandler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<(), KurbisioError>> + Send>> + Send + Sync,
>;

/// Mutations that can emit a notification (§4.10: "notifications only fire for
/// create/update/delete/clear").
pub fn is_mutable(op: Operation) -> bool {
    matches!(
        op,
        Operation::Create | Operation::Update | Operation::Delete | Operation::Clear
    )
}

#[derive(Default, Clone)]
pub struct NotificationRegistry {
    handlers: HashMap<(String, Operation), BoxedNotificationHandler>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `handle_resource_notification` (§4.10). One handler per (resource,
    /// mutable-op); only registered for create/update/delete/clear.
    pub fn register<F, Fut>(&mut self, resource: impl Into<String>, op: Operation, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), KurbisioError>> + Send + 'static,
    {
        debug_assert!(is_mutable(op), "notifications only fire for mutable ops");
        self.handlers.insert(
            (resource.into(), op),
            Arc::new(move |payload| Box::pin(handler(payload))),
        );
    }

    pub fn has_handler(&self, resource: &str, op: Operation) -> bool {
        self.handlers.contains_key(&(resource.to_string(), op))
    }

    /// Invoked by the job dispatcher (C9) once a notification job has been claimed
    /// and its `attempts_left` decrement committed. A handler error is not surfaced
    /// to HTTP — it becomes a [`KurbisioError::JobHandler`] the caller maps onto a
    /// retry per the backoff schedule.
    pub async fn dispatch(
        &self,
        resource: &str,
        op: Operation,
        payload: Value,
    ) -> Result<(), KurbisioError> {
        match self.handlers.get(&(resource.to_string(), op)) {
            Some(handler) => handler(payload)
                .await
                .map_err(|e| KurbisioError::JobHandler(e.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn is_mutable_excludes_read_and_list() {
        assert!(is_mutable(Operation::Create));
        assert!(is_mutable(Operation::Clear));
        assert!(!is_mutable(Operation::Read));
        assert!(!is_mutable(Operation::List));
    }

    #[tokio::test]
    async fn unregistered_notification_is_a_no_op() {
        let registry = NotificationRegistry::new();
        assert!(!registry.has_handler("users", Operation::Create));
        let result = registry
            .dispatch("users", Operation::Create, json!({}))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn registered_notification_fires_with_payload() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = NotificationRegistry::new();
        let counter_clone = counter.clone();
        registry.register("users", Operation::Create, move |_payload| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        assert!(registry.has_handler("users", Operation::Create));
        registry
            .dispatch("users", Operation::Create, json!({"name": "Jo"}))
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_error_becomes_job_handler_error() {
        let mut registry = NotificationRegistry::new();
        registry.register("users", Operation::Delete, |_payload| async move {
            Err(KurbisioError::BadRequest("boom".into()))
        });
        let err = registry
            .dispatch("users", Operation::Delete, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, KurbisioError::JobHandler(_)));
    }
}
