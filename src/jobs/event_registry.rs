//! `HandleEvent(type, fn)` (§4.10): a single handler per event type, dispatched by
//! the job worker pool for `event` and `queued-event` jobs.
//!
//! Grounded on the teacher's `kernel/jobs/registry.rs` (`JobRegistry`: `&'static str`
//! keyed map to a boxed async closure, `register`/`execute`).

use crate::error::KurbisioError;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxedEventHandler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<(), KurbisioError>> + Send>> + Send + Sync,
>;

#[derive(Default, Clone)]
pub struct EventRegistry {
    handlers: HashMap<String, BoxedEventHandler>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), KurbisioError>> + Send + 'static,
    {
        self.handlers
            .insert(event_type.into(), Arc::new(move |p| Box::pin(handler(p))));
    }

    pub async fn dispatch(&self, event_type: &str, payload: Value) -> Result<(), KurbisioError> {
        match self.handlers.get(event_type) {
            Some(handler) => handler(payload)
                .await
                .map_err(|e| KurbisioError::JobHandler(e.to_string())),
            None => Err(KurbisioError::JobHandler(format!(
                "no handler registered for event type '{event_type}'"
            ))),
        }
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dispatch_without_registration_is_a_job_handler_error() {
        let registry = EventRegistry::new();
        let err = registry.dispatch("unknown", json!({})).await.unwrap_err();
        assert!(matches!(err, KurbisioError::JobHandler(_)));
    }

    #[tokio::test]
    async fn dispatch_invokes_registered_handler() {
        let mut registry = EventRegistry::new();
        registry.register("welcome-email", |_payload| async move { Ok(()) });
        assert!(registry.is_registered("welcome-email"));
        registry
            .dispatch("welcome-email", json!({"to": "jo@example.com"}))
            .await
            .unwrap();
    }
}
