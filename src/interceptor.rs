//! In-band interceptor registry (C11, §4.10).
//!
//! Grounded on the teacher's `kernel/jobs/registry.rs` (a `HashMap` from a typed key
//! to a boxed async closure, with a single `register`/`execute` pair) — generalized
//! from "one handler per job type" to "one handler per (resource, operation)".

use crate::error::KurbisioError;
use crate::model::config_doc::Operation;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type InterceptorContext = HashMap<String, String>;

type BoxedInterceptor = Arc<
    dyn Fn(InterceptorContext, Option<Value>) -> Pin<Box<dyn Future<Output = Result<Option<Value>, KurbisioError>> + Send>>
        + Send
        + Sync,
>;

/// Registry of single-handler-per-(resource, operation) interceptors (§9 Open
/// Question c: multi-subscriber semantics are explicitly out of scope).
#[derive(Default, Clone)]
pub struct InterceptorRegistry {
    handlers: HashMap<(String, Operation), BoxedInterceptor>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `handle_resource_request` (§4.10). Property-update calls never pass through
    /// this registry (disallowed in the spec).
    pub fn register<F, Fut>(&mut self, resource: impl Into<String>, op: Operation, handler: F)
    where
        F: Fn(InterceptorContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, KurbisioError>> + Send + 'static,
    {
        self.handlers.insert(
            (resource.into(), op),
            Arc::new(move |ctx, payload| Box::pin(handler(ctx, payload))),
        );
    }

    /// Run the interceptor for `(resource, op)` if one is registered. Returns the
    /// original payload unchanged when no interceptor is installed, the replacement
    /// payload when the interceptor substitutes one, or propagates the interceptor's
    /// error. Callers map a returned error to 400 (writes) or 500 (reads) per §4.10.
    pub async fn intercept(
        &self,
        resource: &str,
        op: Operation,
        ctx: InterceptorContext,
        payload: Option<Value>,
    ) -> Result<Option<Value>, KurbisioError> {
        match self.handlers.get(&(resource.to_string(), op)) {
            Some(handler) => handler(ctx, payload).await,
            None => Ok(payload),
        }
    }

    pub fn is_registered(&self, resource: &str, op: Operation) -> bool {
        self.handlers.contains_key(&(resource.to_string(), op))
    }
}
