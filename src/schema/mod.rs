//! Schema materialization (C2): idempotent DDL generation and advisory-lock-guarded
//! migration of the declarative configuration onto a live PostgreSQL schema.

pub mod advisory_lock;
pub mod materializer;

pub use materializer::{ddl_for_resource, materialize, RELATION_DDL_KIND};
