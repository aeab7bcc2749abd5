//! Configuration-driven REST backend generator.
//!
//! Given a declarative JSON description of resources, [`engine::Engine`] materializes a
//! PostgreSQL schema and a full CRUD + listing HTTP surface, and drives a durable
//! background job pipeline for notifications and user-raised events.

pub mod auth;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod etag;
pub mod interceptor;
pub mod jobs;
pub mod model;
pub mod notification;
pub mod pagination;
pub mod query;
pub mod resource;
pub mod schema;
pub mod server;
pub mod storage;

pub use config::Config;
pub use engine::Engine;
pub use error::KurbisioError;
