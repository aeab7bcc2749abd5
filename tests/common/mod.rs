//! Shared integration-test infrastructure: a container-backed Postgres plus a
//! fully-built [`kurbisio::engine::Engine`] and HTTP request helpers.

pub mod harness;

pub use harness::TestHarness;
