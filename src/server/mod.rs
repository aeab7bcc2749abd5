//! HTTP surface (§4.4-§4.8, §6, §7): router wiring, middleware, and the generic
//! path-dispatch handler that drives every configured resource.

pub mod app;
pub mod middleware;
pub mod routes;

pub use app::build_router;
