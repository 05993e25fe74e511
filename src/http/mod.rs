//! HTTP surface: operator API, health, static assets

pub mod middleware;
pub mod routes;

pub use routes::build_router;
