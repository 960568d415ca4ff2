//! HTTP API
//!
//! Thin axum layer over the forwarding core: request validation, JSON
//! shaping, CORS and request logging.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
