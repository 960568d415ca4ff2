//! Whiskey - Rotating Proxy Fetcher
//!
//! Forwards HTTP requests to arbitrary targets through a pool of upstream
//! proxies.
//!
//! ## Features
//!
//! - Per-request proxy selection (round-robin, random, fastest, explicit)
//! - Type and country filters
//! - Retries through other proxies with a fixed backoff and an overall deadline
//! - HTTP, SOCKS4 and SOCKS5 upstream proxies
//! - Periodic health probing feeding the `fastest` policy

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;

pub use config::Config;
pub use error::{Result, WhiskeyError};
