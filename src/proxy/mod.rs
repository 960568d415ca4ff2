//! Proxy pool management and request forwarding
//!
//! This module provides:
//! - The in-memory proxy store and its JSON loader
//! - Selection policies (round-robin, random, fastest, explicit)
//! - Single-attempt forwarding and the retry orchestrator
//! - Periodic health probing

pub mod forwarder;
pub mod health;
pub mod loader;
pub mod orchestrator;
pub mod rotation;
pub mod store;
pub mod transport;

pub use forwarder::{AttemptFailure, AttemptSuccess, Forwarder};
pub use health::{HealthProber, HealthProberConfig, HealthProberHandle, ProbeSummary};
pub use orchestrator::{ForwardOptions, RetryConfig, RetryOrchestrator};
pub use rotation::{create_selector, PoolSelector, ProxySelector, SelectionPolicy};
pub use store::ProxyStore;
pub use transport::{ProxyTransport, ReqwestTransport};
