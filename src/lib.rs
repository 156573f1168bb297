//! Proxy configuration reconciliation library.

pub mod admin;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod reload;
pub mod render;

pub use config::EngineConfig;
pub use engine::{Event, Reconciler};
pub use lifecycle::Shutdown;
