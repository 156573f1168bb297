//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! SIGHUP          → signals.rs → ReloadConfig → reload file → config-changed event
//! SIGTERM/SIGINT  → signals.rs → Shutdown → event loop exits after its pass
//!                                         → shutdown.rs broadcast → admin API drains
//! ```
//!
//! # Design Decisions
//! - A pass is never cancelled midway; the loop only checks for shutdown
//!   between events
//! - Persisted state is restored by the reconciler at construction

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_listener, SignalEvent};
