//! Reconciliation engine subsystem.
//!
//! # Data Flow
//! ```text
//! config watcher ─┐
//! SIGHUP ─────────┤→ mpsc<Event> → Reconciler::handle (one event at a time)
//! admin API ──────┘        │
//!                          ├→ catalog / registry mutation
//!                          ├→ credentials → render → state file → reload
//!                          └→ StatusSnapshot (ArcSwap) → admin API reads
//! ```
//!
//! # Design Decisions
//! - One consumer owns all state; passes never overlap
//! - Config changes are fully parsed before anything is replaced
//! - State is persisted before apply, so a restart sees the same inputs

pub mod events;
pub mod reconciler;
pub mod state;

pub use events::{BackendEvent, Event};
pub use reconciler::{
    BackendStatus, PassReport, PassSummary, PortDelta, ReconcileError, Reconciler, ServiceStatus,
    SharedStatus, StatusSnapshot,
};
pub use state::{EngineState, StateError};
