//! Reload subsystem.
//!
//! # Data Flow
//! ```text
//! RenderedConfig
//!     → coordinator.rs (lock, fast path, write, validate, swap)
//!     → collaborators.rs (syntax check, reload signal, health probe)
//!     → Applied | Unchanged | error with live file intact
//! ```
//!
//! # Design Decisions
//! - The only place in the engine that touches the filesystem or the proxy
//! - One apply at a time, in-process and across processes
//! - The health wait is the only blocking step and is always bounded

pub mod collaborators;
pub mod coordinator;

pub use collaborators::{
    CommandProbe, CommandSignaler, CommandValidator, HealthProbe, HttpProbe, ProbeStatus,
    ReloadSignaler, SyntaxValidator,
};
pub use coordinator::{ApplyOutcome, ReloadCoordinator, ReloadError, ReloadPaths};
