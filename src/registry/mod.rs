//! Backend registry subsystem.
//!
//! # Data Flow
//! ```text
//! backend-joined / backend-changed → store.rs upsert
//! backend-departed                 → store.rs remove
//! source-torn-down                 → store.rs drop_source
//!     → snapshot consumed by the renderer and the admin API
//! ```
//!
//! # Design Decisions
//! - Keyed by source, then `(host, port)`; a source owns its entries
//! - Ordered maps everywhere so every query is deterministic
//! - No liveness timeout: a silent source keeps its entries until torn down

pub mod backend;
pub mod store;

pub use backend::{Backend, BackendState};
pub use store::BackendRegistry;
