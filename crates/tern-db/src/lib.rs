//! tern-db - Warehouse adapter seam for Tern
//!
//! This crate defines the [`Adapter`] trait the scheduler executes through
//! (execute / cancel / connection tracking) and the in-memory backend used
//! as the default target and in tests. Real warehouse backends implement
//! the same trait.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{DbError, DbResult};
pub use memory::{MemoryAdapter, RecordedStatement};
pub use traits::{Adapter, AdapterResponse, ResultTable};
