//! rspolicy-storage: Event journal abstraction layer
//!
//! This crate provides the persistence abstraction for policy events:
//! - EventJournal trait for append-only, per-id ordered logs
//! - In-memory implementation for testing and single-node use
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              rspolicy-storage               │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs - EventJournal, StoredEvent      │
//! │  memory.rs - In-memory implementation       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Storage knows nothing about policies. Events are stored as JSON payloads
//! keyed by persistence id and revision.

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryEventJournal;
pub use traits::{EventJournal, StoredEvent};
