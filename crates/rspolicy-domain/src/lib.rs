//! rspolicy-domain: Core policy domain logic
//!
//! This crate contains the policy logic including:
//! - Policy model (ids, labels, entries, imports)
//! - Import merge resolution
//! - Enforcers built from merged entries
//! - Policy validation and size limits
//! - The event-sourced policy aggregate
//! - Policy and enforcer caches with cascading invalidation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 rspolicy-domain                 │
//! ├─────────────────────────────────────────────────┤
//! │  model/      - Policy, entries, imports         │
//! │  resolver/   - Import merge                     │
//! │  enforcer/   - Permission evaluation            │
//! │  validation/ - Structure and size checks        │
//! │  aggregate/  - Commands, events, state machine  │
//! │  cache/      - Policy and enforcer caches       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! The crate performs no I/O of its own. Persistence and the process owning
//! each aggregate live in the server crate.

pub mod aggregate;
pub mod cache;
pub mod enforcer;
pub mod error;
pub mod model;
pub mod resolver;
pub mod validation;

// Re-export commonly used types at the crate root
pub use aggregate::{CommandContext, CommandResult, PolicyAggregate, PolicyCommand, PolicyEvent};
pub use cache::{CacheConfig, EnforcerCache, Entry, ExpiryMode, PolicyCache};
pub use error::{DomainError, DomainResult};
pub use model::{Label, Policy, PolicyId};
