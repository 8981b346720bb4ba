//! Domain types
//!
//! - Watch definitions (one configured mirroring rule each)
//! - Debounce keys identifying a (definition, path) pair
//! - Domain-specific error types

pub mod errors;
pub mod watch;

pub use errors::DomainError;
pub use watch::{DebounceKey, WatchDefinition};
