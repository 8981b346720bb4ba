//! mirrorwatch Core - Domain types, configuration, and port definitions
//!
//! This crate contains the pieces shared by the mirroring engine and the daemon:
//! - **Domain types** - `WatchDefinition`, `DebounceKey`, `DomainError`
//! - **Configuration** - YAML loading, validation, and first-run bootstrap
//! - **Port definitions** - `IMirrorFileSystem`, the seam between the copy
//!   pipeline and the real filesystem
//!
//! # Architecture
//!
//! The domain module is pure: it computes paths and applies filters without
//! touching the disk, apart from root validation. All destination mutations go
//! through the port trait so adapters (and test doubles) can be swapped in.

pub mod config;
pub mod domain;
pub mod ports;
