//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the mirroring engine depends on; their
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IMirrorFileSystem`] - Destination-side filesystem primitives used by
//!   the copy pipeline and rename handler

pub mod mirror_filesystem;

pub use mirror_filesystem::IMirrorFileSystem;
