//! Services above the individual player.
//!
//! This module contains the registry that owns every guild's player, the
//! router that fans node events out to them, and session persistence.

pub mod persistence;
pub mod registry;

pub use persistence::{PlayerSnapshot, SnapshotDocument, SnapshotStore, StorageError};
pub use registry::PlayerRegistry;
