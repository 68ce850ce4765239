//! Common types module for the orderdesk system.
//!
//! This module defines the data model shared by every orderdesk crate: placed
//! orders and their status lifecycle, customer identity and session state,
//! cart backups, pagination cursors and the change-feed event shapes.

/// Cart backup types used for disaster recovery of the active cart.
pub mod cart;
/// Change-feed and desk event types.
pub mod events;
/// Customer identity, guest sessions and staff-assisted overrides.
pub mod identity;
/// Placed orders, line items and the status lifecycle.
pub mod order;
/// Query filters, pagination cursors and display-ready rows.
pub mod query;
/// Storage namespaces.
pub mod storage;
/// Utility functions for display formatting.
pub mod utils;

// Re-export all types for convenient access
pub use cart::*;
pub use events::*;
pub use identity::*;
pub use order::*;
pub use query::*;
pub use storage::*;
pub use utils::{format_location, truncate_id, TAKE_AWAY, WALK_IN_STAY};
