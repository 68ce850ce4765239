//! Utility functions for display formatting.

pub mod formatting;

pub use formatting::{format_location, truncate_id, TAKE_AWAY, WALK_IN_STAY};
