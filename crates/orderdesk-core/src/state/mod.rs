//! Status management for placed orders.
//!
//! Provides the status state machine used by the dashboard: the transition
//! table for single-order changes, bulk overrides and order deletion.

pub mod order;

pub use order::{
	is_valid_transition, next_status, StatusTransitionMachine, TransitionError, TransitionOutcome,
};
