//! Order synchronization and customer identity core for orderdesk.
//!
//! This crate keeps an operations dashboard's view of orders consistent with
//! a remote order store that staff, customers and a push-based change feed
//! mutate concurrently. It also decides who an order belongs to across guest,
//! account and staff-assisted checkouts, and keeps the active cart recoverable
//! when device storage is wiped.
//!
//! The main pieces:
//! - [`identity::IdentityResolver`] maps session state onto an order identity
//! - [`cart::CartPersistenceGuard`] mirrors the cart to a remote backup
//! - [`query::OrderQueryEngine`] loads keyset-paginated, filtered pages
//! - [`feed::ChangeFeedReconciler`] merges feed events into the shared view
//! - [`state::StatusTransitionMachine`] validates and applies status changes
//!
//! [`builder::DeskBuilder`] assembles them into an [`engine::OrderDesk`].

pub mod builder;
pub mod cart;
pub mod checkout;
pub mod dashboard;
pub mod engine;
pub mod feed;
pub mod identity;
pub mod notify;
pub mod query;
pub mod state;
pub mod view;

pub use builder::{BuilderError, DeskBuilder};
pub use cart::{Cart, CartPersistenceGuard, LocalCartStore, RestoreOutcome};
pub use checkout::{Checkout, CheckoutError};
pub use dashboard::{DashboardError, DashboardSession, LoadOutcome};
pub use engine::{event_bus::EventBus, EngineError, OrderDesk};
pub use feed::{ChangeFeedReconciler, ReconcilerError, ReconcilerState, Subscription, ViewChange};
pub use identity::{IdentityError, IdentityResolver, IdentitySource};
pub use notify::{Notifier, TracingNotifier};
pub use query::{FetchError, OrderQueryEngine};
pub use state::{
	is_valid_transition, next_status, StatusTransitionMachine, TransitionError, TransitionOutcome,
};
pub use view::{MergeOutcome, OrderView, PageFetch};
