//! Collaborator interface of the remote order store and its change feed.

use async_trait::async_trait;
use orderdesk_types::{FeedMessage, NewOrder, Order, OrderId, OrderPatch, OrderQuery};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by the remote order store.
#[derive(Debug, Error)]
pub enum OrderStoreError {
	/// The store could not be reached.
	#[error("Order store unavailable: {0}")]
	Unavailable(String),
	/// The store rejected the request.
	#[error("Order store rejected request: {0}")]
	Rejected(String),
	/// A row could not be decoded.
	#[error("Serialization error: {0}")]
	Serialization(String),
}

/// Receiving end of a change-feed subscription.
///
/// Dropping it ends the subscription.
pub type FeedSubscription = mpsc::UnboundedReceiver<FeedMessage>;

/// Typed access to the remote order collection.
#[async_trait]
pub trait OrderStore: Send + Sync {
	/// Returns up to `query.limit` orders, newest first, strictly older than
	/// the cursor when one is given. Unset filters mean no constraint.
	async fn query(&self, query: &OrderQuery) -> Result<Vec<Order>, OrderStoreError>;

	/// Applies `patch` to one order and returns the number of rows affected.
	async fn update(&self, id: OrderId, patch: &OrderPatch) -> Result<u64, OrderStoreError>;

	/// Applies `patch` to every listed order and returns the number of rows affected.
	async fn update_many(
		&self,
		ids: &[OrderId],
		patch: &OrderPatch,
	) -> Result<u64, OrderStoreError>;

	/// Inserts a new order and returns it with its assigned id and timestamps.
	async fn insert(&self, order: NewOrder) -> Result<Order, OrderStoreError>;

	/// Deletes the listed orders and returns the number of rows removed.
	async fn delete(&self, ids: &[OrderId]) -> Result<u64, OrderStoreError>;
}

/// Push channel reporting row-level changes to the order collection.
///
/// Delivery is at-least-once; the same change may be reported twice.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
	async fn subscribe(&self) -> Result<FeedSubscription, OrderStoreError>;
}
