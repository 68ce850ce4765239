//! Order status state machine.
//!
//! Staff move a single order forward through
//! `new -> preparing -> ready -> delivery -> completed -> paid`, or cancel it
//! from any non-terminal state. Bulk changes are an administrative override
//! and may set any status. Every write is mirrored into the [`OrderView`]
//! before the store confirms it and rolled back if the store refuses.

use crate::engine::event_bus::EventBus;
use crate::notify::Notifier;
use crate::view::OrderView;
use chrono::Utc;
use once_cell::sync::Lazy;
use orderdesk_storage::{OrderStore, OrderStoreError};
use orderdesk_types::{DeskEvent, Order, OrderId, OrderPatch, OrderStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while changing order status.
#[derive(Debug, Error)]
pub enum TransitionError {
	#[error("Invalid status transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order not loaded: {0}")]
	UnknownOrder(OrderId),
	#[error("No orders selected")]
	EmptySelection,
	/// The store accepted the request but changed nothing.
	#[error("Write affected no rows ({requested} requested)")]
	WriteAffectedZero { requested: usize },
	#[error("Store error: {0}")]
	Store(#[from] OrderStoreError),
}

/// Result of a single-order request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
	/// The order moved to a new status.
	Applied(Order),
	/// The order is terminal; nothing was written.
	Unchanged(OrderStatus),
}

/// Returns the status a single click advances to.
///
/// Terminal statuses are returned unchanged; callers treat that as a no-op.
pub fn next_status(current: OrderStatus) -> OrderStatus {
	match current {
		OrderStatus::New => OrderStatus::Preparing,
		OrderStatus::Preparing => OrderStatus::Ready,
		OrderStatus::Ready => OrderStatus::Delivery,
		OrderStatus::Delivery => OrderStatus::Completed,
		OrderStatus::Completed => OrderStatus::Paid,
		OrderStatus::Paid => OrderStatus::Paid,
		OrderStatus::Cancelled => OrderStatus::Cancelled,
	}
}

/// Checks whether staff may move a single order from `from` to `to`.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
	// Each state maps to its allowed next states
	static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
		let mut m = HashMap::new();
		for status in OrderStatus::all() {
			let mut allowed = HashSet::new();
			if !status.is_terminal() {
				allowed.insert(next_status(status));
				allowed.insert(OrderStatus::Cancelled);
			}
			m.insert(status, allowed);
		}
		m
	});

	TRANSITIONS.get(&from).is_some_and(|set| set.contains(&to))
}

/// Validates and applies order status changes.
///
/// Failures are reported through the [`Notifier`] as well as returned.
pub struct StatusTransitionMachine {
	store: Arc<dyn OrderStore>,
	view: OrderView,
	event_bus: EventBus,
	notifier: Arc<dyn Notifier>,
}

impl StatusTransitionMachine {
	pub fn new(
		store: Arc<dyn OrderStore>,
		view: OrderView,
		event_bus: EventBus,
		notifier: Arc<dyn Notifier>,
	) -> Self {
		Self {
			store,
			view,
			event_bus,
			notifier,
		}
	}

	/// Advances a loaded order by one step.
	pub async fn advance(&self, order_id: OrderId) -> Result<TransitionOutcome, TransitionError> {
		let current = self.loaded(order_id).await?;
		let next = next_status(current.status);
		if next == current.status {
			return Ok(TransitionOutcome::Unchanged(current.status));
		}
		self.write_single(current, next).await
	}

	/// Cancels a loaded order. Terminal orders are left unchanged.
	pub async fn cancel(&self, order_id: OrderId) -> Result<TransitionOutcome, TransitionError> {
		let current = self.loaded(order_id).await?;
		if current.status.is_terminal() {
			return Ok(TransitionOutcome::Unchanged(current.status));
		}
		self.write_single(current, OrderStatus::Cancelled).await
	}

	/// Moves a loaded order to `target` along a legal edge.
	pub async fn transition(
		&self,
		order_id: OrderId,
		target: OrderStatus,
	) -> Result<TransitionOutcome, TransitionError> {
		let current = self.loaded(order_id).await?;
		if !is_valid_transition(current.status, target) {
			return Err(self.fail(TransitionError::InvalidTransition {
				from: current.status,
				to: target,
			}));
		}
		self.write_single(current, target).await
	}

	/// Sets `target` on every listed order, regardless of edges.
	///
	/// Returns the number of rows the store reports as affected. Zero
	/// affected rows is an error even when the request itself succeeded.
	#[instrument(skip(self), fields(count = order_ids.len()))]
	pub async fn bulk_transition(
		&self,
		order_ids: &[OrderId],
		target: OrderStatus,
	) -> Result<u64, TransitionError> {
		if order_ids.is_empty() {
			return Err(self.fail(TransitionError::EmptySelection));
		}

		let patch = OrderPatch::status(target, Utc::now());
		let mut previous = Vec::new();
		let mut optimistic = Vec::new();
		for id in order_ids {
			if let Some(order) = self.view.get(*id).await {
				let mut updated = order.clone();
				patch.apply_to(&mut updated);
				previous.push(order);
				optimistic.push(updated);
			}
		}
		self.view.merge_batch(optimistic).await;

		let affected = match self.store.update_many(order_ids, &patch).await {
			Ok(0) => Err(TransitionError::WriteAffectedZero {
				requested: order_ids.len(),
			}),
			Ok(affected) => Ok(affected),
			Err(e) => Err(TransitionError::Store(e)),
		};

		match affected {
			Ok(affected) => {
				tracing::info!(to = %target, affected, "Bulk status change applied");
				self.event_bus
					.publish(DeskEvent::BulkStatusChanged {
						order_ids: order_ids.to_vec(),
						to: target,
						affected,
					})
					.ok();
				self.notifier
					.success(&format!("Marked {} orders {}", affected, target));
				Ok(affected)
			},
			Err(e) => {
				tracing::warn!(to = %target, error = %e, "Bulk status change failed, reverting");
				self.view.merge_batch(previous).await;
				Err(self.fail(e))
			},
		}
	}

	/// Deletes orders, removing them from the view first.
	///
	/// On failure the removed rows go back where they were.
	#[instrument(skip(self), fields(count = order_ids.len()))]
	pub async fn delete_orders(&self, order_ids: &[OrderId]) -> Result<u64, TransitionError> {
		if order_ids.is_empty() {
			return Err(self.fail(TransitionError::EmptySelection));
		}

		let mut removed = Vec::new();
		for id in order_ids {
			if let Some(order) = self.view.get(*id).await {
				removed.push(order);
			}
		}
		self.view.remove(order_ids).await;

		let failure = match self.store.delete(order_ids).await {
			Ok(0) => TransitionError::WriteAffectedZero {
				requested: order_ids.len(),
			},
			Ok(deleted) => {
				tracing::info!(deleted, "Orders deleted");
				self.event_bus
					.publish(DeskEvent::OrdersDeleted {
						order_ids: order_ids.to_vec(),
					})
					.ok();
				self.notifier.success(&format!("Deleted {} orders", deleted));
				return Ok(deleted);
			},
			Err(e) => TransitionError::Store(e),
		};

		tracing::warn!(error = %failure, "Delete failed, restoring rows");
		self.view.restore(removed).await;
		Err(self.fail(failure))
	}

	async fn loaded(&self, order_id: OrderId) -> Result<Order, TransitionError> {
		match self.view.get(order_id).await {
			Some(order) => Ok(order),
			None => Err(self.fail(TransitionError::UnknownOrder(order_id))),
		}
	}

	fn fail(&self, error: TransitionError) -> TransitionError {
		self.notifier.error(&error.to_string());
		error
	}

	#[instrument(skip(self, current), fields(order_id = current.id, from = %current.status))]
	async fn write_single(
		&self,
		current: Order,
		target: OrderStatus,
	) -> Result<TransitionOutcome, TransitionError> {
		let patch = OrderPatch::status(target, Utc::now());
		let mut updated = current.clone();
		patch.apply_to(&mut updated);
		self.view.merge_batch(vec![updated.clone()]).await;

		let failure = match self.store.update(current.id, &patch).await {
			Ok(0) => TransitionError::WriteAffectedZero { requested: 1 },
			Ok(_) => {
				tracing::info!(to = %target, "Order status changed");
				self.event_bus
					.publish(DeskEvent::StatusChanged {
						order_id: current.id,
						from: current.status,
						to: target,
					})
					.ok();
				return Ok(TransitionOutcome::Applied(updated));
			},
			Err(e) => TransitionError::Store(e),
		};

		tracing::warn!(to = %target, error = %failure, "Status change failed, reverting");
		self.view.merge_batch(vec![current]).await;
		Err(self.fail(failure))
	}
}
