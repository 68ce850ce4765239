//! Change-feed reconciliation.
//!
//! A subscription runs one task that narrows raw feed messages into typed
//! events, buffers inserts and updates by order id, and flushes the buffer
//! into the [`OrderView`] as one batch once the feed has been quiet for the
//! throttle window. Deletes skip the buffer and apply at once.
//!
//! Lifecycle per subscription:
//! `Idle -> Subscribed -> Buffering -> Flushing -> Subscribed -> ... -> Closed`.

use crate::engine::event_bus::EventBus;
use crate::view::{MergeOutcome, OrderView};
use orderdesk_storage::{ChangeFeed, FeedSubscription, OrderStoreError};
use orderdesk_types::{ChangeEvent, DeskEvent, FeedMessage, FeedStatus, Order, OrderId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Errors raised when a subscription cannot be opened.
#[derive(Debug, Error)]
pub enum ReconcilerError {
	#[error("Failed to subscribe to change feed: {0}")]
	Subscribe(#[from] OrderStoreError),
}

/// State of a feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
	Idle,
	Subscribed,
	/// Events are buffered and a flush is scheduled.
	Buffering,
	Flushing,
	Closed,
}

/// A change applied to the view, reported to the subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewChange {
	/// A buffered batch was merged.
	Batch {
		order_ids: Vec<OrderId>,
		outcome: MergeOutcome,
	},
	/// An order was removed.
	Deleted { order_id: OrderId, removed: bool },
}

/// Callback invoked after each change applied to the view.
pub type BatchCallback = Box<dyn FnMut(&ViewChange) + Send>;

/// Merges change-feed events into an [`OrderView`].
pub struct ChangeFeedReconciler {
	feed: Arc<dyn ChangeFeed>,
	view: OrderView,
	throttle: Duration,
	event_bus: EventBus,
}

impl ChangeFeedReconciler {
	pub fn new(
		feed: Arc<dyn ChangeFeed>,
		view: OrderView,
		throttle: Duration,
		event_bus: EventBus,
	) -> Self {
		Self {
			feed,
			view,
			throttle,
			event_bus,
		}
	}

	/// Opens a feed subscription and starts reconciling.
	///
	/// `on_batch` runs after every change applied to the view, from the
	/// subscription task. Dropping or unsubscribing the returned handle stops
	/// the task and discards anything still buffered.
	pub async fn subscribe<F>(&self, on_batch: F) -> Result<Subscription, ReconcilerError>
	where
		F: FnMut(&ViewChange) + Send + 'static,
	{
		let (state_tx, state_rx) = watch::channel(ReconcilerState::Idle);
		let (status_tx, status_rx) = watch::channel(FeedStatus::Connecting);
		let messages = self.feed.subscribe().await?;
		let (shutdown_tx, shutdown_rx) = oneshot::channel();

		state_tx.send_replace(ReconcilerState::Subscribed);
		let worker = Worker {
			view: self.view.clone(),
			throttle: self.throttle,
			event_bus: self.event_bus.clone(),
			on_batch: Box::new(on_batch),
			state: state_tx,
			status: status_tx,
			buffer: HashMap::new(),
			deadline: None,
		};
		let handle = tokio::spawn(worker.run(messages, shutdown_rx));

		tracing::info!(throttle_ms = self.throttle.as_millis() as u64, "Subscribed to order feed");
		Ok(Subscription {
			shutdown: Some(shutdown_tx),
			handle,
			state: state_rx,
			status: status_rx,
		})
	}
}

/// Handle to a running feed subscription.
pub struct Subscription {
	shutdown: Option<oneshot::Sender<()>>,
	handle: JoinHandle<()>,
	state: watch::Receiver<ReconcilerState>,
	status: watch::Receiver<FeedStatus>,
}

impl Subscription {
	pub fn state(&self) -> ReconcilerState {
		*self.state.borrow()
	}

	/// Last connection status reported by the feed.
	pub fn feed_status(&self) -> FeedStatus {
		*self.status.borrow()
	}

	pub fn is_connected(&self) -> bool {
		self.feed_status() == FeedStatus::Connected
	}

	/// Receiver for connection status changes.
	pub fn watch_status(&self) -> watch::Receiver<FeedStatus> {
		self.status.clone()
	}

	/// Stops the subscription. A pending flush is cancelled, not applied.
	pub async fn unsubscribe(mut self) {
		if let Some(shutdown) = self.shutdown.take() {
			shutdown.send(()).ok();
		}
		if let Err(e) = (&mut self.handle).await {
			if !e.is_cancelled() {
				tracing::error!(error = %e, "Feed task ended abnormally");
			}
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.handle.abort();
	}
}

struct Worker {
	view: OrderView,
	throttle: Duration,
	event_bus: EventBus,
	on_batch: BatchCallback,
	state: watch::Sender<ReconcilerState>,
	status: watch::Sender<FeedStatus>,
	buffer: HashMap<OrderId, Order>,
	deadline: Option<Instant>,
}

impl Worker {
	async fn run(mut self, mut messages: FeedSubscription, mut shutdown: oneshot::Receiver<()>) {
		let mut feed_open = true;

		loop {
			let deadline = self.deadline;
			let flush_due = async move {
				match deadline {
					Some(at) => tokio::time::sleep_until(at).await,
					None => std::future::pending().await,
				}
			};

			tokio::select! {
				biased;

				_ = &mut shutdown => {
					if !self.buffer.is_empty() {
						tracing::debug!(discarded = self.buffer.len(), "Dropping buffered feed events");
					}
					break;
				}

				message = messages.recv(), if feed_open => match message {
					Some(FeedMessage::Event(raw)) => match ChangeEvent::try_from(raw) {
						Ok(event) => self.handle_event(event).await,
						Err(e) => tracing::warn!(error = %e, "Skipping invalid feed payload"),
					},
					Some(FeedMessage::Status(status)) => self.set_status(status),
					None => {
						feed_open = false;
						self.set_status(FeedStatus::Disconnected);
						if self.deadline.is_none() {
							break;
						}
					}
				},

				_ = flush_due => {
					self.flush().await;
					if !feed_open {
						break;
					}
				}
			}
		}

		self.state.send_replace(ReconcilerState::Closed);
		tracing::info!("Order feed subscription closed");
	}

	async fn handle_event(&mut self, event: ChangeEvent) {
		match event {
			ChangeEvent::Insert(order) | ChangeEvent::Update(order) => {
				self.buffer.insert(order.id, order);
				self.deadline = Some(Instant::now() + self.throttle);
				self.state.send_replace(ReconcilerState::Buffering);
			},
			ChangeEvent::Delete(order_id) => {
				self.buffer.remove(&order_id);
				let removed = self.view.remove(&[order_id]).await > 0;
				tracing::debug!(order_id, removed, "Applied feed delete");
				(self.on_batch)(&ViewChange::Deleted { order_id, removed });
				if self.buffer.is_empty() {
					self.deadline = None;
					self.state.send_replace(ReconcilerState::Subscribed);
				}
			},
		}
	}

	async fn flush(&mut self) {
		self.deadline = None;
		if self.buffer.is_empty() {
			self.state.send_replace(ReconcilerState::Subscribed);
			return;
		}

		self.state.send_replace(ReconcilerState::Flushing);
		let orders: Vec<Order> = self.buffer.drain().map(|(_, order)| order).collect();
		let order_ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
		let outcome = self.view.merge_batch(orders).await;

		tracing::debug!(
			batch_size = order_ids.len(),
			replaced = outcome.replaced,
			prepended = outcome.prepended,
			"Flushed feed batch"
		);
		self.event_bus
			.publish(DeskEvent::BatchApplied {
				order_ids: order_ids.clone(),
			})
			.ok();
		(self.on_batch)(&ViewChange::Batch { order_ids, outcome });
		self.state.send_replace(ReconcilerState::Subscribed);
	}

	fn set_status(&mut self, status: FeedStatus) {
		let previous = self.status.send_replace(status);
		if previous == status {
			return;
		}
		match status {
			FeedStatus::Disconnected => tracing::warn!("Order feed disconnected"),
			_ => tracing::info!(status = ?status, "Order feed status changed"),
		}
		self.event_bus
			.publish(DeskEvent::FeedStatusChanged { status })
			.ok();
	}
}
