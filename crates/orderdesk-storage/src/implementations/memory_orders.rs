//! In-memory order store with a live change feed.
//!
//! Used by the desk binary and by tests. Every write is reported to feed
//! subscribers. The feed connection can be dropped and restored to exercise
//! reconnect behavior: changes made while disconnected are delivered after
//! the `Connected` status on reconnect.

use crate::orders::{ChangeFeed, FeedSubscription, OrderStore, OrderStoreError};
use async_trait::async_trait;
use chrono::Utc;
use orderdesk_types::{
	newest_first, FeedMessage, FeedStatus, NewOrder, Order, OrderId, OrderPatch, OrderQuery,
	RawChangeEvent,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex, RwLock};

#[derive(Default)]
struct Rows {
	orders: BTreeMap<OrderId, Order>,
	last_id: OrderId,
}

#[derive(Default)]
struct Feed {
	subscribers: Vec<mpsc::UnboundedSender<FeedMessage>>,
	connected: bool,
	backlog: Vec<RawChangeEvent>,
}

impl Feed {
	fn broadcast(&mut self, message: FeedMessage) {
		self.subscribers.retain(|tx| tx.send(message.clone()).is_ok());
	}

	fn publish(&mut self, event: RawChangeEvent) {
		if self.connected {
			self.broadcast(FeedMessage::Event(event));
		} else {
			self.backlog.push(event);
		}
	}
}

/// In-memory order store.
pub struct MemoryOrderStore {
	rows: RwLock<Rows>,
	feed: Mutex<Feed>,
	offline: AtomicBool,
}

impl MemoryOrderStore {
	pub fn new() -> Self {
		Self {
			rows: RwLock::new(Rows::default()),
			feed: Mutex::new(Feed {
				connected: true,
				..Feed::default()
			}),
			offline: AtomicBool::new(false),
		}
	}

	/// Loads an existing order verbatim, keeping its id and timestamps.
	///
	/// Imports are not reported on the feed.
	pub async fn import(&self, order: Order) {
		let mut rows = self.rows.write().await;
		rows.last_id = rows.last_id.max(order.id);
		rows.orders.insert(order.id, order);
	}

	pub async fn get(&self, id: OrderId) -> Option<Order> {
		self.rows.read().await.orders.get(&id).cloned()
	}

	pub async fn len(&self) -> usize {
		self.rows.read().await.orders.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}

	/// Makes every store call fail with `Unavailable` until switched back.
	pub fn set_offline(&self, offline: bool) {
		self.offline.store(offline, Ordering::SeqCst);
	}

	/// Drops the feed connection. Changes are held back until reconnect.
	pub async fn disconnect_feed(&self) {
		let mut feed = self.feed.lock().await;
		feed.connected = false;
		feed.broadcast(FeedMessage::Status(FeedStatus::Disconnected));
	}

	/// Restores the feed connection and delivers the held-back changes.
	pub async fn reconnect_feed(&self) {
		let mut feed = self.feed.lock().await;
		feed.connected = true;
		feed.broadcast(FeedMessage::Status(FeedStatus::Connected));
		for event in std::mem::take(&mut feed.backlog) {
			feed.broadcast(FeedMessage::Event(event));
		}
	}

	/// Reports a change on the feed without touching the rows.
	///
	/// Simulates duplicate or late deliveries.
	pub async fn replay(&self, event: RawChangeEvent) {
		self.feed.lock().await.publish(event);
	}

	fn ensure_online(&self) -> Result<(), OrderStoreError> {
		if self.offline.load(Ordering::SeqCst) {
			return Err(OrderStoreError::Unavailable("store is offline".into()));
		}
		Ok(())
	}

	async fn patch_rows(&self, ids: &[OrderId], patch: &OrderPatch) -> u64 {
		let mut changed = Vec::new();
		{
			let mut rows = self.rows.write().await;
			for id in ids {
				if let Some(order) = rows.orders.get_mut(id) {
					patch.apply_to(order);
					if patch.updated_at.is_none() {
						order.updated_at = Utc::now();
					}
					changed.push(RawChangeEvent::update(order));
				}
			}
		}

		let affected = changed.len() as u64;
		let mut feed = self.feed.lock().await;
		for event in changed {
			feed.publish(event);
		}
		affected
	}
}

impl Default for MemoryOrderStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
	async fn query(&self, query: &OrderQuery) -> Result<Vec<Order>, OrderStoreError> {
		self.ensure_online()?;
		let rows = self.rows.read().await;
		let mut matched: Vec<&Order> = rows
			.orders
			.values()
			.filter(|order| query.filters.matches(order))
			.filter(|order| query.cursor.is_none_or(|cursor| cursor.precedes(order)))
			.collect();
		matched.sort_by(|a, b| newest_first(&(a.created_at, a.id), &(b.created_at, b.id)));
		Ok(matched.into_iter().take(query.limit).cloned().collect())
	}

	async fn update(&self, id: OrderId, patch: &OrderPatch) -> Result<u64, OrderStoreError> {
		self.ensure_online()?;
		Ok(self.patch_rows(&[id], patch).await)
	}

	async fn update_many(
		&self,
		ids: &[OrderId],
		patch: &OrderPatch,
	) -> Result<u64, OrderStoreError> {
		self.ensure_online()?;
		Ok(self.patch_rows(ids, patch).await)
	}

	async fn insert(&self, new: NewOrder) -> Result<Order, OrderStoreError> {
		self.ensure_online()?;
		let order = {
			let mut rows = self.rows.write().await;
			rows.last_id += 1;
			let now = Utc::now();
			let order = Order {
				id: rows.last_id,
				user_id: new.user_id,
				guest_user_id: new.guest_user_id,
				guest_first_name: new.guest_first_name,
				stay_id: new.stay_id,
				customer_name: new.customer_name,
				table_number: new.table_number,
				status: new.status,
				items: new.items,
				total_amount: new.total_amount,
				created_at: now,
				updated_at: now,
			};
			rows.orders.insert(order.id, order.clone());
			order
		};

		self.feed
			.lock()
			.await
			.publish(RawChangeEvent::insert(&order));
		Ok(order)
	}

	async fn delete(&self, ids: &[OrderId]) -> Result<u64, OrderStoreError> {
		self.ensure_online()?;
		let removed: Vec<OrderId> = {
			let mut rows = self.rows.write().await;
			ids.iter()
				.copied()
				.filter(|id| rows.orders.remove(id).is_some())
				.collect()
		};

		let mut feed = self.feed.lock().await;
		for id in &removed {
			feed.publish(RawChangeEvent::delete(*id));
		}
		Ok(removed.len() as u64)
	}
}

#[async_trait]
impl ChangeFeed for MemoryOrderStore {
	async fn subscribe(&self) -> Result<FeedSubscription, OrderStoreError> {
		self.ensure_online()?;
		let (tx, rx) = mpsc::unbounded_channel();
		let mut feed = self.feed.lock().await;
		let status = if feed.connected {
			FeedStatus::Connected
		} else {
			FeedStatus::Disconnected
		};
		tx.send(FeedMessage::Status(status))
			.map_err(|e| OrderStoreError::Unavailable(e.to_string()))?;
		feed.subscribers.push(tx);
		Ok(rx)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, TimeZone};
	use orderdesk_types::{OrderFilters, OrderStatus, PageCursor};
	use rust_decimal::Decimal;

	fn new_order(name: &str) -> NewOrder {
		NewOrder {
			user_id: None,
			guest_user_id: Some(format!("guest-{}", name)),
			guest_first_name: Some(name.to_string()),
			stay_id: Some("walkin".into()),
			customer_name: Some(name.to_string()),
			table_number: Some("3".into()),
			status: OrderStatus::New,
			items: vec![],
			total_amount: Decimal::from(10),
		}
	}

	#[tokio::test]
	async fn test_insert_assigns_increasing_ids_and_reports_on_feed() {
		let store = MemoryOrderStore::new();
		let mut feed = store.subscribe().await.unwrap();
		assert_eq!(
			feed.recv().await,
			Some(FeedMessage::Status(FeedStatus::Connected))
		);

		let first = store.insert(new_order("ana")).await.unwrap();
		let second = store.insert(new_order("bo")).await.unwrap();
		assert!(second.id > first.id);

		match feed.recv().await {
			Some(FeedMessage::Event(event)) => {
				assert_eq!(event, RawChangeEvent::insert(&first))
			},
			other => panic!("unexpected message: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_query_pages_by_keyset() {
		let store = MemoryOrderStore::new();
		let base = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
		for id in 1..=5 {
			let at = base + Duration::minutes(id);
			store
				.import(Order {
					id: id + 100,
					user_id: None,
					guest_user_id: Some("guest-x".into()),
					guest_first_name: Some("x".into()),
					stay_id: Some("walkin".into()),
					customer_name: None,
					table_number: None,
					status: OrderStatus::New,
					items: vec![],
					total_amount: Decimal::ZERO,
					created_at: at,
					updated_at: at,
				})
				.await;
		}
		assert_eq!(store.len().await, 5);

		let query = OrderQuery {
			limit: 2,
			cursor: None,
			filters: OrderFilters::default().with_search("x"),
		};
		let page = store.query(&query).await.unwrap();
		assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![105, 104]);

		let next = OrderQuery {
			cursor: Some(PageCursor::after(&page[1])),
			..query
		};
		let page = store.query(&next).await.unwrap();
		assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![103, 102]);
	}

	#[tokio::test]
	async fn test_update_many_counts_only_existing_rows() {
		let store = MemoryOrderStore::new();
		let order = store.insert(new_order("ana")).await.unwrap();
		let patch = OrderPatch::status(OrderStatus::Ready, Utc::now());

		assert_eq!(store.update_many(&[order.id, 999], &patch).await.unwrap(), 1);
		assert_eq!(store.update(999, &patch).await.unwrap(), 0);
		assert_eq!(store.get(order.id).await.unwrap().status, OrderStatus::Ready);
	}

	#[tokio::test]
	async fn test_disconnected_feed_holds_back_changes() {
		let store = MemoryOrderStore::new();
		let mut feed = store.subscribe().await.unwrap();
		feed.recv().await.unwrap();

		store.disconnect_feed().await;
		let order = store.insert(new_order("ana")).await.unwrap();
		assert_eq!(
			feed.recv().await,
			Some(FeedMessage::Status(FeedStatus::Disconnected))
		);
		assert!(feed.try_recv().is_err());

		store.reconnect_feed().await;
		assert_eq!(
			feed.recv().await,
			Some(FeedMessage::Status(FeedStatus::Connected))
		);
		assert_eq!(
			feed.recv().await,
			Some(FeedMessage::Event(RawChangeEvent::insert(&order)))
		);
	}

	#[tokio::test]
	async fn test_offline_store_fails_calls() {
		let store = MemoryOrderStore::new();
		store.set_offline(true);
		assert!(matches!(
			store.insert(new_order("ana")).await,
			Err(OrderStoreError::Unavailable(_))
		));
		store.set_offline(false);
		assert!(store.insert(new_order("ana")).await.is_ok());
	}
}
