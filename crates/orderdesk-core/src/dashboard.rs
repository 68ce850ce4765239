//! Operations dashboard session.
//!
//! Ties the paginated listing, the live feed and staff writes to one shared
//! [`OrderView`]. Changing filters bumps a generation counter; any page that
//! arrives for an older generation is dropped instead of being shown under
//! the new filters.

use crate::engine::event_bus::EventBus;
use crate::feed::{ChangeFeedReconciler, ReconcilerError, Subscription, ViewChange};
use crate::notify::Notifier;
use crate::query::{FetchError, OrderQueryEngine};
use crate::state::StatusTransitionMachine;
use crate::view::OrderView;
use orderdesk_storage::{ChangeFeed, OrderStore};
use orderdesk_types::{FeedStatus, OrderFilters, OrderRow, PageCursor};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors that can occur while opening a dashboard.
#[derive(Debug, Error)]
pub enum DashboardError {
	#[error(transparent)]
	Feed(#[from] ReconcilerError),
	#[error(transparent)]
	Fetch(#[from] FetchError),
}

/// Result of a page load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
	/// The page was applied to the view with this many new rows.
	Loaded(usize),
	/// Filters changed while the page was in flight; it was discarded.
	Stale,
	/// Another `load_more` is still running.
	AlreadyLoading,
	/// The last page has already been loaded.
	Exhausted,
}

#[derive(Debug, Default)]
struct Paging {
	filters: OrderFilters,
	cursor: Option<PageCursor>,
	has_more: bool,
}

/// Clears the in-flight flag when a `load_more` ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::SeqCst);
	}
}

/// One open dashboard.
pub struct DashboardSession {
	engine: OrderQueryEngine,
	view: OrderView,
	reconciler: ChangeFeedReconciler,
	transitions: StatusTransitionMachine,
	notifier: Arc<dyn Notifier>,
	paging: Mutex<Paging>,
	generation: AtomicU64,
	loading_more: AtomicBool,
	subscription: Mutex<Option<Subscription>>,
}

impl DashboardSession {
	pub fn new(
		store: Arc<dyn OrderStore>,
		feed: Arc<dyn ChangeFeed>,
		page_size: usize,
		feed_throttle: Duration,
		event_bus: EventBus,
		notifier: Arc<dyn Notifier>,
	) -> Self {
		let view = OrderView::new();
		Self {
			engine: OrderQueryEngine::new(store.clone(), page_size),
			reconciler: ChangeFeedReconciler::new(
				feed,
				view.clone(),
				feed_throttle,
				event_bus.clone(),
			),
			transitions: StatusTransitionMachine::new(
				store,
				view.clone(),
				event_bus,
				notifier.clone(),
			),
			view,
			notifier,
			paging: Mutex::new(Paging::default()),
			generation: AtomicU64::new(0),
			loading_more: AtomicBool::new(false),
			subscription: Mutex::new(None),
		}
	}

	/// Loads the first page and starts following the change feed.
	pub async fn open<F>(
		&self,
		filters: OrderFilters,
		on_change: F,
	) -> Result<LoadOutcome, DashboardError>
	where
		F: FnMut(&ViewChange) + Send + 'static,
	{
		let subscription = self.reconciler.subscribe(on_change).await?;
		if let Some(previous) = self.subscription.lock().await.replace(subscription) {
			previous.unsubscribe().await;
		}
		Ok(self.set_filters(filters).await?)
	}

	/// Stops following the change feed.
	pub async fn close(&self) {
		if let Some(subscription) = self.subscription.lock().await.take() {
			subscription.unsubscribe().await;
		}
	}

	/// Applies new filters and reloads from the first page.
	///
	/// The old cursor is discarded. The current list stays on screen until
	/// the new first page arrives, and stays unchanged if the fetch fails.
	pub async fn set_filters(&self, filters: OrderFilters) -> Result<LoadOutcome, FetchError> {
		let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
		{
			let mut paging = self.paging.lock().await;
			paging.filters = filters.clone();
			paging.cursor = None;
			paging.has_more = false;
		}
		self.view.activate(&filters).await;
		let fetch = self.view.begin_fetch().await;

		let page = match self.engine.fetch(&filters, None).await {
			Ok(page) => page,
			Err(e) => return Err(self.report(e)),
		};
		if self.generation.load(Ordering::SeqCst) != generation {
			tracing::debug!(generation, "Discarding first page for outdated filters");
			return Ok(LoadOutcome::Stale);
		}

		let rows = page.orders.len();
		{
			let mut paging = self.paging.lock().await;
			paging.cursor = page.next_cursor;
			paging.has_more = page.has_more;
		}
		self.view
			.replace_page(fetch, page.orders, page.has_more)
			.await;
		Ok(LoadOutcome::Loaded(rows))
	}

	/// Loads the page after the last one shown.
	///
	/// A call made while another is in flight returns immediately.
	pub async fn load_more(&self) -> Result<LoadOutcome, FetchError> {
		if self
			.loading_more
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return Ok(LoadOutcome::AlreadyLoading);
		}
		let _in_flight = InFlight(&self.loading_more);

		let generation = self.generation.load(Ordering::SeqCst);
		let (filters, cursor) = {
			let paging = self.paging.lock().await;
			if !paging.has_more {
				return Ok(LoadOutcome::Exhausted);
			}
			(paging.filters.clone(), paging.cursor)
		};
		let fetch = self.view.begin_fetch().await;

		let page = match self.engine.fetch(&filters, cursor).await {
			Ok(page) => page,
			Err(e) => return Err(self.report(e)),
		};
		if self.generation.load(Ordering::SeqCst) != generation {
			tracing::debug!(generation, "Discarding page for outdated filters");
			return Ok(LoadOutcome::Stale);
		}

		{
			let mut paging = self.paging.lock().await;
			paging.cursor = page.next_cursor;
			paging.has_more = page.has_more;
		}
		let appended = self.view.append_page(fetch, page.orders).await;
		Ok(LoadOutcome::Loaded(appended))
	}

	pub async fn has_more(&self) -> bool {
		self.paging.lock().await.has_more
	}

	pub async fn filters(&self) -> OrderFilters {
		self.paging.lock().await.filters.clone()
	}

	pub async fn rows(&self) -> Vec<OrderRow> {
		self.view.rows().await
	}

	pub fn view(&self) -> &OrderView {
		&self.view
	}

	/// Status writes bound to this session's view.
	pub fn transitions(&self) -> &StatusTransitionMachine {
		&self.transitions
	}

	/// Connection status of the live feed, if subscribed.
	pub async fn feed_status(&self) -> Option<FeedStatus> {
		self.subscription
			.lock()
			.await
			.as_ref()
			.map(Subscription::feed_status)
	}

	fn report(&self, error: FetchError) -> FetchError {
		tracing::warn!(error = %error, "Order page fetch failed");
		self.notifier.error(&error.to_string());
		error
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::notify::TracingNotifier;
	use crate::view::tests::order;
	use async_trait::async_trait;
	use orderdesk_storage::implementations::memory_orders::MemoryOrderStore;
	use orderdesk_storage::OrderStoreError;
	use orderdesk_types::{
		NewOrder, Order, OrderId, OrderPatch, OrderQuery, OrderStatus, RawChangeEvent,
	};

	/// Order store that answers queries after a fixed delay, with the rows
	/// it held when the query arrived.
	struct SlowStore {
		inner: Arc<MemoryOrderStore>,
		delay: Duration,
	}

	#[async_trait]
	impl OrderStore for SlowStore {
		async fn query(&self, query: &OrderQuery) -> Result<Vec<Order>, OrderStoreError> {
			let rows = self.inner.query(query).await;
			tokio::time::sleep(self.delay).await;
			rows
		}
		async fn update(&self, id: OrderId, patch: &OrderPatch) -> Result<u64, OrderStoreError> {
			self.inner.update(id, patch).await
		}
		async fn update_many(
			&self,
			ids: &[OrderId],
			patch: &OrderPatch,
		) -> Result<u64, OrderStoreError> {
			self.inner.update_many(ids, patch).await
		}
		async fn insert(&self, order: NewOrder) -> Result<Order, OrderStoreError> {
			self.inner.insert(order).await
		}
		async fn delete(&self, ids: &[OrderId]) -> Result<u64, OrderStoreError> {
			self.inner.delete(ids).await
		}
	}

	async fn seeded(count: OrderId) -> Arc<MemoryOrderStore> {
		let store = Arc::new(MemoryOrderStore::new());
		for id in 1..=count {
			let status = if id % 2 == 0 {
				OrderStatus::Ready
			} else {
				OrderStatus::New
			};
			store.import(order(id, status)).await;
		}
		store
	}

	fn session(store: Arc<MemoryOrderStore>, delay: Duration, page_size: usize) -> Arc<DashboardSession> {
		let slow = Arc::new(SlowStore {
			inner: store.clone(),
			delay,
		});
		Arc::new(DashboardSession::new(
			slow,
			store,
			page_size,
			Duration::from_millis(300),
			EventBus::default(),
			Arc::new(TracingNotifier),
		))
	}

	fn ids(rows: &[OrderRow]) -> Vec<OrderId> {
		rows.iter().map(OrderRow::id).collect()
	}

	#[tokio::test(start_paused = true)]
	async fn test_open_and_page_through() {
		let dashboard = session(seeded(25).await, Duration::ZERO, 10);
		let outcome = dashboard.open(OrderFilters::default(), |_| {}).await.unwrap();
		assert_eq!(outcome, LoadOutcome::Loaded(10));

		assert_eq!(dashboard.load_more().await.unwrap(), LoadOutcome::Loaded(10));
		assert_eq!(dashboard.load_more().await.unwrap(), LoadOutcome::Loaded(5));
		assert_eq!(dashboard.load_more().await.unwrap(), LoadOutcome::Exhausted);
		assert_eq!(ids(&dashboard.rows().await), (1..=25).rev().collect::<Vec<_>>());
		dashboard.close().await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_concurrent_load_more_is_a_no_op() {
		let dashboard = session(seeded(30).await, Duration::from_millis(50), 10);
		dashboard.set_filters(OrderFilters::default()).await.unwrap();

		let (first, second) = tokio::join!(dashboard.load_more(), dashboard.load_more());
		assert_eq!(first.unwrap(), LoadOutcome::Loaded(10));
		assert_eq!(second.unwrap(), LoadOutcome::AlreadyLoading);
		assert_eq!(dashboard.rows().await.len(), 20);
	}

	#[tokio::test(start_paused = true)]
	async fn test_response_for_old_filters_is_discarded() {
		let dashboard = session(seeded(10).await, Duration::from_millis(50), 100);

		let stale = {
			let dashboard = dashboard.clone();
			tokio::spawn(async move { dashboard.set_filters(OrderFilters::default()).await })
		};
		tokio::time::sleep(Duration::from_millis(10)).await;
		let ready = OrderFilters::default().with_status(OrderStatus::Ready);
		let fresh = dashboard.set_filters(ready.clone()).await.unwrap();

		assert_eq!(stale.await.unwrap().unwrap(), LoadOutcome::Stale);
		assert_eq!(fresh, LoadOutcome::Loaded(5));
		let rows = dashboard.rows().await;
		assert_eq!(rows.len(), 5);
		assert!(rows.iter().all(|r| r.order.status == OrderStatus::Ready));
		assert_eq!(dashboard.filters().await, ready);
	}

	#[tokio::test(start_paused = true)]
	async fn test_failed_fetch_leaves_list_unchanged() {
		let store = seeded(5).await;
		let dashboard = session(store.clone(), Duration::ZERO, 2);
		dashboard.set_filters(OrderFilters::default()).await.unwrap();
		let before = dashboard.rows().await;

		store.set_offline(true);
		assert!(dashboard.load_more().await.is_err());
		assert!(dashboard
			.set_filters(OrderFilters::default().with_search("Ana"))
			.await
			.is_err());
		assert_eq!(dashboard.rows().await, before);

		store.set_offline(false);
		assert_eq!(
			dashboard
				.set_filters(OrderFilters::default().with_search("Ana"))
				.await
				.unwrap(),
			LoadOutcome::Loaded(2)
		);
		assert!(dashboard.has_more().await);
	}

	#[tokio::test(start_paused = true)]
	async fn test_own_writes_and_feed_echo_do_not_duplicate() {
		let store = seeded(3).await;
		let dashboard = session(store.clone(), Duration::ZERO, 10);
		dashboard.open(OrderFilters::default(), |_| {}).await.unwrap();
		tokio::time::sleep(Duration::from_millis(1)).await;
		assert_eq!(dashboard.feed_status().await, Some(FeedStatus::Connected));

		dashboard.transitions().advance(1).await.unwrap();
		store.replay(RawChangeEvent::insert(&order(4, OrderStatus::New))).await;
		tokio::time::sleep(Duration::from_secs(1)).await;

		let rows = dashboard.rows().await;
		assert_eq!(ids(&rows), vec![4, 3, 2, 1]);
		assert_eq!(rows[3].order.status, OrderStatus::Preparing);
		dashboard.close().await;
		assert_eq!(dashboard.feed_status().await, None);
	}

	#[tokio::test(start_paused = true)]
	async fn test_feed_changes_during_slow_first_page_are_kept() {
		let store = seeded(4).await;
		let dashboard = session(store.clone(), Duration::from_secs(1), 10);

		let opening = {
			let dashboard = dashboard.clone();
			tokio::spawn(async move { dashboard.open(OrderFilters::default(), |_| {}).await })
		};
		tokio::time::sleep(Duration::from_millis(10)).await;
		store
			.update(1, &OrderPatch::status(OrderStatus::Preparing, chrono::Utc::now()))
			.await
			.unwrap();
		store.delete(&[4]).await.unwrap();
		tokio::time::sleep(Duration::from_millis(400)).await;
		assert_eq!(
			dashboard.view().get(1).await.map(|o| o.status),
			Some(OrderStatus::Preparing)
		);

		assert_eq!(opening.await.unwrap().unwrap(), LoadOutcome::Loaded(4));
		let rows = dashboard.rows().await;
		assert_eq!(ids(&rows), vec![3, 2, 1]);
		assert_eq!(rows[2].order.status, OrderStatus::Preparing);
		assert_eq!(
			store.get(1).await.map(|o| o.status),
			Some(OrderStatus::Preparing)
		);
		dashboard.close().await;
	}
}
