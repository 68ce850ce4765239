//! Locally held order list and its query cache.
//!
//! Both sinks live behind one lock and are only changed through
//! [`OrderView::merge_batch`] and [`OrderView::remove`], so readers never
//! observe the list and the cache disagreeing about a batch. Feed flushes
//! and optimistic writes share the same merge, which makes re-applying an
//! already applied order a no-op.
//!
//! Pages are fetched from a snapshot that may predate changes merged while
//! the request was outstanding. Those changes are kept while any fetch is
//! open and replayed onto the page when it lands.

use orderdesk_types::{newest_first, Order, OrderFilters, OrderId, OrderRow, PageCursor};
use std::cmp::Ordering as SortOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// What a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
	/// Rows replaced in place.
	pub replaced: usize,
	/// Unknown rows added at the top of the list.
	pub prepended: usize,
}

impl MergeOutcome {
	pub fn changed(&self) -> bool {
		self.replaced + self.prepended > 0
	}
}

#[derive(Default)]
struct ViewState {
	filters: OrderFilters,
	active_key: String,
	rows: Vec<OrderRow>,
	cache: HashMap<String, Vec<OrderRow>>,
	/// Changes merged while a page fetch is open. `None` marks a removal.
	pending: HashMap<OrderId, Option<Order>>,
}

impl ViewState {
	fn sync_cache(&mut self) {
		self.cache.insert(self.active_key.clone(), self.rows.clone());
	}

	fn insert_sorted(&mut self, order: Order) {
		let key = (order.created_at, order.id);
		let index = self
			.rows
			.iter()
			.position(|row| {
				newest_first(&key, &(row.order.created_at, row.id())) == SortOrdering::Less
			})
			.unwrap_or(self.rows.len());
		self.rows.insert(index, OrderRow::from(order));
	}

	/// Re-applies pending changes to `rows[from..]`.
	///
	/// A fetched row is only overwritten by a pending value at least as
	/// recent. Unknown orders are placed in sort position when `insert_unknown`
	/// is set, unless they sort past the end of a page that has more after it.
	fn replay_pending(&mut self, from: usize, insert_unknown: bool, has_more: bool) -> usize {
		let pending = std::mem::take(&mut self.pending);
		let oldest = has_more
			.then(|| self.rows.last().map(|row| PageCursor::after(&row.order)))
			.flatten();
		let mut replayed = 0;

		for (id, change) in &pending {
			let index = self.rows[from..]
				.iter()
				.position(|row| row.id() == *id)
				.map(|i| i + from);
			match (change, index) {
				(None, Some(index)) => {
					self.rows.remove(index);
					replayed += 1;
				},
				(Some(order), Some(index)) => {
					let fetched = &self.rows[index].order;
					if fetched.updated_at <= order.updated_at && fetched != order {
						self.rows[index] = OrderRow::from(order.clone());
						replayed += 1;
					}
				},
				(Some(order), None) if insert_unknown => {
					let known = self.rows.iter().any(|row| row.id() == *id);
					let beyond_page = oldest.is_some_and(|cursor| cursor.precedes(order));
					if !known && !beyond_page && self.filters.matches(order) {
						self.insert_sorted(order.clone());
						replayed += 1;
					}
				},
				_ => {},
			}
		}

		self.pending = pending;
		replayed
	}
}

/// An outstanding page fetch. Changes merged into the view are kept for
/// replay until every open fetch has been applied or dropped.
pub struct PageFetch {
	open: Arc<AtomicUsize>,
}

impl Drop for PageFetch {
	fn drop(&mut self) {
		self.open.fetch_sub(1, Ordering::SeqCst);
	}
}

/// Shared handle to the dashboard's order list.
#[derive(Clone, Default)]
pub struct OrderView {
	state: Arc<RwLock<ViewState>>,
	open_fetches: Arc<AtomicUsize>,
}

impl OrderView {
	pub fn new() -> Self {
		Self::default()
	}

	/// Switches the view to a new filter set.
	///
	/// The list is left untouched until the first page for the new filters
	/// arrives, so a failed fetch never blanks the screen.
	pub async fn activate(&self, filters: &OrderFilters) {
		let mut state = self.state.write().await;
		state.filters = filters.clone();
		state.active_key = filters.cache_key();
	}

	/// Starts tracking changes for a page about to be requested.
	pub async fn begin_fetch(&self) -> PageFetch {
		let mut state = self.state.write().await;
		if self.open_fetches.load(Ordering::SeqCst) == 0 {
			state.pending.clear();
		}
		self.open_fetches.fetch_add(1, Ordering::SeqCst);
		PageFetch {
			open: self.open_fetches.clone(),
		}
	}

	fn recording(&self) -> bool {
		self.open_fetches.load(Ordering::SeqCst) > 0
	}

	/// Replaces the list with a first page, then replays changes merged
	/// since `fetch` began.
	pub async fn replace_page(&self, fetch: PageFetch, rows: Vec<OrderRow>, has_more: bool) {
		let mut state = self.state.write().await;
		state.rows = rows;
		let replayed = state.replay_pending(0, true, has_more);
		if replayed > 0 {
			tracing::debug!(replayed, "Replayed changes onto first page");
		}
		state.sync_cache();
		drop(state);
		drop(fetch);
	}

	/// Appends a following page, skipping rows already shown.
	pub async fn append_page(&self, fetch: PageFetch, rows: Vec<OrderRow>) -> usize {
		let mut state = self.state.write().await;
		let known: HashSet<OrderId> = state.rows.iter().map(OrderRow::id).collect();
		let before = state.rows.len();
		state
			.rows
			.extend(rows.into_iter().filter(|row| !known.contains(&row.id())));
		state.replay_pending(before, false, false);
		let appended = state.rows.len() - before;
		state.sync_cache();
		drop(state);
		drop(fetch);
		appended
	}

	/// Merges a batch of orders in a single step.
	///
	/// Known ids are replaced in place in the list and in every cached query
	/// that holds them. Unknown ids matching the active filters are prepended,
	/// newest first. Rows identical to the stored ones are left alone.
	pub async fn merge_batch(&self, orders: Vec<Order>) -> MergeOutcome {
		let mut state = self.state.write().await;
		if self.recording() {
			for order in &orders {
				state.pending.insert(order.id, Some(order.clone()));
			}
		}
		let mut outcome = MergeOutcome::default();
		let mut unknown = Vec::new();

		for order in orders {
			match state.rows.iter().position(|row| row.id() == order.id) {
				Some(index) => {
					if state.rows[index].order != order {
						state.rows[index] = OrderRow::from(order.clone());
						outcome.replaced += 1;
					}
				},
				None if state.filters.matches(&order) => {
					if !unknown.iter().any(|o: &Order| o.id == order.id) {
						unknown.push(order.clone());
					}
				},
				None => {},
			}

			let active_key = state.active_key.clone();
			for (key, rows) in state.cache.iter_mut() {
				if *key == active_key {
					continue;
				}
				if let Some(row) = rows.iter_mut().find(|row| row.id() == order.id) {
					if row.order != order {
						*row = OrderRow::from(order.clone());
					}
				}
			}
		}

		if !unknown.is_empty() {
			unknown.sort_by(|a, b| newest_first(&(a.created_at, a.id), &(b.created_at, b.id)));
			outcome.prepended = unknown.len();
			let mut rows: Vec<OrderRow> = unknown.into_iter().map(OrderRow::from).collect();
			rows.append(&mut state.rows);
			state.rows = rows;
		}

		if outcome.changed() {
			state.sync_cache();
		}
		outcome
	}

	/// Removes orders from the list and from every cached query.
	pub async fn remove(&self, ids: &[OrderId]) -> usize {
		let mut state = self.state.write().await;
		if self.recording() {
			for id in ids {
				state.pending.insert(*id, None);
			}
		}
		let before = state.rows.len();
		state.rows.retain(|row| !ids.contains(&row.id()));
		let removed = before - state.rows.len();
		for rows in state.cache.values_mut() {
			rows.retain(|row| !ids.contains(&row.id()));
		}
		removed
	}

	/// Puts previously removed orders back at their sorted position,
	/// regardless of the active filters.
	pub async fn restore(&self, orders: Vec<Order>) -> usize {
		let mut state = self.state.write().await;
		let recording = self.recording();
		let mut restored = 0;
		for order in orders {
			if recording {
				state.pending.insert(order.id, Some(order.clone()));
			}
			if !state.rows.iter().any(|row| row.id() == order.id) {
				state.insert_sorted(order);
				restored += 1;
			}
		}
		if restored > 0 {
			state.sync_cache();
		}
		restored
	}

	pub async fn rows(&self) -> Vec<OrderRow> {
		self.state.read().await.rows.clone()
	}

	pub async fn len(&self) -> usize {
		self.state.read().await.rows.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}

	pub async fn get(&self, id: OrderId) -> Option<Order> {
		self.state
			.read()
			.await
			.rows
			.iter()
			.find(|row| row.id() == id)
			.map(|row| row.order.clone())
	}

	/// Cached rows for a query key.
	pub async fn cached(&self, key: &str) -> Option<Vec<OrderRow>> {
		self.state.read().await.cache.get(key).cloned()
	}

	pub async fn active_key(&self) -> String {
		self.state.read().await.active_key.clone()
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use chrono::{Duration, TimeZone, Utc};
	use orderdesk_types::{OrderItem, OrderStatus};
	use rust_decimal::Decimal;

	pub(crate) fn order(id: OrderId, status: OrderStatus) -> Order {
		let at = Utc.with_ymd_and_hms(2026, 6, 1, 18, 0, 0).unwrap() + Duration::minutes(id);
		Order {
			id,
			user_id: None,
			guest_user_id: Some(format!("guest-{}", id)),
			guest_first_name: Some("Ana".into()),
			stay_id: Some("walkin".into()),
			customer_name: None,
			table_number: Some("4".into()),
			status,
			items: vec![OrderItem::new("Paella", Decimal::from(45), 2)],
			total_amount: Decimal::from(90),
			created_at: at,
			updated_at: at,
		}
	}

	async fn view_with(ids: &[OrderId]) -> OrderView {
		let view = OrderView::new();
		view.activate(&OrderFilters::default()).await;
		let fetch = view.begin_fetch().await;
		view.replace_page(fetch, rows_for(ids), false).await;
		view
	}

	/// Rows for `ids`, newest first.
	pub(crate) fn rows_for(ids: &[OrderId]) -> Vec<OrderRow> {
		ids.iter()
			.rev()
			.map(|id| OrderRow::from(order(*id, OrderStatus::New)))
			.collect()
	}

	fn ids(rows: &[OrderRow]) -> Vec<OrderId> {
		rows.iter().map(OrderRow::id).collect()
	}

	#[tokio::test]
	async fn test_merge_replaces_known_and_prepends_unknown() {
		let view = view_with(&[1, 2, 3]).await;
		let outcome = view
			.merge_batch(vec![order(2, OrderStatus::Ready), order(5, OrderStatus::New), order(4, OrderStatus::New)])
			.await;

		assert_eq!(outcome, MergeOutcome { replaced: 1, prepended: 2 });
		let rows = view.rows().await;
		assert_eq!(ids(&rows), vec![5, 4, 3, 2, 1]);
		assert_eq!(rows[3].order.status, OrderStatus::Ready);
		assert_eq!(view.cached(&view.active_key().await).await, Some(rows));
	}

	#[tokio::test]
	async fn test_merge_is_idempotent() {
		let view = view_with(&[1, 2]).await;
		let batch = vec![order(2, OrderStatus::Preparing), order(3, OrderStatus::New)];

		view.merge_batch(batch.clone()).await;
		let once = view.rows().await;
		let outcome = view.merge_batch(batch).await;

		assert!(!outcome.changed());
		assert_eq!(view.rows().await, once);
		let total: Decimal = once.iter().map(|r| r.display_total).sum();
		assert_eq!(total, Decimal::from(270));
	}

	#[tokio::test]
	async fn test_unknown_orders_outside_filters_are_not_prepended() {
		let view = OrderView::new();
		view.activate(&OrderFilters::default().with_status(OrderStatus::New))
			.await;
		let outcome = view.merge_batch(vec![order(9, OrderStatus::Paid)]).await;
		assert_eq!(outcome, MergeOutcome::default());
		assert!(view.is_empty().await);
	}

	#[tokio::test]
	async fn test_remove_clears_list_and_cache() {
		let view = view_with(&[1, 2, 3]).await;
		let key = view.active_key().await;
		assert_eq!(view.remove(&[2, 42]).await, 1);
		assert_eq!(ids(&view.rows().await), vec![3, 1]);
		assert_eq!(ids(&view.cached(&key).await.unwrap()), vec![3, 1]);
	}

	#[tokio::test]
	async fn test_append_skips_rows_already_shown() {
		let view = view_with(&[5, 6]).await;
		let fetch = view.begin_fetch().await;
		let appended = view
			.append_page(fetch, vec![
				OrderRow::from(order(5, OrderStatus::New)),
				OrderRow::from(order(4, OrderStatus::New)),
			])
			.await;
		assert_eq!(appended, 1);
		assert_eq!(ids(&view.rows().await), vec![6, 5, 4]);
	}

	#[tokio::test]
	async fn test_inactive_cache_entries_get_replacements() {
		let view = view_with(&[1, 2]).await;
		let old_key = view.active_key().await;
		view.activate(&OrderFilters::default().with_search("Ana"))
			.await;

		view.merge_batch(vec![order(1, OrderStatus::Completed)]).await;
		let cached = view.cached(&old_key).await.unwrap();
		let row = cached.iter().find(|r| r.id() == 1).unwrap();
		assert_eq!(row.order.status, OrderStatus::Completed);
	}

	#[tokio::test]
	async fn test_changes_during_fetch_survive_first_page() {
		let view = view_with(&[1, 2]).await;
		let fetch = view.begin_fetch().await;

		let mut ready = order(2, OrderStatus::Ready);
		ready.updated_at += Duration::minutes(30);
		view.merge_batch(vec![ready, order(4, OrderStatus::New)]).await;
		view.remove(&[1]).await;

		// Snapshot taken before any of the above
		view.replace_page(fetch, rows_for(&[1, 2, 3]), false).await;

		let rows = view.rows().await;
		assert_eq!(ids(&rows), vec![4, 3, 2]);
		assert_eq!(rows[2].order.status, OrderStatus::Ready);
		assert_eq!(view.cached(&view.active_key().await).await, Some(rows));
	}

	#[tokio::test]
	async fn test_newer_fetched_row_wins_over_pending_change() {
		let view = view_with(&[1]).await;
		let fetch = view.begin_fetch().await;
		view.merge_batch(vec![order(1, OrderStatus::Preparing)]).await;

		let mut served = order(1, OrderStatus::Ready);
		served.updated_at += Duration::minutes(5);
		view.replace_page(fetch, vec![OrderRow::from(served)], false)
			.await;
		assert_eq!(view.get(1).await.unwrap().status, OrderStatus::Ready);
	}

	#[tokio::test]
	async fn test_pending_changes_are_dropped_once_no_fetch_is_open() {
		let view = view_with(&[1, 2]).await;
		view.merge_batch(vec![order(9, OrderStatus::New)]).await;

		let fetch = view.begin_fetch().await;
		view.replace_page(fetch, rows_for(&[1, 2]), false).await;
		assert_eq!(ids(&view.rows().await), vec![2, 1]);
	}

	#[tokio::test]
	async fn test_unknown_pending_order_past_a_full_page_waits_for_its_page() {
		let view = view_with(&[]).await;
		let fetch = view.begin_fetch().await;
		view.merge_batch(vec![order(1, OrderStatus::Ready)]).await;

		view.replace_page(fetch, rows_for(&[5, 6]), true).await;
		assert_eq!(ids(&view.rows().await), vec![6, 5]);
	}

	#[tokio::test]
	async fn test_restore_returns_rows_to_their_position() {
		let view = view_with(&[1, 2, 3, 4]).await;
		view.remove(&[2, 3]).await;
		assert_eq!(ids(&view.rows().await), vec![4, 1]);

		let restored = view
			.restore(vec![order(3, OrderStatus::New), order(2, OrderStatus::New)])
			.await;
		assert_eq!(restored, 2);
		assert_eq!(ids(&view.rows().await), vec![4, 3, 2, 1]);
	}
}
