//! Paginated order queries.
//!
//! Pages are keyset-paginated on `(created_at, id)` descending, so a cursor
//! stays valid while new orders are inserted at the top.

use orderdesk_storage::{OrderStore, OrderStoreError};
use orderdesk_types::{OrderFilters, OrderPage, OrderQuery, OrderRow, PageCursor};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when a page cannot be loaded.
#[derive(Debug, Error)]
pub enum FetchError {
	#[error("Failed to fetch orders: {0}")]
	Store(#[from] OrderStoreError),
}

/// Loads display-ready pages of orders from the order store.
pub struct OrderQueryEngine {
	store: Arc<dyn OrderStore>,
	page_size: usize,
}

impl OrderQueryEngine {
	pub fn new(store: Arc<dyn OrderStore>, page_size: usize) -> Self {
		Self { store, page_size }
	}

	pub fn page_size(&self) -> usize {
		self.page_size
	}

	/// Fetches one page.
	///
	/// Without a cursor this is the first page; with one, only orders strictly
	/// older than the cursor are returned. A cursor is only meaningful for
	/// the filters it was produced under: callers restart from the first page
	/// whenever filters change.
	///
	/// `has_more` is true when the page came back full. No count query is made,
	/// so a final empty page is possible when the total is a multiple of the
	/// page size.
	pub async fn fetch(
		&self,
		filters: &OrderFilters,
		cursor: Option<PageCursor>,
	) -> Result<OrderPage, FetchError> {
		let query = OrderQuery {
			limit: self.page_size,
			cursor,
			filters: filters.clone(),
		};
		let orders = self.store.query(&query).await?;

		let has_more = orders.len() == self.page_size;
		let next_cursor = orders.last().map(PageCursor::after).or(cursor);
		let orders: Vec<OrderRow> = orders.into_iter().map(OrderRow::from).collect();

		tracing::debug!(
			rows = orders.len(),
			has_more,
			cursor = ?cursor.map(|c| c.last_id),
			"Fetched order page"
		);

		Ok(OrderPage {
			orders,
			next_cursor,
			has_more,
		})
	}
}
