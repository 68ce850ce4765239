//! Query types for paginated order listings.

use crate::order::{Order, OrderId, OrderStatus};
use crate::utils::format_location;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Optional, independently combinable filters (AND semantics).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderFilters {
	/// Free text matched against customer names and identifiers.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub search: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<OrderStatus>,
	/// Inclusive lower bound on `created_at`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub date_start: Option<DateTime<Utc>>,
	/// Inclusive upper bound on `created_at`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub date_end: Option<DateTime<Utc>>,
}

impl OrderFilters {
	pub fn with_search(mut self, search: impl Into<String>) -> Self {
		self.search = Some(search.into());
		self
	}

	pub fn with_status(mut self, status: OrderStatus) -> Self {
		self.status = Some(status);
		self
	}

	pub fn with_date_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
		self.date_start = Some(start);
		self.date_end = Some(end);
		self
	}

	/// Returns true if the order satisfies every filter that is set.
	pub fn matches(&self, order: &Order) -> bool {
		if let Some(status) = self.status {
			if order.status != status {
				return false;
			}
		}
		if let Some(start) = self.date_start {
			if order.created_at < start {
				return false;
			}
		}
		if let Some(end) = self.date_end {
			if order.created_at > end {
				return false;
			}
		}
		match self.search.as_deref().map(str::trim) {
			Some(needle) if !needle.is_empty() => {
				let needle = needle.to_lowercase();
				let id = order.id.to_string();
				let found = [
					order.customer_name.as_deref(),
					order.guest_first_name.as_deref(),
					order.user_id.as_deref(),
					order.guest_user_id.as_deref(),
					order.stay_id.as_deref(),
					Some(id.as_str()),
				]
				.into_iter()
				.flatten()
				.any(|field| field.to_lowercase().contains(&needle));
				found
			},
			_ => true,
		}
	}

	/// Stable key identifying this filter set in the shared query cache.
	///
	/// The search text is quoted and escaped so it cannot spell out other
	/// fields.
	pub fn cache_key(&self) -> String {
		format!(
			"orders?search={:?}&status={}&from={}&to={}",
			self.search.as_deref().unwrap_or(""),
			self.status.map(|s| s.as_str()).unwrap_or(""),
			self.date_start.map(|d| d.to_rfc3339()).unwrap_or_default(),
			self.date_end.map(|d| d.to_rfc3339()).unwrap_or_default(),
		)
	}
}

/// Keyset position of the last row of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
	pub last_created_at: DateTime<Utc>,
	pub last_id: OrderId,
}

impl PageCursor {
	pub fn after(order: &Order) -> Self {
		Self {
			last_created_at: order.created_at,
			last_id: order.id,
		}
	}

	/// Returns true if `order` sorts strictly after this cursor, i.e. is older.
	pub fn precedes(&self, order: &Order) -> bool {
		newest_first(
			&(self.last_created_at, self.last_id),
			&(order.created_at, order.id),
		) == Ordering::Less
	}
}

/// Listing order: `created_at` descending, ties broken by `id` descending.
pub fn newest_first(a: &(DateTime<Utc>, OrderId), b: &(DateTime<Utc>, OrderId)) -> Ordering {
	b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1))
}

/// A raw query against the order store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
	pub limit: usize,
	pub cursor: Option<PageCursor>,
	pub filters: OrderFilters,
}

/// An order with its presentation helpers computed once per fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRow {
	pub order: Order,
	pub location_label: String,
	pub display_name: String,
	pub display_total: Decimal,
}

impl From<Order> for OrderRow {
	fn from(order: Order) -> Self {
		let location_label =
			format_location(order.stay_id.as_deref(), order.table_number.as_deref());
		let display_name = order.display_name();
		let display_total = order.display_total();
		Self {
			order,
			location_label,
			display_name,
			display_total,
		}
	}
}

impl OrderRow {
	pub fn id(&self) -> OrderId {
		self.order.id
	}
}

/// One page of display-ready orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPage {
	pub orders: Vec<OrderRow>,
	pub next_cursor: Option<PageCursor>,
	pub has_more: bool,
}
