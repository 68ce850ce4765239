//! Order types for the orderdesk system.
//!
//! This module defines placed orders, their line items, the status lifecycle
//! and the partial-update patches issued against the order store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric order identifier assigned by the store.
pub type OrderId = i64;

/// A placed purchase as held by the remote order store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Store-assigned identifier, monotonically increasing.
	pub id: OrderId,
	/// Authenticated account that owns this order.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	/// Device-bound guest identity that placed this order.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub guest_user_id: Option<String>,
	/// First name the guest entered when the session was created.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub guest_first_name: Option<String>,
	/// Hotel stay code, or `walkin` for walk-in guests.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stay_id: Option<String>,
	/// Name shown to staff for this order.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_name: Option<String>,
	/// Table label, `Take Away`, or absent.
	#[serde(default)]
	pub table_number: Option<String>,
	pub status: OrderStatus,
	#[serde(default)]
	pub items: Vec<OrderItem>,
	pub total_amount: Decimal,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Sum of the line item subtotals.
	pub fn items_total(&self) -> Decimal {
		items_total(&self.items)
	}

	/// Total to display for this order.
	///
	/// Falls back to the item subtotals when the stored total is zero.
	pub fn display_total(&self) -> Decimal {
		if self.total_amount.is_zero() {
			self.items_total()
		} else {
			self.total_amount
		}
	}

	/// Name shown for this order, synthesized from the id when none is stored.
	pub fn display_name(&self) -> String {
		[&self.customer_name, &self.guest_first_name]
			.into_iter()
			.filter_map(|name| name.as_deref())
			.find(|name| !name.trim().is_empty())
			.map(str::to_string)
			.unwrap_or_else(|| format!("Order #{}", self.id))
	}

	/// Returns true when the purchaser identity fields are consistent.
	///
	/// Exactly one of the account or the guest/stay pathway must be set, and
	/// an account id never coexists with a guest id.
	pub fn has_consistent_identity(&self) -> bool {
		let guest_side = self.guest_user_id.is_some() || self.stay_id.is_some();
		self.user_id.is_some() != guest_side
	}
}

/// A single line of an order or cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
	pub name: String,
	pub unit_price: Decimal,
	pub quantity: u32,
	#[serde(default)]
	pub selected_options: Vec<String>,
}

impl OrderItem {
	pub fn new(name: impl Into<String>, unit_price: Decimal, quantity: u32) -> Self {
		Self {
			name: name.into(),
			unit_price,
			quantity,
			selected_options: Vec::new(),
		}
	}

	pub fn subtotal(&self) -> Decimal {
		self.unit_price * Decimal::from(self.quantity)
	}
}

/// Sums the subtotals of a slice of items.
pub fn items_total(items: &[OrderItem]) -> Decimal {
	items.iter().map(OrderItem::subtotal).sum()
}

/// An order as submitted for insertion, before the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
	pub user_id: Option<String>,
	pub guest_user_id: Option<String>,
	pub guest_first_name: Option<String>,
	pub stay_id: Option<String>,
	pub customer_name: Option<String>,
	pub table_number: Option<String>,
	pub status: OrderStatus,
	pub items: Vec<OrderItem>,
	pub total_amount: Decimal,
}

/// Partial update applied to stored orders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<OrderStatus>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
}

impl OrderPatch {
	/// Patch that moves an order to `status` at `now`.
	pub fn status(status: OrderStatus, now: DateTime<Utc>) -> Self {
		Self {
			status: Some(status),
			updated_at: Some(now),
		}
	}

	/// Applies the patch in place. `created_at` is never touched.
	pub fn apply_to(&self, order: &mut Order) {
		if let Some(status) = self.status {
			order.status = status;
		}
		if let Some(updated_at) = self.updated_at {
			order.updated_at = updated_at;
		}
	}
}

/// Status of an order in the kitchen and payment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Order has been placed and not yet picked up by the kitchen.
	New,
	/// Kitchen is preparing the order.
	Preparing,
	/// Order is ready for pickup or delivery.
	Ready,
	/// Order is on its way to the table or room.
	#[serde(alias = "out_for_delivery")]
	Delivery,
	/// Order has been handed over.
	Completed,
	/// Order has been paid. Terminal.
	Paid,
	/// Order has been cancelled. Terminal.
	Cancelled,
}

impl OrderStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::New => "new",
			OrderStatus::Preparing => "preparing",
			OrderStatus::Ready => "ready",
			OrderStatus::Delivery => "delivery",
			OrderStatus::Completed => "completed",
			OrderStatus::Paid => "paid",
			OrderStatus::Cancelled => "cancelled",
		}
	}

	/// Returns true for statuses with no outgoing transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
	}

	/// Returns an iterator over all statuses in lifecycle order.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::New,
			Self::Preparing,
			Self::Ready,
			Self::Delivery,
			Self::Completed,
			Self::Paid,
			Self::Cancelled,
		]
		.into_iter()
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"new" => Ok(Self::New),
			"preparing" => Ok(Self::Preparing),
			"ready" => Ok(Self::Ready),
			"delivery" | "out_for_delivery" => Ok(Self::Delivery),
			"completed" => Ok(Self::Completed),
			"paid" => Ok(Self::Paid),
			"cancelled" => Ok(Self::Cancelled),
			other => Err(UnknownStatus(other.to_string())),
		}
	}
}
