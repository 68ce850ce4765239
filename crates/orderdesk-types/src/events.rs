//! Event types for the change feed and the desk event bus.
//!
//! The change feed delivers loosely shaped row notifications. They are
//! narrowed into [`ChangeEvent`] at the reconciler boundary; anything that
//! does not describe an order row is rejected there with a [`FeedPayloadError`].

use crate::order::{Order, OrderId, OrderStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Collection name the order change feed reports on.
pub const ORDERS_SCHEMA: &str = "orders";

/// Row-level operation reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
	Insert,
	Update,
	Delete,
}

/// Change notification exactly as the transport delivers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChangeEvent {
	pub operation: ChangeOperation,
	pub schema: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub new: Option<serde_json::Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub old: Option<serde_json::Value>,
}

impl RawChangeEvent {
	pub fn insert(order: &Order) -> Self {
		Self {
			operation: ChangeOperation::Insert,
			schema: ORDERS_SCHEMA.to_string(),
			new: serde_json::to_value(order).ok(),
			old: None,
		}
	}

	pub fn update(order: &Order) -> Self {
		Self {
			operation: ChangeOperation::Update,
			schema: ORDERS_SCHEMA.to_string(),
			new: serde_json::to_value(order).ok(),
			old: None,
		}
	}

	pub fn delete(order_id: OrderId) -> Self {
		Self {
			operation: ChangeOperation::Delete,
			schema: ORDERS_SCHEMA.to_string(),
			new: None,
			old: Some(serde_json::json!({ "id": order_id })),
		}
	}
}

/// Errors raised while narrowing a raw feed payload.
#[derive(Debug, Error)]
pub enum FeedPayloadError {
	#[error("Unexpected schema: {0}")]
	UnexpectedSchema(String),
	#[error("Missing {0} payload")]
	MissingPayload(&'static str),
	#[error("Malformed order payload: {0}")]
	Malformed(String),
}

/// Validated change to a single order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
	Insert(Order),
	Update(Order),
	Delete(OrderId),
}

impl ChangeEvent {
	pub fn order_id(&self) -> OrderId {
		match self {
			ChangeEvent::Insert(order) | ChangeEvent::Update(order) => order.id,
			ChangeEvent::Delete(id) => *id,
		}
	}
}

#[derive(Deserialize)]
struct DeletedRow {
	id: OrderId,
}

impl TryFrom<RawChangeEvent> for ChangeEvent {
	type Error = FeedPayloadError;

	fn try_from(raw: RawChangeEvent) -> Result<Self, Self::Error> {
		if raw.schema != ORDERS_SCHEMA {
			return Err(FeedPayloadError::UnexpectedSchema(raw.schema));
		}
		match raw.operation {
			ChangeOperation::Insert | ChangeOperation::Update => {
				let value = raw.new.ok_or(FeedPayloadError::MissingPayload("new"))?;
				let order: Order = serde_json::from_value(value)
					.map_err(|e| FeedPayloadError::Malformed(e.to_string()))?;
				Ok(if raw.operation == ChangeOperation::Insert {
					ChangeEvent::Insert(order)
				} else {
					ChangeEvent::Update(order)
				})
			},
			ChangeOperation::Delete => {
				let value = raw.old.ok_or(FeedPayloadError::MissingPayload("old"))?;
				let row: DeletedRow = serde_json::from_value(value)
					.map_err(|e| FeedPayloadError::Malformed(e.to_string()))?;
				Ok(ChangeEvent::Delete(row.id))
			},
		}
	}
}

/// Connection state of the underlying feed transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
	Connecting,
	Connected,
	Disconnected,
}

/// Message delivered by a change-feed subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
	Event(RawChangeEvent),
	Status(FeedStatus),
}

/// Events published on the desk event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeskEvent {
	/// An order was placed from a cart.
	OrderPlaced { order_id: OrderId },
	/// A single order changed status.
	StatusChanged {
		order_id: OrderId,
		from: OrderStatus,
		to: OrderStatus,
	},
	/// A bulk status change was applied.
	BulkStatusChanged {
		order_ids: Vec<OrderId>,
		to: OrderStatus,
		affected: u64,
	},
	/// Orders were deleted by staff.
	OrdersDeleted { order_ids: Vec<OrderId> },
	/// A buffered feed batch was merged into the view.
	BatchApplied { order_ids: Vec<OrderId> },
	/// The change feed connection state changed.
	FeedStatusChanged { status: FeedStatus },
	/// A cart backup write failed and was swallowed.
	BackupFailed { owner_key: String, reason: String },
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use rust_decimal::Decimal;

	fn order() -> Order {
		let now = Utc::now();
		Order {
			id: 3,
			user_id: Some("acct".into()),
			guest_user_id: None,
			guest_first_name: None,
			stay_id: None,
			customer_name: Some("Dana".into()),
			table_number: Some("Take Away".into()),
			status: OrderStatus::Preparing,
			items: vec![],
			total_amount: Decimal::from(12),
			created_at: now,
			updated_at: now,
		}
	}

	#[test]
	fn test_narrowing_accepts_order_rows() {
		let o = order();
		let event = ChangeEvent::try_from(RawChangeEvent::update(&o)).unwrap();
		assert_eq!(event.order_id(), 3);
		assert_eq!(event, ChangeEvent::Update(o));

		let deleted = ChangeEvent::try_from(RawChangeEvent::delete(3)).unwrap();
		assert_eq!(deleted, ChangeEvent::Delete(3));
	}

	#[test]
	fn test_narrowing_rejects_foreign_and_malformed_payloads() {
		let mut raw = RawChangeEvent::insert(&order());
		raw.schema = "products".into();
		assert!(matches!(
			ChangeEvent::try_from(raw),
			Err(FeedPayloadError::UnexpectedSchema(_))
		));

		let raw = RawChangeEvent {
			operation: ChangeOperation::Insert,
			schema: ORDERS_SCHEMA.into(),
			new: Some(serde_json::json!({ "id": "not-a-number" })),
			old: None,
		};
		assert!(matches!(
			ChangeEvent::try_from(raw),
			Err(FeedPayloadError::Malformed(_))
		));

		let raw = RawChangeEvent {
			operation: ChangeOperation::Delete,
			schema: ORDERS_SCHEMA.into(),
			new: None,
			old: None,
		};
		assert!(matches!(
			ChangeEvent::try_from(raw),
			Err(FeedPayloadError::MissingPayload("old"))
		));
	}
}
