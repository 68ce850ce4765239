//! Cart backup types.

use crate::order::{items_total, OrderItem};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Remote mirror of the active cart, keyed by device identity.
///
/// Only used to recover a cart after local device storage was wiped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartBackup {
	pub owner_key: String,
	pub items: Vec<OrderItem>,
	pub updated_at: DateTime<Utc>,
}

impl CartBackup {
	pub fn new(owner_key: impl Into<String>, items: Vec<OrderItem>) -> Self {
		Self {
			owner_key: owner_key.into(),
			items,
			updated_at: Utc::now(),
		}
	}

	pub fn total(&self) -> Decimal {
		items_total(&self.items)
	}
}
