//! The active cart and its device-local persistence.
//!
//! The in-memory [`Cart`] is authoritative. [`LocalCartStore`] mirrors it to
//! device storage, and [`CartPersistenceGuard`] additionally mirrors it to a
//! remote backup so it survives a wiped device.

use orderdesk_storage::{StorageError, StorageService};
use orderdesk_types::{items_total, OrderItem, StorageKey};
use rust_decimal::Decimal;
use std::sync::Arc;

pub mod guard;

pub use guard::{CartPersistenceGuard, RestoreOutcome};

/// Items selected for the next order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
	items: Vec<OrderItem>,
}

impl Cart {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_items(items: Vec<OrderItem>) -> Self {
		Self { items }
	}

	pub fn items(&self) -> &[OrderItem] {
		&self.items
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Total number of units across all lines.
	pub fn unit_count(&self) -> u32 {
		self.items.iter().map(|i| i.quantity).sum()
	}

	pub fn total(&self) -> Decimal {
		items_total(&self.items)
	}

	/// Adds an item, merging it into an identical line when one exists.
	pub fn add_item(&mut self, item: OrderItem) {
		match self.items.iter_mut().find(|line| {
			line.name == item.name
				&& line.unit_price == item.unit_price
				&& line.selected_options == item.selected_options
		}) {
			Some(line) => line.quantity += item.quantity,
			None => self.items.push(item),
		}
	}

	/// Sets the quantity of the line at `index`; zero removes the line.
	pub fn set_quantity(&mut self, index: usize, quantity: u32) -> bool {
		if index >= self.items.len() {
			return false;
		}
		if quantity == 0 {
			self.items.remove(index);
		} else {
			self.items[index].quantity = quantity;
		}
		true
	}

	pub fn remove_line(&mut self, index: usize) -> Option<OrderItem> {
		(index < self.items.len()).then(|| self.items.remove(index))
	}

	/// Replaces the cart contents wholesale.
	pub fn replace(&mut self, items: Vec<OrderItem>) {
		self.items = items;
	}

	pub fn clear(&mut self) {
		self.items.clear();
	}
}

/// Id of the single cart record in the local namespace.
const LOCAL_CART_ID: &str = "current";

/// Device-local cart storage.
///
/// A missing record means the device storage was never written or was wiped.
#[derive(Clone)]
pub struct LocalCartStore {
	storage: Arc<StorageService>,
}

impl LocalCartStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	pub async fn load(&self) -> Result<Option<Vec<OrderItem>>, StorageError> {
		self.storage
			.retrieve_optional(StorageKey::LocalCart.as_str(), LOCAL_CART_ID)
			.await
	}

	pub async fn save(&self, items: &[OrderItem]) -> Result<(), StorageError> {
		self.storage
			.store(StorageKey::LocalCart.as_str(), LOCAL_CART_ID, &items)
			.await
	}

	pub async fn clear(&self) -> Result<(), StorageError> {
		self.storage
			.remove(StorageKey::LocalCart.as_str(), LOCAL_CART_ID)
			.await
	}
}
