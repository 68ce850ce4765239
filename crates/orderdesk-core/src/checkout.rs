//! Order placement from the active cart.

use crate::cart::CartPersistenceGuard;
use crate::engine::event_bus::EventBus;
use crate::identity::{IdentityError, IdentityResolver};
use crate::notify::Notifier;
use orderdesk_storage::{OrderStore, OrderStoreError};
use orderdesk_types::{
	items_total, AdminOverride, DeskEvent, NewOrder, Order, OrderStatus, SessionContext,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
	#[error("Cart is empty")]
	EmptyCart,
	#[error(transparent)]
	Identity(#[from] IdentityError),
	#[error("Failed to place order: {0}")]
	Store(#[from] OrderStoreError),
}

/// Places orders and settles the cart afterwards.
pub struct Checkout {
	store: Arc<dyn OrderStore>,
	guard: Arc<CartPersistenceGuard>,
	event_bus: EventBus,
	notifier: Arc<dyn Notifier>,
}

impl Checkout {
	pub fn new(
		store: Arc<dyn OrderStore>,
		guard: Arc<CartPersistenceGuard>,
		event_bus: EventBus,
		notifier: Arc<dyn Notifier>,
	) -> Self {
		Self {
			store,
			guard,
			event_bus,
			notifier,
		}
	}

	/// Places an order for the current cart.
	///
	/// The cart and the purchaser identity are checked before any I/O. On
	/// success the pending table scan is consumed, the cart is emptied and
	/// its backup deleted.
	#[instrument(skip_all, fields(staff_assisted = admin_override.is_some()))]
	pub async fn place_order(
		&self,
		session: &mut SessionContext,
		admin_override: Option<&AdminOverride>,
		explicit_table: Option<&str>,
	) -> Result<Order, CheckoutError> {
		let result = self
			.try_place(session, admin_override, explicit_table)
			.await;
		match &result {
			Ok(order) => self
				.notifier
				.success(&format!("Order #{} placed", order.id)),
			Err(e) => self.notifier.error(&e.to_string()),
		}
		result
	}

	async fn try_place(
		&self,
		session: &mut SessionContext,
		admin_override: Option<&AdminOverride>,
		explicit_table: Option<&str>,
	) -> Result<Order, CheckoutError> {
		let cart = self.guard.snapshot().await;
		if cart.is_empty() {
			return Err(CheckoutError::EmptyCart);
		}
		let identity = IdentityResolver::resolve(session, admin_override, explicit_table)?;

		let items = cart.items().to_vec();
		let new_order = NewOrder {
			user_id: identity.user_id,
			guest_user_id: identity.guest_user_id,
			guest_first_name: identity.guest_first_name,
			stay_id: identity.stay_id,
			customer_name: identity.customer_name,
			table_number: identity.table_number,
			status: OrderStatus::New,
			total_amount: items_total(&items),
			items,
		};
		let order = self.store.insert(new_order).await?;
		tracing::info!(
			order_id = order.id,
			total = %order.total_amount,
			table = order.table_number.as_deref().unwrap_or("-"),
			"Order placed"
		);

		session.clear_pending_table();
		self.guard
			.clear_on_checkout(session.device_key().as_deref())
			.await;
		self.event_bus
			.publish(DeskEvent::OrderPlaced { order_id: order.id })
			.ok();
		Ok(order)
	}
}
