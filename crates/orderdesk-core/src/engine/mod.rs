//! The assembled order desk.
//!
//! Owns the shared services (storage, order store, feed, event bus) and
//! hands out dashboard sessions and the checkout. Built by
//! [`crate::builder::DeskBuilder`].

use crate::cart::CartPersistenceGuard;
use crate::checkout::Checkout;
use crate::dashboard::DashboardSession;
use crate::notify::Notifier;
use event_bus::EventBus;
use orderdesk_config::Config;
use orderdesk_storage::{ChangeFeed, OrderStore, StorageService};
use std::sync::Arc;
use thiserror::Error;

pub mod event_bus;
pub mod lifecycle;

/// Errors raised while running the desk.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Service error: {0}")]
	Service(String),
}

/// Order synchronization and checkout core for one desk.
pub struct OrderDesk {
	config: Config,
	storage: Arc<StorageService>,
	store: Arc<dyn OrderStore>,
	feed: Arc<dyn ChangeFeed>,
	cart: Arc<CartPersistenceGuard>,
	checkout: Checkout,
	event_bus: EventBus,
	notifier: Arc<dyn Notifier>,
}

impl OrderDesk {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		config: Config,
		storage: Arc<StorageService>,
		store: Arc<dyn OrderStore>,
		feed: Arc<dyn ChangeFeed>,
		cart: Arc<CartPersistenceGuard>,
		checkout: Checkout,
		event_bus: EventBus,
		notifier: Arc<dyn Notifier>,
	) -> Self {
		Self {
			config,
			storage,
			store,
			feed,
			cart,
			checkout,
			event_bus,
			notifier,
		}
	}

	/// Creates a dashboard session over the shared order store and feed.
	pub fn open_dashboard(&self) -> DashboardSession {
		DashboardSession::new(
			self.store.clone(),
			self.feed.clone(),
			self.config.dashboard.page_size,
			self.config.dashboard.feed_throttle(),
			self.event_bus.clone(),
			self.notifier.clone(),
		)
	}

	pub fn cart(&self) -> &Arc<CartPersistenceGuard> {
		&self.cart
	}

	pub fn checkout(&self) -> &Checkout {
		&self.checkout
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn config(&self) -> &Config {
		&self.config
	}
}
