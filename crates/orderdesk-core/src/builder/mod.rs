//! Builder for assembling an order desk.
//!
//! The primary storage backend is created through its registered factory.
//! The order store and its change feed front an external service and are
//! supplied by the caller.

use crate::cart::{CartPersistenceGuard, LocalCartStore};
use crate::checkout::Checkout;
use crate::engine::{event_bus::EventBus, OrderDesk};
use crate::notify::{Notifier, TracingNotifier};
use orderdesk_config::Config;
use orderdesk_storage::{
	get_all_implementations, ChangeFeed, OrderStore, RemoteCartBackups, StorageFactory,
	StorageService,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Cannot assemble desk: {0}")]
	Config(String),
}

/// Builder for an [`OrderDesk`].
pub struct DeskBuilder {
	config: Config,
	notifier: Arc<dyn Notifier>,
	event_bus: EventBus,
	storage_factories: HashMap<String, StorageFactory>,
}

impl DeskBuilder {
	/// Creates a builder with every registered storage backend available.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			notifier: Arc::new(TracingNotifier),
			event_bus: EventBus::default(),
			storage_factories: get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
		self.notifier = notifier;
		self
	}

	pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
		self.event_bus = event_bus;
		self
	}

	/// Registers an additional storage factory under `name`.
	pub fn with_storage_factory(mut self, name: impl Into<String>, factory: StorageFactory) -> Self {
		self.storage_factories.insert(name.into(), factory);
		self
	}

	/// Builds the desk over `orders`, which serves both queries and the feed.
	pub fn build<S>(self, orders: Arc<S>) -> Result<OrderDesk, BuilderError>
	where
		S: OrderStore + ChangeFeed + 'static,
	{
		let primary = &self.config.storage.primary;
		let backend_config = self.config.storage.primary_config().ok_or_else(|| {
			BuilderError::Config(format!("No settings for storage backend '{}'", primary))
		})?;
		let factory = self.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Storage backend '{}' is not registered", primary))
		})?;
		let backend = factory(backend_config).map_err(|e| {
			tracing::error!(backend = %primary, error = %e, "Storage backend rejected its settings");
			BuilderError::Config(format!("Storage backend '{}': {}", primary, e))
		})?;
		for name in self.config.storage.implementations.keys() {
			if name != primary {
				tracing::debug!(backend = %name, "Ignoring non-primary storage backend");
			}
		}
		tracing::info!(desk = %self.config.desk.id, backend = %primary, "Storage ready");
		let storage = Arc::new(StorageService::new(backend));

		let store: Arc<dyn OrderStore> = orders.clone();
		let feed: Arc<dyn ChangeFeed> = orders;

		let backups = Arc::new(RemoteCartBackups::new(
			storage.clone(),
			self.config.cart.backup_ttl(),
		));
		let cart = Arc::new(CartPersistenceGuard::new(
			LocalCartStore::new(storage.clone()),
			backups,
			self.config.cart.backup_debounce(),
			self.event_bus.clone(),
		));
		let checkout = Checkout::new(
			store.clone(),
			cart.clone(),
			self.event_bus.clone(),
			self.notifier.clone(),
		);

		Ok(OrderDesk::new(
			self.config,
			storage,
			store,
			feed,
			cart,
			checkout,
			self.event_bus,
			self.notifier,
		))
	}
}
