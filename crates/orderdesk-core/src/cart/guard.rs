//! Remote backup of the active cart.
//!
//! Every mutation is mirrored to device storage right away and to the remote
//! backup store after a debounce window. Remote failures never reach the
//! caller: the in-memory cart stays authoritative and usable offline.
//!
//! Remote writes and the checkout delete are serialized behind one lock, and
//! a scheduled write only goes out if no later mutation or checkout has
//! superseded it by the time it holds that lock.

use super::{Cart, LocalCartStore};
use crate::engine::event_bus::EventBus;
use orderdesk_storage::CartBackupStore;
use orderdesk_types::{truncate_id, DeskEvent, OrderItem, SessionContext};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Result of the startup restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
	/// Restore already ran for this guard.
	AlreadyRan,
	/// The device still had a local cart with this many lines.
	LocalCart(usize),
	/// No guest session and no signed-in account.
	NoIdentity,
	/// The remote store holds no backup for this device.
	NoBackup,
	/// The cart was hydrated from the remote backup with this many lines.
	Restored(usize),
	/// The remote store could not be read. The cart is left as is.
	Failed,
}

/// Keeps the remote cart backup in step with the in-memory cart.
pub struct CartPersistenceGuard {
	cart: Arc<Mutex<Cart>>,
	local: LocalCartStore,
	backups: Arc<dyn CartBackupStore>,
	debounce: Duration,
	pending: Mutex<Option<JoinHandle<()>>>,
	/// Bumped by every mutation and checkout; a scheduled write carries the
	/// value it was created under.
	generation: Arc<AtomicU64>,
	remote_writes: Arc<Mutex<()>>,
	restored: AtomicBool,
	event_bus: EventBus,
}

impl CartPersistenceGuard {
	pub fn new(
		local: LocalCartStore,
		backups: Arc<dyn CartBackupStore>,
		debounce: Duration,
		event_bus: EventBus,
	) -> Self {
		Self {
			cart: Arc::new(Mutex::new(Cart::new())),
			local,
			backups,
			debounce,
			pending: Mutex::new(None),
			generation: Arc::new(AtomicU64::new(0)),
			remote_writes: Arc::new(Mutex::new(())),
			restored: AtomicBool::new(false),
			event_bus,
		}
	}

	/// Returns a copy of the current cart.
	pub async fn snapshot(&self) -> Cart {
		self.cart.lock().await.clone()
	}

	/// Applies `change` to the cart and schedules its persistence.
	pub async fn mutate<F, R>(&self, session: &SessionContext, change: F) -> R
	where
		F: FnOnce(&mut Cart) -> R,
	{
		let (result, snapshot) = {
			let mut cart = self.cart.lock().await;
			let result = change(&mut cart);
			(result, cart.clone())
		};
		self.on_mutate(session.device_key().as_deref(), &snapshot)
			.await;
		result
	}

	/// Persists a cart that has just changed.
	///
	/// The local copy is written immediately. The remote backup is
	/// (re)scheduled so that a burst of mutations results in a single write
	/// carrying the last state. Without a device identity only the local
	/// copy is kept.
	pub async fn on_mutate(&self, owner_key: Option<&str>, cart: &Cart) {
		if let Err(e) = self.local.save(cart.items()).await {
			tracing::warn!(error = %e, "Failed to save local cart");
		}

		let Some(owner_key) = owner_key else {
			tracing::debug!("No device identity, skipping remote cart backup");
			return;
		};

		let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
		let current = self.generation.clone();
		let remote_writes = self.remote_writes.clone();
		let backups = self.backups.clone();
		let event_bus = self.event_bus.clone();
		let owner_key = owner_key.to_string();
		let items = cart.items().to_vec();
		let delay = self.debounce;
		let task = tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			let _write = remote_writes.lock().await;
			if current.load(Ordering::SeqCst) != generation {
				return;
			}
			write_backup(backups.as_ref(), &event_bus, &owner_key, &items).await;
		});

		// A superseded task wakes up, sees the newer generation and exits.
		// It is never aborted, since it may already be mid-request.
		*self.pending.lock().await = Some(task);
	}

	/// Hydrates the cart from the remote backup when the device lost it.
	///
	/// Runs once per guard. A backup is only consulted when device storage
	/// holds no cart and a device identity is available.
	#[instrument(skip_all)]
	pub async fn restore_if_needed(&self, session: &SessionContext) -> RestoreOutcome {
		if self.restored.swap(true, Ordering::SeqCst) {
			return RestoreOutcome::AlreadyRan;
		}

		match self.local.load().await {
			Ok(Some(items)) if !items.is_empty() => {
				let lines = items.len();
				let mut cart = self.cart.lock().await;
				if cart.is_empty() {
					cart.replace(items);
				}
				tracing::debug!(lines, "Local cart present, no restore needed");
				return RestoreOutcome::LocalCart(lines);
			},
			Ok(_) => {},
			Err(e) => {
				tracing::warn!(error = %e, "Failed to read local cart, treating it as missing");
			},
		}

		let Some(owner_key) = session.device_key() else {
			return RestoreOutcome::NoIdentity;
		};

		match self.backups.get(&owner_key).await {
			Ok(Some(items)) if !items.is_empty() => {
				let lines = items.len();
				if let Err(e) = self.local.save(&items).await {
					tracing::warn!(error = %e, "Failed to save restored cart locally");
				}
				self.cart.lock().await.replace(items);
				tracing::info!(owner_key = %truncate_id(&owner_key), lines, "Restored cart from backup");
				RestoreOutcome::Restored(lines)
			},
			Ok(_) => RestoreOutcome::NoBackup,
			Err(e) => {
				tracing::warn!(owner_key = %truncate_id(&owner_key), error = %e, "Failed to fetch cart backup");
				RestoreOutcome::Failed
			},
		}
	}

	/// Empties the cart after a successful order and drops its backups.
	///
	/// Any pending debounced write is cancelled first and a write already
	/// in flight is waited out, so the old cart cannot land after the
	/// delete. Returns false when the remote backup could not be deleted.
	#[instrument(skip(self))]
	pub async fn clear_on_checkout(&self, owner_key: Option<&str>) -> bool {
		self.generation.fetch_add(1, Ordering::SeqCst);
		self.pending.lock().await.take();

		self.cart.lock().await.clear();
		if let Err(e) = self.local.clear().await {
			tracing::warn!(error = %e, "Failed to clear local cart");
		}

		let Some(owner_key) = owner_key else {
			return true;
		};
		let _write = self.remote_writes.lock().await;
		match self.backups.delete(owner_key).await {
			Ok(()) => true,
			Err(e) => {
				tracing::warn!(owner_key = %truncate_id(&owner_key), error = %e, "Failed to delete cart backup");
				false
			},
		}
	}
}

impl Drop for CartPersistenceGuard {
	fn drop(&mut self) {
		if let Some(pending) = self.pending.get_mut().take() {
			pending.abort();
		}
	}
}

async fn write_backup(
	backups: &dyn CartBackupStore,
	event_bus: &EventBus,
	owner_key: &str,
	items: &[OrderItem],
) {
	match backups.upsert(owner_key, items).await {
		Ok(()) => {
			tracing::debug!(
				owner_key = %truncate_id(owner_key),
				lines = items.len(),
				"Cart backup written"
			);
		},
		Err(e) => {
			tracing::warn!(
				owner_key = %truncate_id(owner_key),
				error = %e,
				"Cart backup write failed"
			);
			event_bus
				.publish(DeskEvent::BackupFailed {
					owner_key: owner_key.to_string(),
					reason: e.to_string(),
				})
				.ok();
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use mockall::mock;
	use orderdesk_storage::implementations::memory::MemoryStorage;
	use orderdesk_storage::{RemoteCartBackups, StorageError, StorageService};
	use rust_decimal::Decimal;

	mock! {
		pub Backups {}

		#[async_trait]
		impl CartBackupStore for Backups {
			async fn upsert(&self, owner_key: &str, items: &[OrderItem]) -> Result<(), StorageError>;
			async fn get(&self, owner_key: &str) -> Result<Option<Vec<OrderItem>>, StorageError>;
			async fn delete(&self, owner_key: &str) -> Result<(), StorageError>;
		}
	}

	const DEBOUNCE: Duration = Duration::from_millis(400);

	fn local_store() -> LocalCartStore {
		LocalCartStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn guest_session() -> SessionContext {
		let mut session = SessionContext::default();
		session.start_guest("Ana", "walkin");
		session
	}

	fn item(name: &str, price: i64) -> OrderItem {
		OrderItem::new(name, Decimal::from(price), 1)
	}

	#[tokio::test(start_paused = true)]
	async fn test_rapid_mutations_coalesce_into_one_write() {
		let mut backups = MockBackups::new();
		backups
			.expect_upsert()
			.withf(|owner_key, items| owner_key.to_string() == "guest-1" && items.len() == 3)
			.times(1)
			.returning(|_, _| Ok(()));

		let guard =
			CartPersistenceGuard::new(local_store(), Arc::new(backups), DEBOUNCE, EventBus::default());
		let mut cart = Cart::new();
		for name in ["Soup", "Salad", "Bread"] {
			cart.add_item(item(name, 10));
			guard.on_mutate(Some("guest-1"), &cart).await;
			tokio::time::sleep(Duration::from_millis(100)).await;
		}

		tokio::time::sleep(DEBOUNCE * 2).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_backup_failure_is_swallowed() {
		let mut backups = MockBackups::new();
		backups
			.expect_upsert()
			.returning(|_, _| Err(StorageError::Backend("connection reset".into())));

		let event_bus = EventBus::default();
		let mut events = event_bus.subscribe();
		let guard = CartPersistenceGuard::new(local_store(), Arc::new(backups), DEBOUNCE, event_bus);
		let session = guest_session();

		guard
			.mutate(&session, |cart| cart.add_item(item("Pizza", 50)))
			.await;
		tokio::time::sleep(DEBOUNCE * 2).await;

		match events.recv().await.unwrap() {
			DeskEvent::BackupFailed { owner_key, .. } => {
				assert_eq!(Some(owner_key), session.device_key())
			},
			other => panic!("unexpected event: {:?}", other),
		}

		let total = guard
			.mutate(&session, |cart| {
				cart.add_item(item("Cola", 40));
				cart.total()
			})
			.await;
		assert_eq!(total, Decimal::from(90));
		assert_eq!(guard.snapshot().await.items().len(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_checkout_cancels_pending_write() {
		let mut backups = MockBackups::new();
		backups.expect_upsert().times(0);
		backups
			.expect_delete()
			.withf(|owner_key| owner_key.to_string() == "guest-1")
			.times(1)
			.returning(|_| Ok(()));

		let local = local_store();
		let guard =
			CartPersistenceGuard::new(local.clone(), Arc::new(backups), DEBOUNCE, EventBus::default());
		guard
			.on_mutate(Some("guest-1"), &Cart::from_items(vec![item("Tea", 5)]))
			.await;
		assert!(guard.clear_on_checkout(Some("guest-1")).await);

		tokio::time::sleep(DEBOUNCE * 2).await;
		assert!(guard.snapshot().await.is_empty());
		assert_eq!(local.load().await.unwrap(), None);
	}

	/// Backup store whose writes reach the server halfway through a slow
	/// round trip.
	struct SlowBackups {
		inner: RemoteCartBackups,
		half_trip: Duration,
	}

	#[async_trait]
	impl CartBackupStore for SlowBackups {
		async fn upsert(&self, owner_key: &str, items: &[OrderItem]) -> Result<(), StorageError> {
			tokio::time::sleep(self.half_trip).await;
			self.inner.upsert(owner_key, items).await?;
			tokio::time::sleep(self.half_trip).await;
			Ok(())
		}
		async fn get(&self, owner_key: &str) -> Result<Option<Vec<OrderItem>>, StorageError> {
			self.inner.get(owner_key).await
		}
		async fn delete(&self, owner_key: &str) -> Result<(), StorageError> {
			self.inner.delete(owner_key).await
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_checkout_waits_out_write_in_flight() {
		let remote = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let backups = Arc::new(SlowBackups {
			inner: RemoteCartBackups::new(remote, None),
			half_trip: Duration::from_millis(50),
		});
		let guard =
			CartPersistenceGuard::new(local_store(), backups.clone(), DEBOUNCE, EventBus::default());

		guard
			.on_mutate(Some("guest-1"), &Cart::from_items(vec![item("Soup", 8)]))
			.await;
		// The debounced write has started but not yet reached the server
		tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
		assert!(guard.clear_on_checkout(Some("guest-1")).await);

		tokio::time::sleep(DEBOUNCE * 2).await;
		assert_eq!(backups.get("guest-1").await.unwrap(), None);
	}

	#[tokio::test(start_paused = true)]
	async fn test_superseded_write_never_lands_after_newer_one() {
		let remote = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let backups = Arc::new(SlowBackups {
			inner: RemoteCartBackups::new(remote, None),
			half_trip: Duration::from_millis(50),
		});
		let guard =
			CartPersistenceGuard::new(local_store(), backups.clone(), DEBOUNCE, EventBus::default());

		guard
			.on_mutate(Some("guest-1"), &Cart::from_items(vec![item("Soup", 8)]))
			.await;
		tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
		let newer = Cart::from_items(vec![item("Soup", 8), item("Bread", 3)]);
		guard.on_mutate(Some("guest-1"), &newer).await;

		tokio::time::sleep(DEBOUNCE * 3).await;
		assert_eq!(
			backups.get("guest-1").await.unwrap(),
			Some(newer.items().to_vec())
		);
	}

	#[tokio::test]
	async fn test_restore_hydrates_wiped_device_once() {
		let remote = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let backups = Arc::new(RemoteCartBackups::new(remote, None));
		let session = guest_session();
		let owner_key = session.device_key().unwrap();
		backups
			.upsert(&owner_key, &[item("Steak", 70), item("Wine", 20)])
			.await
			.unwrap();

		let guard =
			CartPersistenceGuard::new(local_store(), backups, DEBOUNCE, EventBus::default());
		assert_eq!(guard.restore_if_needed(&session).await, RestoreOutcome::Restored(2));
		assert_eq!(guard.snapshot().await.total(), Decimal::from(90));
		assert_eq!(guard.restore_if_needed(&session).await, RestoreOutcome::AlreadyRan);
	}

	#[tokio::test]
	async fn test_restore_prefers_local_cart() {
		let mut backups = MockBackups::new();
		backups.expect_get().times(0);

		let local = local_store();
		local.save(&[item("Fries", 12)]).await.unwrap();
		let guard = CartPersistenceGuard::new(local, Arc::new(backups), DEBOUNCE, EventBus::default());

		assert_eq!(
			guard.restore_if_needed(&guest_session()).await,
			RestoreOutcome::LocalCart(1)
		);
		assert_eq!(guard.snapshot().await.items().len(), 1);
	}

	#[tokio::test]
	async fn test_restore_without_identity_or_backup() {
		let mut backups = MockBackups::new();
		backups.expect_get().returning(|_| Ok(None));
		let backups: Arc<dyn CartBackupStore> = Arc::new(backups);

		let guard =
			CartPersistenceGuard::new(local_store(), backups.clone(), DEBOUNCE, EventBus::default());
		assert_eq!(
			guard.restore_if_needed(&SessionContext::default()).await,
			RestoreOutcome::NoIdentity
		);

		let guard = CartPersistenceGuard::new(local_store(), backups, DEBOUNCE, EventBus::default());
		assert_eq!(
			guard.restore_if_needed(&guest_session()).await,
			RestoreOutcome::NoBackup
		);
	}
}
