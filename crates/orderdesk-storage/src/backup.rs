//! Remote cart backup store.

use crate::{StorageError, StorageService};
use async_trait::async_trait;
use orderdesk_types::{CartBackup, OrderItem, StorageKey};
use std::sync::Arc;
use std::time::Duration;

/// Remote mirror of device carts, keyed by device identity.
#[async_trait]
pub trait CartBackupStore: Send + Sync {
	/// Creates or replaces the backup for `owner_key`.
	async fn upsert(&self, owner_key: &str, items: &[OrderItem]) -> Result<(), StorageError>;

	/// Returns the backed-up items, or `None` when there is no backup.
	async fn get(&self, owner_key: &str) -> Result<Option<Vec<OrderItem>>, StorageError>;

	/// Removes the backup. Removing a missing backup is not an error.
	async fn delete(&self, owner_key: &str) -> Result<(), StorageError>;
}

/// Cart backups kept in a [`StorageService`] namespace.
pub struct RemoteCartBackups {
	storage: Arc<StorageService>,
	ttl: Option<Duration>,
}

impl RemoteCartBackups {
	pub fn new(storage: Arc<StorageService>, ttl: Option<Duration>) -> Self {
		Self { storage, ttl }
	}
}

#[async_trait]
impl CartBackupStore for RemoteCartBackups {
	async fn upsert(&self, owner_key: &str, items: &[OrderItem]) -> Result<(), StorageError> {
		let backup = CartBackup::new(owner_key, items.to_vec());
		self.storage
			.store_with_ttl(StorageKey::CartBackups.as_str(), owner_key, &backup, self.ttl)
			.await
	}

	async fn get(&self, owner_key: &str) -> Result<Option<Vec<OrderItem>>, StorageError> {
		let backup: Option<CartBackup> = self
			.storage
			.retrieve_optional(StorageKey::CartBackups.as_str(), owner_key)
			.await?;
		Ok(backup.map(|b| b.items))
	}

	async fn delete(&self, owner_key: &str) -> Result<(), StorageError> {
		self.storage
			.remove(StorageKey::CartBackups.as_str(), owner_key)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use rust_decimal::Decimal;

	#[tokio::test]
	async fn test_upsert_get_delete() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let backups = RemoteCartBackups::new(storage.clone(), None);
		let items = vec![OrderItem::new("Club sandwich", Decimal::from(45), 2)];

		assert_eq!(backups.get("guest-1").await.unwrap(), None);

		backups.upsert("guest-1", &items).await.unwrap();
		assert_eq!(backups.get("guest-1").await.unwrap(), Some(items.clone()));

		let stored: CartBackup = storage
			.retrieve(StorageKey::CartBackups.as_str(), "guest-1")
			.await
			.unwrap();
		assert_eq!(stored.owner_key, "guest-1");
		assert_eq!(stored.total(), Decimal::from(90));

		backups.delete("guest-1").await.unwrap();
		backups.delete("guest-1").await.unwrap();
		assert_eq!(backups.get("guest-1").await.unwrap(), None);
	}
}
