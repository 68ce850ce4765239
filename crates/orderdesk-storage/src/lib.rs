//! Storage module for the orderdesk system.
//!
//! This module provides two layers. The first is a key/value abstraction
//! with pluggable backends (in-memory and file) used for device-local state
//! and remote cart backups. The second is the collaborator surface of the
//! remote order store: typed queries and writes, plus the push-based change
//! feed that reports row-level changes to subscribers.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod backup;
pub mod orders;

/// Key/value backends and the in-process order store.
pub mod implementations {
	pub mod file;
	pub mod memory;
	pub mod memory_orders;
}

pub use backup::{CartBackupStore, RemoteCartBackups};
pub use orders::{ChangeFeed, FeedSubscription, OrderStore, OrderStoreError};

/// Failures of the key/value layer.
#[derive(Debug, Error)]
pub enum StorageError {
	/// No live value under the key.
	#[error("Key not found")]
	NotFound,
	/// A stored value could not be encoded or decoded as JSON.
	#[error("Could not encode stored value: {0}")]
	Serialization(String),
	/// The backend itself failed, e.g. a disk write.
	#[error("Storage backend failed: {0}")]
	Backend(String),
	/// A backend table in the config is unusable.
	#[error("Invalid storage backend config: {0}")]
	Configuration(String),
}

/// Byte-level key/value backend with optional per-entry expiry.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Returns [`StorageError::NotFound`] for missing or expired keys.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Overwrites any previous value. A zero or absent `ttl` never expires.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deleting a missing key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Purges expired entries, returning the number dropped.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Builds a backend from its `[storage.implementations.<name>]` table.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Backends known to [`create_backend`], by config name.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::NAME, file::create_storage as StorageFactory),
		(memory::NAME, memory::create_storage as StorageFactory),
	]
}

/// Builds the backend registered under `name`.
pub fn create_backend(
	name: &str,
	config: &toml::Value,
) -> Result<Box<dyn StorageInterface>, StorageError> {
	get_all_implementations()
		.into_iter()
		.find(|(registered, _)| *registered == name)
		.ok_or_else(|| StorageError::Configuration(format!("Unknown storage backend: {}", name)))
		.and_then(|(_, factory)| factory(config))
}

/// Typed JSON view over a backend. Values live under `namespace:id` keys.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like [`Self::retrieve`], but maps a missing key to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}
