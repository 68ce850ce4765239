//! Lifecycle management for the order desk.
//!
//! Startup restores a lost cart, a background task purges expired storage
//! entries, and shutdown stops that task.

use super::{EngineError, OrderDesk};
use crate::cart::RestoreOutcome;
use orderdesk_types::SessionContext;
use std::time::Duration;
use tokio::task::JoinHandle;

impl OrderDesk {
	/// Performs startup work for a device session.
	pub async fn initialize(&self, session: &SessionContext) -> Result<RestoreOutcome, EngineError> {
		tracing::info!(desk = %self.config.desk.id, "Initializing order desk");
		let outcome = self.cart.restore_if_needed(session).await;
		tracing::debug!(outcome = ?outcome, "Cart restore finished");
		Ok(outcome)
	}

	/// Spawns the periodic storage cleanup task.
	pub fn spawn_storage_cleanup(&self) -> JoinHandle<()> {
		let storage = self.storage.clone();
		let period = Duration::from_secs(self.config.storage.cleanup_interval_seconds);
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			// The first tick completes immediately.
			interval.tick().await;
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(0) => {},
					Ok(removed) => tracing::debug!(removed, "Storage cleanup removed expired entries"),
					Err(e) => tracing::warn!(error = %e, "Storage cleanup failed"),
				}
			}
		})
	}

	/// Stops background work.
	pub async fn shutdown(&self, cleanup: Option<JoinHandle<()>>) -> Result<(), EngineError> {
		tracing::info!(desk = %self.config.desk.id, "Shutting down order desk");
		if let Some(handle) = cleanup {
			handle.abort();
			if let Err(e) = handle.await {
				if !e.is_cancelled() {
					return Err(EngineError::Service(e.to_string()));
				}
			}
		}
		Ok(())
	}
}
