//! Scripted dashboard and guest session run by the binary.
//!
//! Walks through the day-to-day flow: staff page through the dashboard and
//! move orders along while a guest at table 7 places an order that shows up
//! through the live feed.

use orderdesk_core::{LoadOutcome, OrderDesk, TransitionOutcome, ViewChange};
use orderdesk_types::{OrderFilters, OrderItem, OrderStatus, SessionContext};
use rust_decimal::Decimal;
use std::error::Error;

pub async fn run(desk: &OrderDesk) -> Result<(), Box<dyn Error>> {
	let dashboard = desk.open_dashboard();
	let outcome = dashboard
		.open(OrderFilters::default(), |change| match change {
			ViewChange::Batch { order_ids, outcome } => tracing::info!(
				batch_size = order_ids.len(),
				replaced = outcome.replaced,
				prepended = outcome.prepended,
				"Dashboard updated from feed"
			),
			ViewChange::Deleted { order_id, .. } => {
				tracing::info!(order_id, "Order removed from dashboard")
			},
		})
		.await?;
	tracing::info!(outcome = ?outcome, "Dashboard opened");

	while let LoadOutcome::Loaded(rows) = dashboard.load_more().await? {
		tracing::info!(rows, "Loaded next page");
	}

	let fresh: Vec<_> = dashboard
		.rows()
		.await
		.into_iter()
		.filter(|row| row.order.status == OrderStatus::New)
		.map(|row| row.id())
		.collect();
	for order_id in fresh.iter().take(3) {
		match dashboard.transitions().advance(*order_id).await? {
			TransitionOutcome::Applied(order) => {
				tracing::info!(order_id, status = %order.status, "Advanced order")
			},
			TransitionOutcome::Unchanged(status) => {
				tracing::info!(order_id, status = %status, "Order already final")
			},
		}
	}
	if fresh.len() > 4 {
		let affected = dashboard
			.transitions()
			.bulk_transition(&fresh[3..5], OrderStatus::Completed)
			.await?;
		tracing::info!(affected, "Bulk completed orders");
	}

	let mut session = SessionContext::default();
	session.start_guest("Lucia", "walkin");
	session.record_table_scan("7");
	desk.initialize(&session).await?;
	desk.cart()
		.mutate(&session, |cart| {
			cart.add_item(OrderItem::new("Grilled fish", Decimal::from(60), 1));
			cart.add_item(OrderItem::new("Lemonade", Decimal::from(15), 2));
		})
		.await;
	let order = desk.checkout().place_order(&mut session, None, None).await?;
	tracing::info!(
		order_id = order.id,
		table = order.table_number.as_deref().unwrap_or("-"),
		total = %order.total_amount,
		"Guest order placed"
	);

	tokio::time::sleep(desk.config().dashboard.feed_throttle() * 3).await;
	let placed = dashboard.view().get(order.id).await.is_some();
	tracing::info!(rows = dashboard.rows().await.len(), placed, "Dashboard in sync");

	dashboard
		.set_filters(OrderFilters::default().with_status(OrderStatus::Preparing))
		.await?;
	tracing::info!(rows = dashboard.rows().await.len(), "Showing orders in preparation");

	dashboard.close().await;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::seed::seed_orders;
	use orderdesk_core::DeskBuilder;
	use orderdesk_storage::implementations::memory_orders::MemoryOrderStore;
	use std::sync::Arc;

	#[tokio::test(start_paused = true)]
	async fn test_script_runs_against_memory_desk() {
		let config = r#"
[desk]
id = "script-test"

[dashboard]
page_size = 10

[storage]
primary = "memory"
cleanup_interval_seconds = 60

[storage.implementations.memory]
"#
		.parse()
		.unwrap();
		let store = Arc::new(MemoryOrderStore::new());
		seed_orders(&store, 35).await;
		let desk = DeskBuilder::new(config).build(store.clone()).unwrap();

		run(&desk).await.unwrap();

		assert_eq!(store.len().await, 36);
		let placed = store.get(36).await.unwrap();
		assert_eq!(placed.table_number.as_deref(), Some("7"));
		assert_eq!(placed.total_amount, Decimal::from(90));
		assert!(placed.user_id.is_none());
	}
}
