//! Demo data for the in-memory order store.

use chrono::{Duration, Utc};
use orderdesk_storage::implementations::memory_orders::MemoryOrderStore;
use orderdesk_types::{items_total, Order, OrderItem, OrderStatus, WALK_IN_STAY};
use rust_decimal::Decimal;

const GUESTS: [&str; 6] = ["Ana", "Bruno", "Chen", "Dara", "Emeka", "Farah"];
const STAYS: [&str; 3] = ["R-101", "R-204", "R-310"];
const MENU: [(&str, i64); 5] = [
	("Paella", 45),
	("Grilled fish", 60),
	("Caesar salad", 22),
	("Lemonade", 15),
	("Espresso", 4),
];

/// Imports `count` orders spread over the last hours, newest last.
pub async fn seed_orders(store: &MemoryOrderStore, count: usize) {
	let now = Utc::now();
	for n in 0..count {
		let id = n as i64 + 1;
		let guest = GUESTS[n % GUESTS.len()];
		let stay = if n % 4 == 0 {
			STAYS[n % STAYS.len()]
		} else {
			WALK_IN_STAY
		};
		let table = (n % 5 != 0).then(|| ((n % 12) + 1).to_string());
		let items: Vec<OrderItem> = (0..(n % 3) + 1)
			.map(|i| {
				let (name, price) = MENU[(n + i) % MENU.len()];
				OrderItem::new(name, Decimal::from(price), (i as u32) + 1)
			})
			.collect();
		let status = match n % 7 {
			0 | 1 | 2 => OrderStatus::New,
			3 => OrderStatus::Preparing,
			4 => OrderStatus::Ready,
			5 => OrderStatus::Completed,
			_ => OrderStatus::Paid,
		};
		let created_at = now - Duration::minutes((count - n) as i64 * 3);

		store
			.import(Order {
				id,
				user_id: None,
				guest_user_id: Some(format!("seed-guest-{}", id)),
				guest_first_name: Some(guest.to_string()),
				stay_id: Some(stay.to_string()),
				customer_name: Some(guest.to_string()),
				table_number: table,
				status,
				total_amount: items_total(&items),
				items,
				created_at,
				updated_at: created_at,
			})
			.await;
	}
	tracing::info!(count, "Seeded order store");
}
