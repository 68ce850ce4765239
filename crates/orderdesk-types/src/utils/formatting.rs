//! String formatting utilities.
//!
//! Provides the labels the dashboard shows next to an order and a helper for
//! keeping long identifiers readable in logs.

/// Table label used when an order has no table.
pub const TAKE_AWAY: &str = "Take Away";

/// Stay id of guests who are not staying at the hotel.
pub const WALK_IN_STAY: &str = "walkin";

/// Utility function to truncate an identifier for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Formats where an order should be served.
///
/// Hotel stays show the stay code, walk-ins show the table, and orders
/// without a table are take-away.
pub fn format_location(stay_id: Option<&str>, table_number: Option<&str>) -> String {
	let table = table_number
		.map(str::trim)
		.filter(|t| !t.is_empty() && *t != TAKE_AWAY);

	match (stay_id.filter(|s| *s != WALK_IN_STAY), table) {
		(Some(stay), Some(table)) => format!("Stay {} · Table {}", stay, table),
		(Some(stay), None) => format!("Stay {}", stay),
		(None, Some(table)) => format!("Table {}", table),
		(None, None) => TAKE_AWAY.to_string(),
	}
}
