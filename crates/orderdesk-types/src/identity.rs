//! Customer identity types.
//!
//! An order can be attributed through three overlapping pathways: an
//! anonymous device-bound guest, an authenticated account holder, or a
//! staff-assisted checkout on behalf of a hotel stay or an account. The
//! session state for the first two lives in [`SessionContext`], which is
//! passed explicitly to everything that needs it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Device-bound guest identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestSession {
	pub guest_user_id: String,
	pub guest_first_name: String,
	/// Hotel stay code, or `walkin`.
	pub stay_id: String,
	/// Table captured by the last table scan, consumed by the next order.
	#[serde(default)]
	pub pending_table_number: Option<String>,
}

/// Authenticated account facts exposed by the profile collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
	pub is_authenticated: bool,
	#[serde(default)]
	pub account_id: Option<String>,
	#[serde(default)]
	pub account_name: Option<String>,
}

impl AccountProfile {
	pub fn signed_in(account_id: impl Into<String>, account_name: Option<String>) -> Self {
		Self {
			is_authenticated: true,
			account_id: Some(account_id.into()),
			account_name,
		}
	}
}

/// Explicit per-device session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
	guest: Option<GuestSession>,
	account: AccountProfile,
}

impl SessionContext {
	pub fn new(account: AccountProfile) -> Self {
		Self {
			guest: None,
			account,
		}
	}

	/// Creates the device guest session unless one already exists.
	///
	/// Returns the active guest session. An existing session is kept as is,
	/// so a device gets at most one guest identity until [`Self::clear_guest`].
	pub fn start_guest(
		&mut self,
		guest_first_name: impl Into<String>,
		stay_id: impl Into<String>,
	) -> &GuestSession {
		self.guest.get_or_insert_with(|| GuestSession {
			guest_user_id: Uuid::new_v4().to_string(),
			guest_first_name: guest_first_name.into(),
			stay_id: stay_id.into(),
			pending_table_number: None,
		})
	}

	/// Restores a previously persisted guest session.
	pub fn restore_guest(&mut self, guest: GuestSession) {
		self.guest = Some(guest);
	}

	pub fn clear_guest(&mut self) {
		self.guest = None;
	}

	pub fn guest(&self) -> Option<&GuestSession> {
		self.guest.as_ref()
	}

	pub fn account(&self) -> &AccountProfile {
		&self.account
	}

	pub fn set_account(&mut self, account: AccountProfile) {
		self.account = account;
	}

	/// Records a table scan. Ignored when there is no guest session.
	pub fn record_table_scan(&mut self, table_number: impl Into<String>) -> bool {
		match self.guest.as_mut() {
			Some(guest) => {
				guest.pending_table_number = Some(table_number.into());
				true
			},
			None => false,
		}
	}

	pub fn pending_table(&self) -> Option<&str> {
		self.guest
			.as_ref()
			.and_then(|g| g.pending_table_number.as_deref())
	}

	/// Clears the pending table after it has been used in an order.
	pub fn clear_pending_table(&mut self) {
		if let Some(guest) = self.guest.as_mut() {
			guest.pending_table_number = None;
		}
	}

	/// Key under which the device's cart backup is stored.
	///
	/// The guest id when a guest session exists, otherwise the account id.
	pub fn device_key(&self) -> Option<String> {
		self.guest
			.as_ref()
			.map(|g| g.guest_user_id.clone())
			.or_else(|| {
				self.account
					.is_authenticated
					.then(|| self.account.account_id.clone())
					.flatten()
			})
	}
}

/// Customer named by a staff-assisted checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CustomerTarget {
	/// An authenticated account identifier.
	Account(String),
	/// A hotel stay code.
	Stay(String),
}

impl CustomerTarget {
	/// Classifies a raw customer identifier.
	///
	/// Account ids are UUIDs; anything else is treated as a stay code.
	pub fn parse(raw: &str) -> Self {
		let trimmed = raw.trim();
		match Uuid::parse_str(trimmed) {
			Ok(id) => CustomerTarget::Account(id.to_string()),
			Err(_) => CustomerTarget::Stay(trimmed.to_string()),
		}
	}
}

/// Staff-assisted checkout context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminOverride {
	pub target: CustomerTarget,
	#[serde(default)]
	pub customer_name: Option<String>,
}

impl AdminOverride {
	pub fn new(raw_target: &str, customer_name: Option<String>) -> Self {
		Self {
			target: CustomerTarget::parse(raw_target),
			customer_name,
		}
	}
}

/// Canonical identity tuple written onto a new order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIdentity {
	pub user_id: Option<String>,
	pub guest_user_id: Option<String>,
	pub guest_first_name: Option<String>,
	pub stay_id: Option<String>,
	pub customer_name: Option<String>,
	pub table_number: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_guest_session_created_once() {
		let mut session = SessionContext::default();
		let first = session.start_guest("Ana", "walkin").guest_user_id.clone();
		let second = session.start_guest("Bob", "R-204").guest_user_id.clone();
		assert_eq!(first, second);
		assert_eq!(session.guest().unwrap().guest_first_name, "Ana");

		session.clear_guest();
		let third = session.start_guest("Bob", "R-204").guest_user_id.clone();
		assert_ne!(first, third);
	}

	#[test]
	fn test_table_scan_requires_guest() {
		let mut session = SessionContext::default();
		assert!(!session.record_table_scan("7"));
		assert_eq!(session.pending_table(), None);

		session.start_guest("Ana", "walkin");
		assert!(session.record_table_scan("7"));
		assert_eq!(session.pending_table(), Some("7"));

		session.clear_pending_table();
		assert_eq!(session.pending_table(), None);
	}

	#[test]
	fn test_device_key_prefers_guest() {
		let mut session =
			SessionContext::new(AccountProfile::signed_in("acct-1", Some("Dana".into())));
		assert_eq!(session.device_key().as_deref(), Some("acct-1"));

		let guest_id = session.start_guest("Ana", "walkin").guest_user_id.clone();
		assert_eq!(session.device_key(), Some(guest_id));

		assert_eq!(SessionContext::default().device_key(), None);
	}

	#[test]
	fn test_customer_target_parse() {
		let account = "9b2f7e7c-3a55-4d0a-9f62-0d5b2b7f1e01";
		assert_eq!(
			CustomerTarget::parse(account),
			CustomerTarget::Account(account.to_string())
		);
		assert_eq!(
			CustomerTarget::parse(" R-204 "),
			CustomerTarget::Stay("R-204".to_string())
		);
	}
}
