//! Purchaser identity resolution.
//!
//! Maps the device session and an optional staff-assisted override onto the
//! single identity tuple written on a new order. Three pathways overlap here:
//! the device-bound guest, the signed-in account holder, and a staff member
//! placing an order on behalf of a customer.

use orderdesk_types::{AdminOverride, CustomerTarget, OrderIdentity, SessionContext};
use thiserror::Error;

/// Errors raised when no purchaser can be determined.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
	/// No override, no guest session and no signed-in account.
	#[error("No purchaser identity: start a guest session or sign in")]
	Unresolved,
	/// The session claims to be signed in but carries no account id.
	#[error("Signed-in session has no account id")]
	MissingAccountId,
	/// The staff override names an empty customer.
	#[error("Staff override names no customer")]
	EmptyTarget,
}

/// Which precedence rule produced an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
	StaffAccount,
	StaffStay,
	Guest,
	Account,
}

/// Pure decision function over session state.
pub struct IdentityResolver;

impl IdentityResolver {
	/// Resolves the identity tuple for a new order.
	///
	/// Precedence, highest first: staff override, device guest session,
	/// signed-in account. A guest session wins over a signed-in account on
	/// the same device and leaves `user_id` unset.
	///
	/// The table is resolved independently: `explicit_table`, then the
	/// guest's pending table scan, otherwise none (take away).
	pub fn resolve(
		session: &SessionContext,
		admin_override: Option<&AdminOverride>,
		explicit_table: Option<&str>,
	) -> Result<OrderIdentity, IdentityError> {
		Self::resolve_with_source(session, admin_override, explicit_table)
			.map(|(identity, _)| identity)
	}

	/// Same as [`Self::resolve`], also reporting which rule applied.
	pub fn resolve_with_source(
		session: &SessionContext,
		admin_override: Option<&AdminOverride>,
		explicit_table: Option<&str>,
	) -> Result<(OrderIdentity, IdentitySource), IdentityError> {
		let table_number = Self::resolve_table(session, explicit_table);

		if let Some(admin) = admin_override {
			let customer_name = non_blank(admin.customer_name.as_deref());
			let (identity, source) = match &admin.target {
				CustomerTarget::Account(id) if !id.trim().is_empty() => (
					OrderIdentity {
						user_id: Some(id.clone()),
						customer_name,
						table_number,
						..OrderIdentity::default()
					},
					IdentitySource::StaffAccount,
				),
				CustomerTarget::Stay(code) if !code.trim().is_empty() => (
					OrderIdentity {
						stay_id: Some(code.trim().to_string()),
						customer_name,
						table_number,
						..OrderIdentity::default()
					},
					IdentitySource::StaffStay,
				),
				_ => return Err(IdentityError::EmptyTarget),
			};
			return Ok((identity, source));
		}

		let account = session.account();
		let account_name = account
			.is_authenticated
			.then(|| non_blank(account.account_name.as_deref()))
			.flatten();

		if let Some(guest) = session.guest() {
			let guest_name = non_blank(Some(&guest.guest_first_name));
			return Ok((
				OrderIdentity {
					user_id: None,
					guest_user_id: Some(guest.guest_user_id.clone()),
					guest_first_name: Some(guest.guest_first_name.clone()),
					stay_id: Some(guest.stay_id.clone()),
					customer_name: account_name.or(guest_name),
					table_number,
				},
				IdentitySource::Guest,
			));
		}

		if account.is_authenticated {
			let user_id = account
				.account_id
				.clone()
				.filter(|id| !id.trim().is_empty())
				.ok_or(IdentityError::MissingAccountId)?;
			return Ok((
				OrderIdentity {
					user_id: Some(user_id),
					customer_name: account_name,
					table_number,
					..OrderIdentity::default()
				},
				IdentitySource::Account,
			));
		}

		Err(IdentityError::Unresolved)
	}

	fn resolve_table(session: &SessionContext, explicit_table: Option<&str>) -> Option<String> {
		non_blank(explicit_table).or_else(|| non_blank(session.pending_table()))
	}
}

fn non_blank(value: Option<&str>) -> Option<String> {
	value
		.map(str::trim)
		.filter(|v| !v.is_empty())
		.map(str::to_string)
}
