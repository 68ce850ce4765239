//! Namespaces used by the key/value storage layer.

use std::str::FromStr;

/// Key prefix under which a kind of device state is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Remote cart backups keyed by owner
	CartBackups,
	/// Device-local cart contents
	LocalCart,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::CartBackups => "cart_backups",
			StorageKey::LocalCart => "local_cart",
		}
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[Self::CartBackups, Self::LocalCart].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}
