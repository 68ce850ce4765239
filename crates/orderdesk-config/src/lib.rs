//! Configuration module for the orderdesk system.
//!
//! This module provides structures and utilities for managing desk
//! configuration. Configuration is loaded from TOML, with `${VAR}` and
//! `${VAR:-default}` references resolved from the environment before parsing,
//! and is validated after parsing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a desk configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The file could not be read.
	#[error("Failed to read config: {0}")]
	Io(#[from] std::io::Error),
	/// The TOML is malformed or does not match the expected shape.
	#[error("Invalid config syntax: {0}")]
	Parse(String),
	/// A value is out of range or refers to something missing.
	#[error("Invalid config value: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only; the default rendering repeats the input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for an orderdesk instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this desk instance.
	pub desk: DeskConfig,
	/// Dashboard listing and change-feed settings.
	#[serde(default)]
	pub dashboard: DashboardConfig,
	/// Cart backup settings.
	#[serde(default)]
	pub cart: CartConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
}

/// Configuration specific to the desk instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeskConfig {
	/// Unique identifier for this desk, used in logs.
	pub id: String,
}

/// Dashboard listing and change-feed settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DashboardConfig {
	/// Rows fetched per page.
	#[serde(default = "default_page_size")]
	pub page_size: usize,
	/// Throttle window for buffered change-feed events, in milliseconds.
	#[serde(default = "default_feed_throttle_ms")]
	pub feed_throttle_ms: u64,
}

impl Default for DashboardConfig {
	fn default() -> Self {
		Self {
			page_size: default_page_size(),
			feed_throttle_ms: default_feed_throttle_ms(),
		}
	}
}

impl DashboardConfig {
	pub fn feed_throttle(&self) -> Duration {
		Duration::from_millis(self.feed_throttle_ms)
	}
}

fn default_page_size() -> usize {
	100
}

fn default_feed_throttle_ms() -> u64 {
	300
}

/// Cart backup settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CartConfig {
	/// Debounce window for backup writes, in milliseconds.
	#[serde(default = "default_backup_debounce_ms")]
	pub backup_debounce_ms: u64,
	/// Lifetime of a backup in seconds. 0 keeps backups until checkout.
	#[serde(default)]
	pub backup_ttl_seconds: u64,
}

impl Default for CartConfig {
	fn default() -> Self {
		Self {
			backup_debounce_ms: default_backup_debounce_ms(),
			backup_ttl_seconds: 0,
		}
	}
}

impl CartConfig {
	pub fn backup_debounce(&self) -> Duration {
		Duration::from_millis(self.backup_debounce_ms)
	}

	pub fn backup_ttl(&self) -> Option<Duration> {
		(self.backup_ttl_seconds > 0).then(|| Duration::from_secs(self.backup_ttl_seconds))
	}
}

fn default_backup_debounce_ms() -> u64 {
	400
}

/// Key/value backends for the local cart and remote cart backups.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Backend that holds desk state, by name.
	pub primary: String,
	/// Backend tables keyed by name, e.g. `[storage.implementations.file]`.
	pub implementations: HashMap<String, toml::Value>,
	/// How often expired backups are purged.
	pub cleanup_interval_seconds: u64,
}

impl StorageConfig {
	/// Returns the configuration table of the primary implementation.
	pub fn primary_config(&self) -> Option<&toml::Value> {
		self.implementations.get(&self.primary)
	}
}

/// Substitutes `${NAME}` and `${NAME:-fallback}` references with values from
/// the process environment. A reference without fallback to an unset
/// variable is an error.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Config input is {} bytes, limit is {}",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' is not set",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Rejects values the desk cannot run with.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.desk.id.trim().is_empty() {
			return Err(ConfigError::Validation("desk.id must not be blank".into()));
		}

		check_range("dashboard.page_size", self.dashboard.page_size as u64, 1, 1000)?;
		check_range("dashboard.feed_throttle_ms", self.dashboard.feed_throttle_ms, 1, 10_000)?;
		check_range("cart.backup_debounce_ms", self.cart.backup_debounce_ms, 1, 10_000)?;
		check_range(
			"storage.cleanup_interval_seconds",
			self.storage.cleanup_interval_seconds,
			1,
			86_400,
		)?;

		let storage = &self.storage;
		if storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"storage.implementations must list at least one backend".into(),
			));
		}
		if storage.primary_config().is_none() {
			return Err(ConfigError::Validation(format!(
				"storage.primary '{}' has no [storage.implementations.{}] table",
				storage.primary, storage.primary
			)));
		}

		Ok(())
	}
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
	if (min..=max).contains(&value) {
		Ok(())
	} else {
		Err(ConfigError::Validation(format!(
			"{} must be between {} and {}, got {}",
			field, min, max, value
		)))
	}
}

/// Parses a TOML string, resolving environment variables and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const MINIMAL: &str = r#"
[desk]
id = "lobby-desk"

[storage]
primary = "memory"
cleanup_interval_seconds = 60

[storage.implementations.memory]
"#;

	#[test]
	fn test_env_references_resolve_or_fall_back() {
		std::env::set_var("ORDERDESK_TEST_DATA_DIR", "/var/lib/orderdesk");

		let input = "storage_path = \"${ORDERDESK_TEST_DATA_DIR}/carts\"\nid = \"${ORDERDESK_UNSET_DESK:-bar-desk}\"";
		let resolved = resolve_env_vars(input).unwrap();
		assert_eq!(
			resolved,
			"storage_path = \"/var/lib/orderdesk/carts\"\nid = \"bar-desk\""
		);

		std::env::remove_var("ORDERDESK_TEST_DATA_DIR");
	}

	#[test]
	fn test_unset_env_reference_names_the_variable() {
		let err = resolve_env_vars("id = \"${ORDERDESK_UNSET_DESK}\"").unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
		assert!(err.to_string().contains("ORDERDESK_UNSET_DESK"));
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.desk.id, "lobby-desk");
		assert_eq!(config.dashboard.page_size, 100);
		assert_eq!(config.dashboard.feed_throttle(), Duration::from_millis(300));
		assert_eq!(config.cart.backup_debounce(), Duration::from_millis(400));
		assert_eq!(config.cart.backup_ttl(), None);
		assert!(config.storage.primary_config().is_some());
	}

	#[test]
	fn test_validation_rejects_unknown_primary() {
		let input = MINIMAL.replace("primary = \"memory\"", "primary = \"redis\"");
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("redis"));
	}

	#[test]
	fn test_validation_rejects_zero_page_size() {
		let input = format!("{}\n[dashboard]\npage_size = 0\n", MINIMAL);
		let err = input.parse::<Config>().unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[tokio::test]
	async fn test_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			"{}\n[cart]\nbackup_debounce_ms = 250\nbackup_ttl_seconds = 3600\n",
			MINIMAL
		)
		.unwrap();

		let config = Config::from_file(file.path().to_str().unwrap())
			.await
			.unwrap();
		assert_eq!(config.cart.backup_debounce(), Duration::from_millis(250));
		assert_eq!(config.cart.backup_ttl(), Some(Duration::from_secs(3600)));
	}
}
