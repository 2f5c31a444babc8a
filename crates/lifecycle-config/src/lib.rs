//! Configuration module for the order lifecycle service.
//!
//! This module provides structures and utilities for managing lifecycle configuration.
//! It supports loading configuration from TOML files and provides validation to ensure
//! all required configuration values are properly set.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use lifecycle_types::{
	validate_timeouts, PolicySource, ProcessingTimeoutAction, ResolvedTimeoutPolicy,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Inclusive bounds for `scanner.interval_seconds`.
pub const SCANNER_INTERVAL_SECONDS_RANGE: (u64, u64) = (1, 86_400);

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the order lifecycle service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the periodic timeout scanner.
	#[serde(default)]
	pub scanner: ScannerConfig,
	/// System fallback timeouts used when a tenant has no policy.
	#[serde(default)]
	pub timeouts: TimeoutsConfig,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this service instance.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the timeout scanner.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScannerConfig {
	/// Whether the periodic loop starts with the service.
	#[serde(default = "default_scanner_enabled")]
	pub enabled: bool,
	/// Seconds between two scan passes.
	#[serde(default = "default_scanner_interval_seconds")]
	pub interval_seconds: u64,
	/// What happens to orders stuck in processing past their timeout.
	#[serde(default)]
	pub processing_timeout_action: ProcessingTimeoutAction,
}

impl Default for ScannerConfig {
	fn default() -> Self {
		Self {
			enabled: default_scanner_enabled(),
			interval_seconds: default_scanner_interval_seconds(),
			processing_timeout_action: ProcessingTimeoutAction::default(),
		}
	}
}

impl ScannerConfig {
	pub fn interval(&self) -> Duration {
		Duration::from_secs(self.interval_seconds)
	}
}

fn default_scanner_enabled() -> bool {
	true
}

fn default_scanner_interval_seconds() -> u64 {
	60
}

/// System fallback timeout policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutsConfig {
	/// Minutes an order may stay pending before it is cancelled.
	#[serde(default = "default_payment_timeout_minutes")]
	pub payment_timeout_minutes: u32,
	/// Hours an order may stay in processing before the processing action fires.
	#[serde(default = "default_processing_timeout_hours")]
	pub processing_timeout_hours: u32,
}

impl Default for TimeoutsConfig {
	fn default() -> Self {
		Self {
			payment_timeout_minutes: default_payment_timeout_minutes(),
			processing_timeout_hours: default_processing_timeout_hours(),
		}
	}
}

impl TimeoutsConfig {
	/// The fallback as a resolved policy.
	pub fn fallback_policy(&self) -> ResolvedTimeoutPolicy {
		ResolvedTimeoutPolicy {
			payment_timeout_minutes: self.payment_timeout_minutes,
			processing_timeout_hours: self.processing_timeout_hours,
			source: PolicySource::System,
		}
	}
}

fn default_payment_timeout_minutes() -> u32 {
	30
}

fn default_processing_timeout_hours() -> u32 {
	48
}

/// Expands `${NAME}` and `${NAME:-default}` references from the environment.
///
/// Input over 1 MiB is rejected before matching. A reference to an unset
/// variable without a default fails the whole expansion.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_CONFIG_BYTES: usize = 1024 * 1024;
	if input.len() > MAX_CONFIG_BYTES {
		return Err(ConfigError::Validation(format!(
			"Configuration is {} bytes, the limit is {}",
			input.len(),
			MAX_CONFIG_BYTES
		)));
	}

	let pattern = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Invalid variable pattern: {}", e)))?;

	let mut missing: Option<String> = None;
	let expanded = pattern.replace_all(input, |caps: &regex::Captures<'_>| {
		let name = &caps[1];
		match (std::env::var(name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			name
		))),
		None => Ok(expanded.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - Ensures the service ID is not empty
	/// - Validates the primary storage backend is specified and configured
	/// - Checks the scanner interval is within bounds
	/// - Checks the fallback timeouts are within the policy bounds
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' has no entry in storage.implementations",
				self.storage.primary
			)));
		}

		let (min, max) = SCANNER_INTERVAL_SECONDS_RANGE;
		if !(min..=max).contains(&self.scanner.interval_seconds) {
			return Err(ConfigError::Validation(format!(
				"scanner.interval_seconds must be between {} and {}, got {}",
				min, max, self.scanner.interval_seconds
			)));
		}

		validate_timeouts(
			self.timeouts.payment_timeout_minutes,
			self.timeouts.processing_timeout_hours,
		)
		.map_err(|e| ConfigError::Validation(format!("timeouts: {}", e)))?;

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
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

	const MINIMAL: &str = r#"
[service]
id = "order-lifecycle"

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_LIFECYCLE_HOST", "localhost");
		std::env::set_var("TEST_LIFECYCLE_PORT", "5432");

		let input = "host = \"${TEST_LIFECYCLE_HOST}:${TEST_LIFECYCLE_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("TEST_LIFECYCLE_HOST");
		std::env::remove_var("TEST_LIFECYCLE_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${LIFECYCLE_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${LIFECYCLE_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("LIFECYCLE_MISSING_VAR"));
	}

	#[test]
	fn test_oversized_input_rejected() {
		let input = "#".repeat(1024 * 1024 + 1);
		assert!(matches!(
			resolve_env_vars(&input),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_defaults_apply_to_optional_sections() {
		let config: Config = MINIMAL.parse().unwrap();

		assert!(config.scanner.enabled);
		assert_eq!(config.scanner.interval(), Duration::from_secs(60));
		assert_eq!(
			config.scanner.processing_timeout_action,
			ProcessingTimeoutAction::Cancel
		);
		let fallback = config.timeouts.fallback_policy();
		assert_eq!(fallback.payment_timeout_minutes, 30);
		assert_eq!(fallback.processing_timeout_hours, 48);
		assert_eq!(fallback.source, PolicySource::System);
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("TEST_LIFECYCLE_SERVICE_ID", "lifecycle-eu");

		let config_str = r#"
[service]
id = "${TEST_LIFECYCLE_SERVICE_ID}"

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "${TEST_LIFECYCLE_DATA_DIR:-./data/orders}"

[scanner]
interval_seconds = 15
processing_timeout_action = "alert"
"#;

		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.service.id, "lifecycle-eu");
		assert_eq!(
			config.storage.implementations["file"]
				.get("storage_path")
				.and_then(|v| v.as_str()),
			Some("./data/orders")
		);
		assert_eq!(
			config.scanner.processing_timeout_action,
			ProcessingTimeoutAction::Alert
		);

		std::env::remove_var("TEST_LIFECYCLE_SERVICE_ID");
	}

	#[test]
	fn test_unknown_primary_storage_rejected() {
		let config_str = r#"
[service]
id = "order-lifecycle"

[storage]
primary = "postgres"
[storage.implementations.memory]
"#;
		let result = config_str.parse::<Config>();
		assert!(result.unwrap_err().to_string().contains("postgres"));
	}

	#[test]
	fn test_out_of_bounds_values_rejected() {
		let interval = format!("{}\n[scanner]\ninterval_seconds = 0\n", MINIMAL);
		assert!(matches!(
			interval.parse::<Config>(),
			Err(ConfigError::Validation(_))
		));

		let timeouts = format!("{}\n[timeouts]\npayment_timeout_minutes = 1441\n", MINIMAL);
		let error = timeouts.parse::<Config>().unwrap_err().to_string();
		assert!(error.contains("payment_timeout_minutes"));

		let empty_id = MINIMAL.replace("order-lifecycle", " ");
		assert!(empty_id.parse::<Config>().is_err());
	}

	#[test]
	fn test_unknown_processing_action_rejected() {
		let config_str = format!(
			"{}\n[scanner]\nprocessing_timeout_action = \"escalate\"\n",
			MINIMAL
		);
		assert!(matches!(
			config_str.parse::<Config>(),
			Err(ConfigError::Parse(_))
		));
	}
}
