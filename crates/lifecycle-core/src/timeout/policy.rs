//! Timeout policy resolution and management.
//!
//! Resolution order is merchant override, then tenant default, then the system
//! fallback from configuration. A stored policy that violates the bounds is
//! skipped with a warning so resolution can still produce a usable policy.

use lifecycle_storage::TimeoutConfigStore;
use lifecycle_types::{OrderTimeoutConfig, PolicySource, ResolvedTimeoutPolicy};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while reading, writing or resolving timeout policies.
#[derive(Debug, Error)]
pub enum TimeoutPolicyError {
	#[error("Invalid timeout policy: {0}")]
	Validation(String),
	#[error("Storage error: {0}")]
	Storage(String),
	/// The system fallback itself is unusable.
	#[error("Policy resolution error: {0}")]
	Resolution(String),
}

/// Produces the effective timeout policy for a merchant.
pub struct TimeoutPolicyResolver {
	configs: Arc<dyn TimeoutConfigStore>,
	fallback: ResolvedTimeoutPolicy,
}

impl TimeoutPolicyResolver {
	pub fn new(configs: Arc<dyn TimeoutConfigStore>, fallback: ResolvedTimeoutPolicy) -> Self {
		Self {
			configs,
			fallback: ResolvedTimeoutPolicy {
				source: PolicySource::System,
				..fallback
			},
		}
	}

	/// The system fallback, checked against the policy bounds.
	pub fn fallback(&self) -> Result<ResolvedTimeoutPolicy, TimeoutPolicyError> {
		lifecycle_types::validate_timeouts(
			self.fallback.payment_timeout_minutes,
			self.fallback.processing_timeout_hours,
		)
		.map_err(|e| TimeoutPolicyError::Resolution(format!("system fallback: {}", e)))?;
		Ok(self.fallback)
	}

	/// Resolves the policy for `merchant_id` within `tenant_id`.
	///
	/// Never fails for lack of a stored policy; only store failures and an invalid
	/// system fallback are errors.
	pub async fn resolve(
		&self,
		tenant_id: &str,
		merchant_id: &str,
	) -> Result<ResolvedTimeoutPolicy, TimeoutPolicyError> {
		let merchant = self
			.configs
			.get_merchant_override(tenant_id, merchant_id)
			.await
			.map_err(|e| TimeoutPolicyError::Storage(e.to_string()))?;
		if let Some(policy) = usable(merchant, PolicySource::Merchant) {
			return Ok(policy);
		}

		let tenant = self
			.configs
			.get_tenant_default(tenant_id)
			.await
			.map_err(|e| TimeoutPolicyError::Storage(e.to_string()))?;
		if let Some(policy) = usable(tenant, PolicySource::Tenant) {
			return Ok(policy);
		}

		self.fallback()
	}

	/// Smallest timeouts any order of the tenant can be subject to.
	///
	/// Used to narrow idle queries before per-merchant resolution.
	pub async fn tenant_floor(
		&self,
		tenant_id: &str,
	) -> Result<ResolvedTimeoutPolicy, TimeoutPolicyError> {
		let configs = self
			.configs
			.list_configs(tenant_id)
			.await
			.map_err(|e| TimeoutPolicyError::Storage(e.to_string()))?;

		let valid: Vec<_> = configs.iter().filter(|c| c.validate().is_ok()).collect();
		let has_default = valid.iter().any(|c| c.is_tenant_default());

		let mut payment = valid.iter().map(|c| c.payment_timeout_minutes).min();
		let mut processing = valid.iter().map(|c| c.processing_timeout_hours).min();
		if !has_default {
			let fallback = self.fallback()?;
			payment = Some(payment.map_or(fallback.payment_timeout_minutes, |p| {
				p.min(fallback.payment_timeout_minutes)
			}));
			processing = Some(processing.map_or(fallback.processing_timeout_hours, |p| {
				p.min(fallback.processing_timeout_hours)
			}));
		}

		match (payment, processing) {
			(Some(payment_timeout_minutes), Some(processing_timeout_hours)) => {
				Ok(ResolvedTimeoutPolicy {
					payment_timeout_minutes,
					processing_timeout_hours,
					source: if has_default {
						PolicySource::Tenant
					} else {
						PolicySource::System
					},
				})
			},
			_ => self.fallback(),
		}
	}
}

fn usable(config: Option<OrderTimeoutConfig>, source: PolicySource) -> Option<ResolvedTimeoutPolicy> {
	let config = config?;
	match config.validate() {
		Ok(()) => Some(ResolvedTimeoutPolicy::from_config(&config, source)),
		Err(e) => {
			tracing::warn!(
				tenant_id = %config.tenant_id,
				merchant_id = ?config.merchant_id,
				error = %e,
				"Ignoring out-of-bounds timeout policy"
			);
			None
		},
	}
}

/// CRUD over stored timeout policies.
pub struct TimeoutPolicyService {
	configs: Arc<dyn TimeoutConfigStore>,
	resolver: Arc<TimeoutPolicyResolver>,
}

impl TimeoutPolicyService {
	pub fn new(configs: Arc<dyn TimeoutConfigStore>, resolver: Arc<TimeoutPolicyResolver>) -> Self {
		Self { configs, resolver }
	}

	/// Reads the stored policy of one scope; `merchant_id == None` is the tenant default.
	pub async fn get(
		&self,
		tenant_id: &str,
		merchant_id: Option<&str>,
	) -> Result<Option<OrderTimeoutConfig>, TimeoutPolicyError> {
		let result = match merchant_id {
			Some(merchant_id) => self.configs.get_merchant_override(tenant_id, merchant_id).await,
			None => self.configs.get_tenant_default(tenant_id).await,
		};
		result.map_err(|e| TimeoutPolicyError::Storage(e.to_string()))
	}

	/// Validates and stores a policy, replacing any previous one in the same scope.
	pub async fn set(&self, mut config: OrderTimeoutConfig) -> Result<OrderTimeoutConfig, TimeoutPolicyError> {
		config
			.validate()
			.map_err(|e| TimeoutPolicyError::Validation(e.to_string()))?;
		config.updated_at = chrono::Utc::now();

		self.configs.put_config(&config).await.map_err(|e| match e {
			lifecycle_storage::StorageError::InvalidKey(msg) => TimeoutPolicyError::Validation(msg),
			other => TimeoutPolicyError::Storage(other.to_string()),
		})?;
		tracing::info!(
			tenant_id = %config.tenant_id,
			merchant_id = ?config.merchant_id,
			payment_timeout_minutes = config.payment_timeout_minutes,
			processing_timeout_hours = config.processing_timeout_hours,
			"Timeout policy stored"
		);
		Ok(config)
	}

	/// Removes the policy of one scope. Returns whether it existed.
	pub async fn delete(
		&self,
		tenant_id: &str,
		merchant_id: Option<&str>,
	) -> Result<bool, TimeoutPolicyError> {
		self.configs
			.delete_config(tenant_id, merchant_id)
			.await
			.map_err(|e| TimeoutPolicyError::Storage(e.to_string()))
	}

	pub async fn list(&self, tenant_id: &str) -> Result<Vec<OrderTimeoutConfig>, TimeoutPolicyError> {
		self.configs
			.list_configs(tenant_id)
			.await
			.map_err(|e| TimeoutPolicyError::Storage(e.to_string()))
	}

	/// Resolves the effective policy for a merchant.
	pub async fn resolve(
		&self,
		tenant_id: &str,
		merchant_id: &str,
	) -> Result<ResolvedTimeoutPolicy, TimeoutPolicyError> {
		self.resolver.resolve(tenant_id, merchant_id).await
	}
}
