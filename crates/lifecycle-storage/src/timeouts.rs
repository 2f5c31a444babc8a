//! Timeout policy persistence.
//!
//! Policies are keyed by scope, so a tenant has at most one default and each
//! merchant at most one override without any extra bookkeeping.

use crate::{check_key_component, StorageError, StorageService};
use async_trait::async_trait;
use lifecycle_types::{OrderTimeoutConfig, StorageKey};

/// Config Store collaborator consumed by the timeout policy resolver.
#[async_trait]
pub trait TimeoutConfigStore: Send + Sync {
	async fn get_merchant_override(
		&self,
		tenant_id: &str,
		merchant_id: &str,
	) -> Result<Option<OrderTimeoutConfig>, StorageError>;

	async fn get_tenant_default(
		&self,
		tenant_id: &str,
	) -> Result<Option<OrderTimeoutConfig>, StorageError>;

	/// Inserts or replaces the policy for the config's scope.
	async fn put_config(&self, config: &OrderTimeoutConfig) -> Result<(), StorageError>;

	/// Deletes the policy for a scope. Returns whether one existed.
	async fn delete_config(
		&self,
		tenant_id: &str,
		merchant_id: Option<&str>,
	) -> Result<bool, StorageError>;

	/// Lists every policy of a tenant, the default first.
	async fn list_configs(&self, tenant_id: &str) -> Result<Vec<OrderTimeoutConfig>, StorageError>;
}

#[async_trait]
impl TimeoutConfigStore for StorageService {
	async fn get_merchant_override(
		&self,
		tenant_id: &str,
		merchant_id: &str,
	) -> Result<Option<OrderTimeoutConfig>, StorageError> {
		self.retrieve_optional(&StorageKey::timeout_config(tenant_id, Some(merchant_id)))
			.await
	}

	async fn get_tenant_default(
		&self,
		tenant_id: &str,
	) -> Result<Option<OrderTimeoutConfig>, StorageError> {
		self.retrieve_optional(&StorageKey::timeout_config(tenant_id, None))
			.await
	}

	async fn put_config(&self, config: &OrderTimeoutConfig) -> Result<(), StorageError> {
		check_key_component("tenant id", &config.tenant_id)?;
		if let Some(merchant_id) = &config.merchant_id {
			check_key_component("merchant id", merchant_id)?;
		}
		let key = StorageKey::timeout_config(&config.tenant_id, config.merchant_id.as_deref());
		self.store(&key, config).await
	}

	async fn delete_config(
		&self,
		tenant_id: &str,
		merchant_id: Option<&str>,
	) -> Result<bool, StorageError> {
		let key = StorageKey::timeout_config(tenant_id, merchant_id);
		if !self.exists(&key).await? {
			return Ok(false);
		}
		self.remove(&key).await?;
		Ok(true)
	}

	async fn list_configs(&self, tenant_id: &str) -> Result<Vec<OrderTimeoutConfig>, StorageError> {
		Ok(self
			.list::<OrderTimeoutConfig>(&StorageKey::timeout_configs_of_tenant(tenant_id))
			.await?
			.into_iter()
			.map(|(_, config)| config)
			.collect())
	}
}
