//! Storage-related types for the lifecycle system.

use std::str::FromStr;

/// Storage namespaces for the different record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order records, keyed by tenant and order id.
	Orders,
	/// Status history rows, keyed by tenant, order id and sequence.
	OrderHistory,
	/// Timeout policies, keyed by tenant and scope.
	TimeoutConfigs,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::OrderHistory => "order_history",
			StorageKey::TimeoutConfigs => "timeout_configs",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Orders, Self::OrderHistory, Self::TimeoutConfigs].into_iter()
	}

	/// Key of an order record.
	pub fn order(tenant_id: &str, order_id: &str) -> String {
		format!("{}:{}:{}", Self::Orders.as_str(), tenant_id, order_id)
	}

	/// Prefix shared by every order of a tenant.
	pub fn orders_of_tenant(tenant_id: &str) -> String {
		format!("{}:{}:", Self::Orders.as_str(), tenant_id)
	}

	/// Key of one history row. Sequences are zero-padded so keys sort in chain order.
	pub fn history(tenant_id: &str, order_id: &str, sequence: u64) -> String {
		format!(
			"{}{:010}",
			Self::history_of_order(tenant_id, order_id),
			sequence
		)
	}

	/// Prefix shared by every history row of an order.
	pub fn history_of_order(tenant_id: &str, order_id: &str) -> String {
		format!("{}:{}:{}:", Self::OrderHistory.as_str(), tenant_id, order_id)
	}

	/// Key of a tenant default (`merchant_id == None`) or merchant override.
	pub fn timeout_config(tenant_id: &str, merchant_id: Option<&str>) -> String {
		match merchant_id {
			Some(merchant_id) => format!(
				"{}merchant:{}",
				Self::timeout_configs_of_tenant(tenant_id),
				merchant_id
			),
			None => format!("{}default", Self::timeout_configs_of_tenant(tenant_id)),
		}
	}

	/// Prefix shared by every policy of a tenant.
	pub fn timeout_configs_of_tenant(tenant_id: &str) -> String {
		format!("{}:{}:", Self::TimeoutConfigs.as_str(), tenant_id)
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"order_history" => Ok(Self::OrderHistory),
			"timeout_configs" => Ok(Self::TimeoutConfigs),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_history_keys_sort_in_sequence_order() {
		let mut keys = vec![
			StorageKey::history("t1", "o1", 10),
			StorageKey::history("t1", "o1", 2),
			StorageKey::history("t1", "o1", 1),
		];
		keys.sort();
		assert_eq!(keys[0], "order_history:t1:o1:0000000001");
		assert_eq!(keys[2], "order_history:t1:o1:0000000010");
		assert!(keys[0].starts_with(&StorageKey::history_of_order("t1", "o1")));
	}

	#[test]
	fn test_timeout_config_keys() {
		assert_eq!(
			StorageKey::timeout_config("t1", None),
			"timeout_configs:t1:default"
		);
		assert_eq!(
			StorageKey::timeout_config("t1", Some("m1")),
			"timeout_configs:t1:merchant:m1"
		);
	}

	#[test]
	fn test_namespace_round_trip() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
	}
}
