//! Order persistence on top of [`StorageService`].
//!
//! The conditional [`OrderStore::update_status`] is the only way an order's status
//! changes in storage. It writes the order and its history row in one guarded commit.

use crate::{check_key_component, Precondition, StorageError, StorageService, WriteBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lifecycle_types::{OperatorType, Order, OrderStatus, OrderStatusHistory, StorageKey};
use std::collections::{BTreeMap, BTreeSet};

/// A status change conditional on the order still being where the caller saw it.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
	pub tenant_id: String,
	pub order_id: String,
	/// Status the caller read.
	pub from: OrderStatus,
	/// Version the caller read.
	pub expected_version: u64,
	pub to: OrderStatus,
	pub at: DateTime<Utc>,
	pub reason: String,
	pub operator_type: OperatorType,
	pub operator_id: Option<String>,
	pub metadata: serde_json::Value,
}

/// Filter for orders whose status has not changed since `older_than`.
#[derive(Debug, Clone)]
pub struct IdleQuery {
	pub tenant_id: String,
	pub merchant_id: Option<String>,
	pub statuses: Vec<OrderStatus>,
	/// Inclusive upper bound on `status_updated_at`.
	pub older_than: DateTime<Utc>,
}

impl IdleQuery {
	fn matches(&self, order: &Order) -> bool {
		self.statuses.contains(&order.status)
			&& order.status_updated_at <= self.older_than
			&& self
				.merchant_id
				.as_deref()
				.map_or(true, |merchant_id| order.merchant_id == merchant_id)
	}
}

/// Order Store collaborator consumed by the lifecycle core.
#[async_trait]
pub trait OrderStore: Send + Sync {
	/// Reads one order, `None` when it does not exist in the tenant.
	async fn get_order(&self, tenant_id: &str, order_id: &str)
		-> Result<Option<Order>, StorageError>;

	/// Persists a new order. Fails if the id is already taken.
	async fn insert_order(&self, order: &Order) -> Result<(), StorageError>;

	/// Applies a status change and appends its history row atomically.
	///
	/// Fails with [`StorageError::PreconditionFailed`] if the order no longer has the
	/// expected status and version, and writes nothing in that case.
	async fn update_status(
		&self,
		update: StatusUpdate,
	) -> Result<(Order, OrderStatusHistory), StorageError>;

	/// Lists orders matching the query, oldest status change first.
	async fn list_idle(&self, query: &IdleQuery) -> Result<Vec<Order>, StorageError>;

	/// Lists every tenant that owns at least one order.
	async fn list_tenants(&self) -> Result<Vec<String>, StorageError>;

	/// Counts orders per status. Every status is present, zero when unused.
	async fn count_by_status(
		&self,
		tenant_id: &str,
		merchant_id: Option<&str>,
	) -> Result<BTreeMap<OrderStatus, u64>, StorageError>;
}

#[async_trait]
impl OrderStore for StorageService {
	async fn get_order(
		&self,
		tenant_id: &str,
		order_id: &str,
	) -> Result<Option<Order>, StorageError> {
		self.retrieve_optional(&StorageKey::order(tenant_id, order_id))
			.await
	}

	async fn insert_order(&self, order: &Order) -> Result<(), StorageError> {
		check_key_component("tenant id", &order.tenant_id)?;
		check_key_component("order id", &order.id)?;

		let key = StorageKey::order(&order.tenant_id, &order.id);
		let batch = WriteBatch::new()
			.require(Precondition::Absent { key: key.clone() })
			.put(key, Self::encode(order)?);
		self.commit(batch).await
	}

	async fn update_status(
		&self,
		update: StatusUpdate,
	) -> Result<(Order, OrderStatusHistory), StorageError> {
		check_key_component("tenant id", &update.tenant_id)?;
		check_key_component("order id", &update.order_id)?;

		let key = StorageKey::order(&update.tenant_id, &update.order_id);
		let (current, raw): (Order, _) = self.retrieve_with_raw(&key).await?;
		if current.status != update.from || current.version != update.expected_version {
			return Err(StorageError::PreconditionFailed(format!(
				"order {} is {} at version {}, expected {} at version {}",
				update.order_id,
				current.status,
				current.version,
				update.from,
				update.expected_version
			)));
		}

		let sequence = current.version + 1;
		let updated = Order {
			status: update.to,
			status_updated_at: update.at.max(current.status_updated_at),
			version: sequence,
			..current
		};
		let history = OrderStatusHistory {
			id: uuid::Uuid::new_v4().to_string(),
			tenant_id: update.tenant_id.clone(),
			order_id: update.order_id.clone(),
			sequence,
			from_status: update.from,
			to_status: update.to,
			reason: update.reason,
			operator_type: update.operator_type,
			operator_id: update.operator_id,
			metadata: update.metadata,
			created_at: updated.status_updated_at,
		};

		let history_key = StorageKey::history(&update.tenant_id, &update.order_id, sequence);
		let batch = WriteBatch::new()
			.require(Precondition::Matches {
				key: key.clone(),
				expected: raw,
			})
			.require(Precondition::Absent {
				key: history_key.clone(),
			})
			.put(key, Self::encode(&updated)?)
			.put(history_key, Self::encode(&history)?);
		self.commit(batch).await?;

		Ok((updated, history))
	}

	async fn list_idle(&self, query: &IdleQuery) -> Result<Vec<Order>, StorageError> {
		let mut orders: Vec<Order> = self
			.list::<Order>(&StorageKey::orders_of_tenant(&query.tenant_id))
			.await?
			.into_iter()
			.map(|(_, order)| order)
			.filter(|order| query.matches(order))
			.collect();
		orders.sort_by(|a, b| {
			a.status_updated_at
				.cmp(&b.status_updated_at)
				.then_with(|| a.id.cmp(&b.id))
		});
		Ok(orders)
	}

	async fn list_tenants(&self) -> Result<Vec<String>, StorageError> {
		let prefix = format!("{}:", StorageKey::Orders.as_str());
		let tenants: BTreeSet<String> = self
			.keys(&prefix)
			.await?
			.iter()
			.filter_map(|key| key[prefix.len()..].split(':').next())
			.filter(|tenant| !tenant.is_empty())
			.map(str::to_string)
			.collect();
		Ok(tenants.into_iter().collect())
	}

	async fn count_by_status(
		&self,
		tenant_id: &str,
		merchant_id: Option<&str>,
	) -> Result<BTreeMap<OrderStatus, u64>, StorageError> {
		let mut counts: BTreeMap<OrderStatus, u64> =
			OrderStatus::ALL.iter().map(|status| (*status, 0)).collect();
		for (_, order) in self
			.list::<Order>(&StorageKey::orders_of_tenant(tenant_id))
			.await?
		{
			if merchant_id.map_or(true, |m| order.merchant_id == m) {
				*counts.entry(order.status).or_insert(0) += 1;
			}
		}
		Ok(counts)
	}
}
