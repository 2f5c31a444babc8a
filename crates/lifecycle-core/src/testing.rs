//! Shared fixtures for unit tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use lifecycle_storage::implementations::memory::MemoryStorage;
use lifecycle_storage::{
	IdleQuery, OrderStore, StatusUpdate, StorageError, StorageInterface, StorageService,
	WriteBatch, WriteOp,
};
use lifecycle_types::{ConfigSchema, NewOrder, Order, OrderStatus, OrderStatusHistory, StorageKey};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub(crate) fn memory_store() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

/// Inserts an order whose status last changed `minutes_ago` minutes ago.
pub(crate) async fn seed_order(
	store: &StorageService,
	tenant_id: &str,
	order_id: &str,
	merchant_id: &str,
	status: OrderStatus,
	minutes_ago: i64,
) -> Order {
	let order = NewOrder::new(tenant_id, merchant_id, "customer-1")
		.with_id(order_id)
		.with_initial_status(status)
		.into_order(Utc::now() - Duration::minutes(minutes_ago));
	store.insert_order(&order).await.unwrap();
	order
}

/// Memory backend whose commits fail whenever they would write a history row.
pub(crate) struct FailingCommitStorage {
	inner: MemoryStorage,
}

impl FailingCommitStorage {
	pub(crate) fn new() -> Self {
		Self {
			inner: MemoryStorage::new(),
		}
	}
}

#[async_trait]
impl StorageInterface for FailingCommitStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.inner.get_bytes(key).await
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.inner.set_bytes(key, value).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.inner.delete(key).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		self.inner.exists(key).await
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		self.inner.list_keys(prefix).await
	}

	async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
		let history_prefix = format!("{}:", StorageKey::OrderHistory.as_str());
		let touches_history = batch.ops.iter().any(|op| match op {
			WriteOp::Put { key, .. } | WriteOp::Delete { key } => key.starts_with(&history_prefix),
		});
		if touches_history {
			return Err(StorageError::Backend("injected history write failure".into()));
		}
		self.inner.commit(batch).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}
}

/// Order store that injects failures and delays in front of a real one.
pub(crate) struct ScriptedOrders {
	inner: Arc<StorageService>,
	/// Tenants whose idle queries fail.
	failing_tenants: Vec<String>,
	/// Remaining `list_tenants` calls that fail; `usize::MAX` fails forever.
	tenant_list_failures: AtomicUsize,
	tenant_list_delay: std::time::Duration,
	/// Once the failures are used up, each `list_tenants` call waits for a permit.
	tenant_list_gate: Option<Arc<Semaphore>>,
	active_scans: AtomicUsize,
	max_active_scans: AtomicUsize,
}

impl ScriptedOrders {
	pub(crate) fn new(inner: Arc<StorageService>) -> Self {
		Self {
			inner,
			failing_tenants: Vec::new(),
			tenant_list_failures: AtomicUsize::new(0),
			tenant_list_delay: std::time::Duration::ZERO,
			tenant_list_gate: None,
			active_scans: AtomicUsize::new(0),
			max_active_scans: AtomicUsize::new(0),
		}
	}

	pub(crate) fn failing_tenant(mut self, tenant_id: &str) -> Self {
		self.failing_tenants.push(tenant_id.to_string());
		self
	}

	pub(crate) fn tenant_list_failures(self, count: usize) -> Self {
		self.tenant_list_failures.store(count, Ordering::SeqCst);
		self
	}

	pub(crate) fn tenant_list_delay(mut self, delay: std::time::Duration) -> Self {
		self.tenant_list_delay = delay;
		self
	}

	pub(crate) fn tenant_list_gate(mut self, gate: Arc<Semaphore>) -> Self {
		self.tenant_list_gate = Some(gate);
		self
	}

	/// Highest number of `list_tenants` calls that were ever in flight together.
	pub(crate) fn max_active_scans(&self) -> usize {
		self.max_active_scans.load(Ordering::SeqCst)
	}

	fn take_failure(&self) -> bool {
		self.tenant_list_failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
				0 => None,
				usize::MAX => Some(usize::MAX),
				n => Some(n - 1),
			})
			.is_ok()
	}
}

#[async_trait]
impl OrderStore for ScriptedOrders {
	async fn get_order(
		&self,
		tenant_id: &str,
		order_id: &str,
	) -> Result<Option<Order>, StorageError> {
		self.inner.get_order(tenant_id, order_id).await
	}

	async fn insert_order(&self, order: &Order) -> Result<(), StorageError> {
		self.inner.insert_order(order).await
	}

	async fn update_status(
		&self,
		update: StatusUpdate,
	) -> Result<(Order, OrderStatusHistory), StorageError> {
		self.inner.update_status(update).await
	}

	async fn list_idle(&self, query: &IdleQuery) -> Result<Vec<Order>, StorageError> {
		if self.failing_tenants.contains(&query.tenant_id) {
			return Err(StorageError::Backend("connection reset".into()));
		}
		self.inner.list_idle(query).await
	}

	async fn list_tenants(&self) -> Result<Vec<String>, StorageError> {
		let active = self.active_scans.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_active_scans.fetch_max(active, Ordering::SeqCst);

		let result = if self.take_failure() {
			Err(StorageError::Backend("tenant index unavailable".into()))
		} else {
			if let Some(gate) = &self.tenant_list_gate {
				if let Ok(permit) = gate.acquire().await {
					permit.forget();
				}
			}
			tokio::time::sleep(self.tenant_list_delay).await;
			self.inner.list_tenants().await
		};

		self.active_scans.fetch_sub(1, Ordering::SeqCst);
		result
	}

	async fn count_by_status(
		&self,
		tenant_id: &str,
		merchant_id: Option<&str>,
	) -> Result<BTreeMap<OrderStatus, u64>, StorageError> {
		self.inner.count_by_status(tenant_id, merchant_id).await
	}
}
