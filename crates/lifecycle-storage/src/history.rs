//! Read access to the append-only status history.
//!
//! Rows are written only by [`OrderStore::update_status`](crate::OrderStore::update_status),
//! in the same commit as the status change they record.

use crate::{StorageError, StorageService};
use async_trait::async_trait;
use lifecycle_types::{OrderStatusHistory, StorageKey};

/// History Store collaborator consumed by the lifecycle core.
#[async_trait]
pub trait HistoryStore: Send + Sync {
	/// Lists every history row of an order, ordered by `created_at` then `sequence`.
	async fn list_by_order(
		&self,
		tenant_id: &str,
		order_id: &str,
	) -> Result<Vec<OrderStatusHistory>, StorageError>;
}

#[async_trait]
impl HistoryStore for StorageService {
	async fn list_by_order(
		&self,
		tenant_id: &str,
		order_id: &str,
	) -> Result<Vec<OrderStatusHistory>, StorageError> {
		let mut rows: Vec<OrderStatusHistory> = self
			.list::<OrderStatusHistory>(&StorageKey::history_of_order(tenant_id, order_id))
			.await?
			.into_iter()
			.map(|(_, row)| row)
			.collect();
		rows.sort_by(|a, b| {
			a.created_at
				.cmp(&b.created_at)
				.then_with(|| a.sequence.cmp(&b.sequence))
		});
		Ok(rows)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use crate::{OrderStore, StatusUpdate};
	use chrono::Utc;
	use lifecycle_types::{NewOrder, OperatorType, OrderStatus};

	#[tokio::test]
	async fn test_rows_are_scoped_to_their_order() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		let now = Utc::now();
		for id in ["o1", "o10"] {
			let order = NewOrder::new("t1", "m1", "c1").with_id(id).into_order(now);
			storage.insert_order(&order).await.unwrap();
			storage
				.update_status(StatusUpdate {
					tenant_id: "t1".into(),
					order_id: id.into(),
					from: OrderStatus::Pending,
					expected_version: 0,
					to: OrderStatus::Paid,
					at: now,
					reason: "paid".into(),
					operator_type: OperatorType::Customer,
					operator_id: Some("c1".into()),
					metadata: serde_json::json!({ "channel": "card" }),
				})
				.await
				.unwrap();
		}

		let rows = storage.list_by_order("t1", "o1").await.unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].order_id, "o1");
		assert_eq!(rows[0].metadata["channel"], "card");

		assert!(storage.list_by_order("t2", "o1").await.unwrap().is_empty());
	}
}
