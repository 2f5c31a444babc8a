//! History ledger access and chain verification.
//!
//! Rows are appended only by the state machine, in the same commit as the status
//! change they describe. This module reads them back and can prove that an
//! order's rows still form an unbroken chain ending at its current status.

use lifecycle_storage::{HistoryStore, OrderStore};
use lifecycle_types::{Order, OrderStatus, OrderStatusHistory};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while reading the ledger.
#[derive(Debug, Error)]
pub enum HistoryError {
	#[error("Order not found: {order_id} in tenant {tenant_id}")]
	OrderNotFound { tenant_id: String, order_id: String },
	#[error("Storage error: {0}")]
	Storage(String),
}

/// A break in an order's history chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainViolation {
	#[error("row {position} has sequence {found}, expected {expected}")]
	SequenceGap {
		position: usize,
		expected: u64,
		found: u64,
	},
	#[error("row {position} starts at {found}, previous row ended at {expected}")]
	Discontinuity {
		position: usize,
		expected: OrderStatus,
		found: OrderStatus,
	},
	#[error("history ends at {history}, order is {order}")]
	CurrentStatusMismatch {
		history: OrderStatus,
		order: OrderStatus,
	},
	#[error("order version {version} does not match {rows} history rows")]
	VersionMismatch { version: u64, rows: usize },
}

/// Read side of the append-only history ledger.
pub struct HistoryLedger {
	orders: Arc<dyn OrderStore>,
	history: Arc<dyn HistoryStore>,
}

impl HistoryLedger {
	pub fn new(orders: Arc<dyn OrderStore>, history: Arc<dyn HistoryStore>) -> Self {
		Self { orders, history }
	}

	/// Lists an order's rows, oldest first.
	pub async fn list(
		&self,
		tenant_id: &str,
		order_id: &str,
	) -> Result<Vec<OrderStatusHistory>, HistoryError> {
		self.history
			.list_by_order(tenant_id, order_id)
			.await
			.map_err(|e| HistoryError::Storage(e.to_string()))
	}

	/// Reads an order and its rows and checks the chain between them.
	///
	/// Returns every violation found; an empty list means the chain is intact.
	pub async fn verify_chain(
		&self,
		tenant_id: &str,
		order_id: &str,
	) -> Result<Vec<ChainViolation>, HistoryError> {
		let order = self
			.orders
			.get_order(tenant_id, order_id)
			.await
			.map_err(|e| HistoryError::Storage(e.to_string()))?
			.ok_or_else(|| HistoryError::OrderNotFound {
				tenant_id: tenant_id.to_string(),
				order_id: order_id.to_string(),
			})?;
		let rows = self.list(tenant_id, order_id).await?;

		let violations = check_chain(&order, &rows);
		if !violations.is_empty() {
			tracing::error!(
				tenant_id = %tenant_id,
				order_id = %order_id,
				violations = violations.len(),
				"History chain is broken"
			);
		}
		Ok(violations)
	}
}

/// Checks `rows` (oldest first) against the order they belong to.
pub fn check_chain(order: &Order, rows: &[OrderStatusHistory]) -> Vec<ChainViolation> {
	let mut violations = Vec::new();
	let mut previous = order.initial_status;

	for (position, row) in rows.iter().enumerate() {
		let expected = position as u64 + 1;
		if row.sequence != expected {
			violations.push(ChainViolation::SequenceGap {
				position,
				expected,
				found: row.sequence,
			});
		}
		if row.from_status != previous {
			violations.push(ChainViolation::Discontinuity {
				position,
				expected: previous,
				found: row.from_status,
			});
		}
		previous = row.to_status;
	}

	if previous != order.status {
		violations.push(ChainViolation::CurrentStatusMismatch {
			history: previous,
			order: order.status,
		});
	}
	if order.version != rows.len() as u64 {
		violations.push(ChainViolation::VersionMismatch {
			version: order.version,
			rows: rows.len(),
		});
	}
	violations
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::event_bus::EventBus;
	use crate::state::{OrderStateMachine, TransitionRequest};
	use crate::testing::{memory_store, seed_order};
	use lifecycle_types::OperatorType;

	#[tokio::test]
	async fn test_chain_is_continuous_after_full_lifecycle() {
		let store = memory_store();
		seed_order(&store, "t1", "o1", "m1", OrderStatus::Pending, 60).await;
		let machine = OrderStateMachine::new(store.clone(), EventBus::new(16));

		for to in [
			OrderStatus::Paid,
			OrderStatus::Processing,
			OrderStatus::Completed,
		] {
			machine
				.apply_transition(
					"t1",
					"o1",
					&TransitionRequest::new(to, "step", OperatorType::Merchant, Some("m1".into())),
				)
				.await
				.unwrap();
		}

		let ledger = HistoryLedger::new(store.clone(), store.clone());
		let rows = ledger.list("t1", "o1").await.unwrap();
		assert_eq!(rows.len(), 3);
		assert_eq!(rows[0].from_status, OrderStatus::Pending);
		for pair in rows.windows(2) {
			assert_eq!(pair[1].from_status, pair[0].to_status);
			assert!(pair[1].created_at >= pair[0].created_at);
		}
		assert!(ledger.verify_chain("t1", "o1").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_chain_starts_at_initial_status() {
		let store = memory_store();
		seed_order(&store, "t1", "o1", "m1", OrderStatus::Paid, 60).await;
		let machine = OrderStateMachine::new(store.clone(), EventBus::new(16));
		machine
			.apply_transition(
				"t1",
				"o1",
				&TransitionRequest::system(OrderStatus::Cancelled, "refund"),
			)
			.await
			.unwrap();

		let ledger = HistoryLedger::new(store.clone(), store);
		assert!(ledger.verify_chain("t1", "o1").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_unknown_order() {
		let store = memory_store();
		let ledger = HistoryLedger::new(store.clone(), store);
		assert!(matches!(
			ledger.verify_chain("t1", "missing").await,
			Err(HistoryError::OrderNotFound { .. })
		));
	}

	#[test]
	fn test_detects_broken_chain() {
		let now = chrono::Utc::now();
		let mut order = lifecycle_types::NewOrder::new("t1", "m1", "c1")
			.with_id("o1")
			.into_order(now);
		order.status = OrderStatus::Processing;
		order.version = 3;

		let row = |sequence, from, to| OrderStatusHistory {
			id: format!("h{}", sequence),
			tenant_id: "t1".into(),
			order_id: "o1".into(),
			sequence,
			from_status: from,
			to_status: to,
			reason: String::new(),
			operator_type: OperatorType::Admin,
			operator_id: None,
			metadata: serde_json::Value::Null,
			created_at: now,
		};
		let rows = vec![
			row(1, OrderStatus::Pending, OrderStatus::Paid),
			row(3, OrderStatus::Pending, OrderStatus::Cancelled),
		];

		let violations = check_chain(&order, &rows);
		assert!(violations.contains(&ChainViolation::SequenceGap {
			position: 1,
			expected: 2,
			found: 3
		}));
		assert!(violations.contains(&ChainViolation::Discontinuity {
			position: 1,
			expected: OrderStatus::Paid,
			found: OrderStatus::Pending
		}));
		assert!(violations.contains(&ChainViolation::CurrentStatusMismatch {
			history: OrderStatus::Cancelled,
			order: OrderStatus::Processing
		}));
		assert!(violations.contains(&ChainViolation::VersionMismatch {
			version: 3,
			rows: 2
		}));
	}
}
