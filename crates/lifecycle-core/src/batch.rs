//! Batch transition coordinator.
//!
//! Drives the state machine over a list of order ids. Every order is its own
//! atomic unit: a failure is recorded against that order and the batch moves
//! on, so one bad id never blocks the rest.

use crate::state::{OrderStateMachine, TransitionRequest};
use lifecycle_types::{truncate_id, BatchFailure, BatchResult};
use std::sync::Arc;
use tracing::instrument;

/// Applies one transition to many orders with per-item failure reporting.
pub struct BatchCoordinator {
	state_machine: Arc<OrderStateMachine>,
}

impl BatchCoordinator {
	pub fn new(state_machine: Arc<OrderStateMachine>) -> Self {
		Self { state_machine }
	}

	/// Applies `request` to every id in order.
	///
	/// Never fails as a whole. `success_count + failures.len()` equals the number of
	/// ids, and failures are reported in input order.
	#[instrument(skip_all, fields(tenant_id = %tenant_id, to = %request.to, count = order_ids.len()))]
	pub async fn apply_batch(
		&self,
		tenant_id: &str,
		order_ids: &[String],
		request: &TransitionRequest,
	) -> BatchResult {
		let mut result = BatchResult::default();

		for order_id in order_ids {
			match self
				.state_machine
				.apply_transition(tenant_id, order_id, request)
				.await
			{
				Ok(_) => {
					result.success_count += 1;
					result.succeeded.push(order_id.clone());
				},
				Err(e) => {
					tracing::debug!(
						order_id = %truncate_id(order_id),
						error = %e,
						"Batch item failed"
					);
					result.failures.push(BatchFailure {
						order_id: order_id.clone(),
						from_status: e.observed_status(),
						to_status: request.to,
						message: e.to_string(),
					});
				},
			}
		}

		if result.failures.is_empty() {
			tracing::info!(succeeded = result.success_count, "Batch applied");
		} else {
			tracing::warn!(
				succeeded = result.success_count,
				failed = result.failures.len(),
				"Batch applied with failures"
			);
		}
		result
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::event_bus::EventBus;
	use crate::testing::{memory_store, seed_order};
	use lifecycle_storage::OrderStore;
	use lifecycle_types::{OperatorType, OrderStatus};

	#[tokio::test]
	async fn test_partial_failure_reports_only_bad_items() {
		let store = memory_store();
		for (id, status) in [
			("o1", OrderStatus::Pending),
			("o2", OrderStatus::Completed),
			("o3", OrderStatus::Paid),
			("o4", OrderStatus::Cancelled),
			("o5", OrderStatus::Processing),
		] {
			seed_order(&store, "t1", id, "m1", status, 5).await;
		}
		let machine = Arc::new(OrderStateMachine::new(store.clone(), EventBus::new(16)));
		let coordinator = BatchCoordinator::new(machine);

		let ids: Vec<String> = ["o1", "o2", "o3", "o4", "o5"]
			.iter()
			.map(|s| s.to_string())
			.collect();
		let request = TransitionRequest::new(
			OrderStatus::Cancelled,
			"bulk cancel",
			OperatorType::Merchant,
			Some("merchant-1".into()),
		);
		let result = coordinator.apply_batch("t1", &ids, &request).await;

		assert_eq!(result.success_count, 3);
		assert_eq!(result.total(), ids.len());
		assert_eq!(result.succeeded, vec!["o1", "o3", "o5"]);
		let failed: Vec<_> = result.failures.iter().map(|f| f.order_id.as_str()).collect();
		assert_eq!(failed, vec!["o2", "o4"]);
		assert_eq!(result.failures[0].from_status, Some(OrderStatus::Completed));
		assert_eq!(result.failures[1].from_status, Some(OrderStatus::Cancelled));
		assert!(result.failures[0].message.contains("completed"));

		for id in ["o1", "o3", "o5"] {
			let order = store.get_order("t1", id).await.unwrap().unwrap();
			assert_eq!(order.status, OrderStatus::Cancelled);
		}
	}

	#[tokio::test]
	async fn test_missing_orders_are_failures_not_errors() {
		let store = memory_store();
		seed_order(&store, "t1", "o1", "m1", OrderStatus::Pending, 5).await;
		let machine = Arc::new(OrderStateMachine::new(store, EventBus::new(16)));
		let coordinator = BatchCoordinator::new(machine);

		let ids = vec!["ghost".to_string(), "o1".to_string(), "o1".to_string()];
		let result = coordinator
			.apply_batch(
				"t1",
				&ids,
				&TransitionRequest::system(OrderStatus::Paid, "settled"),
			)
			.await;

		assert_eq!(result.success_count, 1);
		assert_eq!(result.failures.len(), 2);
		assert_eq!(result.failures[0].order_id, "ghost");
		assert_eq!(result.failures[0].from_status, None);
		assert_eq!(result.failures[1].from_status, Some(OrderStatus::Paid));
	}

	#[tokio::test]
	async fn test_empty_batch() {
		let machine = Arc::new(OrderStateMachine::new(memory_store(), EventBus::new(16)));
		let result = BatchCoordinator::new(machine)
			.apply_batch(
				"t1",
				&[],
				&TransitionRequest::system(OrderStatus::Cancelled, "noop"),
			)
			.await;
		assert_eq!(result, BatchResult::default());
	}
}
