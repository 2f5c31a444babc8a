//! Results of applying one status change to many orders.

use crate::OrderStatus;
use serde::{Deserialize, Serialize};

/// A single order that could not be transitioned within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
	pub order_id: String,
	/// Status observed for the order, when it could be read.
	pub from_status: Option<OrderStatus>,
	pub to_status: OrderStatus,
	pub message: String,
}

/// Aggregate outcome of a batch transition.
///
/// `success_count + failures.len()` always equals the number of ids submitted,
/// and failures keep the order of the input list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
	pub success_count: usize,
	/// Ids that transitioned, in input order.
	pub succeeded: Vec<String>,
	pub failures: Vec<BatchFailure>,
}

impl BatchResult {
	pub fn total(&self) -> usize {
		self.success_count + self.failures.len()
	}

	pub fn is_complete_success(&self) -> bool {
		self.failures.is_empty()
	}

	/// Folds another batch into this one, keeping input order.
	pub fn merge(&mut self, other: BatchResult) {
		self.success_count += other.success_count;
		self.succeeded.extend(other.succeeded);
		self.failures.extend(other.failures);
	}
}
