//! Order state machine implementation.
//!
//! Applies one status change to one order. The order is read, the change is
//! checked against the transition table, and the new status is written together
//! with its history row, conditional on the order not having changed since the
//! read. A concurrent writer that wins the race makes this call fail with
//! [`OrderStateError::StatusChanged`] instead of overwriting the winner.

use super::transitions::is_valid_transition;
use crate::engine::event_bus::EventBus;
use chrono::Utc;
use lifecycle_storage::{OrderStore, StatusUpdate, StorageError};
use lifecycle_types::{
	truncate_id, LifecycleEvent, NewOrder, OperatorType, Order, OrderStatus, OrderStatusHistory,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order status changed concurrently: expected {expected}, found {actual}, cannot move to {to}")]
	StatusChanged {
		expected: OrderStatus,
		actual: OrderStatus,
		to: OrderStatus,
	},
	#[error("Order not found: {order_id} in tenant {tenant_id}")]
	OrderNotFound { tenant_id: String, order_id: String },
	#[error("Order already exists: {0}")]
	AlreadyExists(String),
	/// The order's identifiers cannot be stored.
	#[error("Invalid order: {0}")]
	InvalidOrder(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl OrderStateError {
	/// Whether this is a rejected transition rather than a lookup or storage failure.
	pub fn is_transition_error(&self) -> bool {
		matches!(
			self,
			OrderStateError::InvalidTransition { .. } | OrderStateError::StatusChanged { .. }
		)
	}

	/// The status the order was found in, when the failure observed one.
	pub fn observed_status(&self) -> Option<OrderStatus> {
		match self {
			OrderStateError::InvalidTransition { from, .. } => Some(*from),
			OrderStateError::StatusChanged { actual, .. } => Some(*actual),
			_ => None,
		}
	}
}

/// What to change an order to, and who is asking.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
	pub to: OrderStatus,
	pub reason: String,
	pub operator_type: OperatorType,
	/// Absent for system-initiated transitions.
	pub operator_id: Option<String>,
	pub metadata: serde_json::Value,
}

impl TransitionRequest {
	pub fn new(
		to: OrderStatus,
		reason: impl Into<String>,
		operator_type: OperatorType,
		operator_id: Option<String>,
	) -> Self {
		Self {
			to,
			reason: reason.into(),
			operator_type,
			operator_id,
			metadata: serde_json::Value::Null,
		}
	}

	/// A transition initiated by the system itself, with no operator id.
	pub fn system(to: OrderStatus, reason: impl Into<String>) -> Self {
		Self::new(to, reason, OperatorType::System, None)
	}

	pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
		self.metadata = metadata;
		self
	}
}

/// A committed transition: the order as written and the history row appended with it.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedTransition {
	pub order: Order,
	pub history: OrderStatusHistory,
}

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	orders: Arc<dyn OrderStore>,
	event_bus: EventBus,
}

impl OrderStateMachine {
	pub fn new(orders: Arc<dyn OrderStore>, event_bus: EventBus) -> Self {
		Self { orders, event_bus }
	}

	/// Registers a new order.
	pub async fn create_order(&self, new_order: NewOrder) -> Result<Order, OrderStateError> {
		let order = new_order.into_order(Utc::now());
		match self.orders.insert_order(&order).await {
			Ok(()) => {
				tracing::debug!(
					tenant_id = %order.tenant_id,
					order_id = %truncate_id(&order.id),
					status = %order.status,
					"Order created"
				);
				Ok(order)
			},
			Err(StorageError::PreconditionFailed(_)) => {
				Err(OrderStateError::AlreadyExists(order.id))
			},
			Err(StorageError::InvalidKey(msg)) => Err(OrderStateError::InvalidOrder(msg)),
			Err(e) => Err(OrderStateError::Storage(e.to_string())),
		}
	}

	/// Gets an order by ID
	pub async fn get_order(&self, tenant_id: &str, order_id: &str) -> Result<Order, OrderStateError> {
		self.orders
			.get_order(tenant_id, order_id)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?
			.ok_or_else(|| OrderStateError::OrderNotFound {
				tenant_id: tenant_id.to_string(),
				order_id: order_id.to_string(),
			})
	}

	/// Transitions an order to a new status with validation.
	///
	/// Nothing is written unless the transition is legal from the order's current
	/// status and the order is still in that status when the write lands.
	#[instrument(skip_all, fields(tenant_id = %tenant_id, order_id = %truncate_id(order_id), to = %request.to))]
	pub async fn apply_transition(
		&self,
		tenant_id: &str,
		order_id: &str,
		request: &TransitionRequest,
	) -> Result<AppliedTransition, OrderStateError> {
		let current = self.get_order(tenant_id, order_id).await?;

		if !is_valid_transition(current.status, request.to) {
			tracing::debug!(from = %current.status, "Rejected transition");
			return Err(OrderStateError::InvalidTransition {
				from: current.status,
				to: request.to,
			});
		}

		let update = StatusUpdate {
			tenant_id: tenant_id.to_string(),
			order_id: order_id.to_string(),
			from: current.status,
			expected_version: current.version,
			to: request.to,
			at: Utc::now(),
			reason: request.reason.clone(),
			operator_type: request.operator_type,
			operator_id: request.operator_id.clone(),
			metadata: request.metadata.clone(),
		};

		let (order, history) = match self.orders.update_status(update).await {
			Ok(written) => written,
			Err(StorageError::PreconditionFailed(_)) => {
				return Err(self.lost_race(tenant_id, order_id, &current, request.to).await);
			},
			Err(e) => {
				tracing::warn!(error = %e, "Failed to persist transition");
				return Err(OrderStateError::Storage(e.to_string()));
			},
		};

		tracing::info!(
			from = %history.from_status,
			operator_type = %history.operator_type,
			sequence = history.sequence,
			"Order status changed"
		);
		self.event_bus
			.publish(LifecycleEvent::StatusChanged {
				tenant_id: tenant_id.to_string(),
				order_id: order_id.to_string(),
				from: history.from_status,
				to: history.to_status,
				operator_type: history.operator_type,
			})
			.ok();

		Ok(AppliedTransition { order, history })
	}

	/// Builds the error reported to the loser of a concurrent update.
	async fn lost_race(
		&self,
		tenant_id: &str,
		order_id: &str,
		seen: &Order,
		to: OrderStatus,
	) -> OrderStateError {
		match self.get_order(tenant_id, order_id).await {
			Ok(actual) => {
				tracing::info!(
					expected = %seen.status,
					actual = %actual.status,
					"Order changed before the transition was written"
				);
				OrderStateError::StatusChanged {
					expected: seen.status,
					actual: actual.status,
					to,
				}
			},
			Err(e) => e,
		}
	}
}
