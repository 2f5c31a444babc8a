//! Order records and their status history.
//!
//! An [`Order`] is owned by its tenant. Every successful status change produces
//! exactly one [`OrderStatusHistory`] row, numbered by the order's `version`
//! after the change, so the history of one order forms an unbroken chain.

use crate::{OperatorType, OrderStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A commerce order as seen by the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier within the tenant.
	pub id: String,
	/// Tenant that owns this order.
	pub tenant_id: String,
	/// Merchant selling the order.
	pub merchant_id: String,
	/// Customer who placed the order.
	pub customer_id: String,
	/// Current status of the order.
	pub status: OrderStatus,
	/// Status the order was created in; the first history row starts here.
	pub initial_status: OrderStatus,
	/// Timestamp when this order was created.
	pub created_at: DateTime<Utc>,
	/// Timestamp of the most recent status change.
	pub status_updated_at: DateTime<Utc>,
	/// Number of successful transitions applied so far.
	#[serde(default)]
	pub version: u64,
}

impl Order {
	/// Time elapsed since the last status change, clamped at zero.
	pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
		let idle = now - self.status_updated_at;
		if idle < chrono::Duration::zero() {
			chrono::Duration::zero()
		} else {
			idle
		}
	}
}

/// Parameters for registering a new order with the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
	/// Explicit order id; a UUID v4 is generated when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub tenant_id: String,
	pub merchant_id: String,
	pub customer_id: String,
	/// Initial status, `Pending` unless stated otherwise.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub initial_status: Option<OrderStatus>,
}

impl NewOrder {
	pub fn new(
		tenant_id: impl Into<String>,
		merchant_id: impl Into<String>,
		customer_id: impl Into<String>,
	) -> Self {
		Self {
			id: None,
			tenant_id: tenant_id.into(),
			merchant_id: merchant_id.into(),
			customer_id: customer_id.into(),
			initial_status: None,
		}
	}

	pub fn with_id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());
		self
	}

	pub fn with_initial_status(mut self, status: OrderStatus) -> Self {
		self.initial_status = Some(status);
		self
	}

	/// Materializes the order as of `now`.
	pub fn into_order(self, now: DateTime<Utc>) -> Order {
		let status = self.initial_status.unwrap_or(OrderStatus::Pending);
		Order {
			id: self
				.id
				.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
			tenant_id: self.tenant_id,
			merchant_id: self.merchant_id,
			customer_id: self.customer_id,
			status,
			initial_status: status,
			created_at: now,
			status_updated_at: now,
			version: 0,
		}
	}
}

/// One append-only record of a status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusHistory {
	/// Unique identifier of this row.
	pub id: String,
	pub tenant_id: String,
	pub order_id: String,
	/// Position in the order's chain, starting at 1.
	pub sequence: u64,
	pub from_status: OrderStatus,
	pub to_status: OrderStatus,
	/// Free-text reason supplied by the operator.
	pub reason: String,
	pub operator_type: OperatorType,
	/// Absent for system-initiated transitions.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub operator_id: Option<String>,
	/// Opaque structured payload.
	#[serde(default)]
	pub metadata: serde_json::Value,
	pub created_at: DateTime<Utc>,
}
