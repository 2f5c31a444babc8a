//! Event types for lifecycle notifications.
//!
//! Events flow through the engine's event bus so that callers (notification
//! dispatchers, audit sinks) can react to status changes without the core
//! invoking them directly.

use crate::{OperatorType, OrderStatus, ScanReport};
use serde::{Deserialize, Serialize};

/// Events published by the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
	/// A transition was committed.
	StatusChanged {
		tenant_id: String,
		order_id: String,
		from: OrderStatus,
		to: OrderStatus,
		operator_type: OperatorType,
	},
	/// The timeout scanner cancelled idle orders.
	OrdersTimedOut {
		tenant_id: String,
		order_ids: Vec<String>,
		reason: String,
	},
	/// Processing orders exceeded their timeout under the alert policy.
	ProcessingOverdue {
		tenant_id: String,
		order_ids: Vec<String>,
	},
	/// A scan pass finished.
	ScanCompleted { report: ScanReport },
}
