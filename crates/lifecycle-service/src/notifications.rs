//! Notification listener.
//!
//! Consumes lifecycle events and logs the customer and operator notifications
//! they call for. Delivery channels (mail, push, webhooks) plug in here; the
//! engine itself never sends notifications.

use lifecycle_types::{truncate_id, LifecycleEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Spawns a task that handles events until the bus is closed.
pub fn spawn_listener(mut events: broadcast::Receiver<LifecycleEvent>) -> JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			match events.recv().await {
				Ok(event) => {
					if let Some(notice) = notification_for(&event) {
						tracing::info!(target: "notifications", "{}", notice);
					}
				},
				Err(RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "Notification listener fell behind");
				},
				Err(RecvError::Closed) => break,
			}
		}
	})
}

/// The notification an event calls for, if any.
pub fn notification_for(event: &LifecycleEvent) -> Option<String> {
	match event {
		LifecycleEvent::OrdersTimedOut {
			tenant_id,
			order_ids,
			reason,
		} => Some(format!(
			"tenant {}: {} order(s) cancelled ({}): {}",
			tenant_id,
			order_ids.len(),
			reason,
			join_ids(order_ids)
		)),
		LifecycleEvent::ProcessingOverdue {
			tenant_id,
			order_ids,
		} => Some(format!(
			"tenant {}: {} order(s) overdue in processing: {}",
			tenant_id,
			order_ids.len(),
			join_ids(order_ids)
		)),
		LifecycleEvent::StatusChanged {
			tenant_id,
			order_id,
			from,
			to,
			operator_type,
		} => {
			tracing::debug!(
				tenant_id = %tenant_id,
				order_id = %truncate_id(order_id),
				%from,
				%to,
				%operator_type,
				"Status changed"
			);
			None
		},
		LifecycleEvent::ScanCompleted { .. } => None,
	}
}

fn join_ids(ids: &[String]) -> String {
	ids.iter()
		.map(|id| truncate_id(id))
		.collect::<Vec<_>>()
		.join(", ")
}

#[cfg(test)]
mod tests {
	use super::*;
	use lifecycle_types::{OperatorType, OrderStatus, ScanReport};

	#[test]
	fn test_timeouts_produce_notifications() {
		let notice = notification_for(&LifecycleEvent::OrdersTimedOut {
			tenant_id: "t1".into(),
			order_ids: vec!["o1".into(), "a-very-long-order-id".into()],
			reason: "payment timeout".into(),
		})
		.unwrap();
		assert_eq!(
			notice,
			"tenant t1: 2 order(s) cancelled (payment timeout): o1, a-very-l.."
		);

		let notice = notification_for(&LifecycleEvent::ProcessingOverdue {
			tenant_id: "t1".into(),
			order_ids: vec!["o9".into()],
		})
		.unwrap();
		assert!(notice.contains("overdue in processing: o9"));
	}

	#[test]
	fn test_other_events_are_silent() {
		assert!(notification_for(&LifecycleEvent::StatusChanged {
			tenant_id: "t1".into(),
			order_id: "o1".into(),
			from: OrderStatus::Pending,
			to: OrderStatus::Paid,
			operator_type: OperatorType::Customer,
		})
		.is_none());
		assert!(notification_for(&LifecycleEvent::ScanCompleted {
			report: ScanReport::new(chrono::Utc::now()),
		})
		.is_none());
	}

	#[tokio::test]
	async fn test_listener_exits_when_bus_closes() {
		let (sender, receiver) = broadcast::channel(8);
		let handle = spawn_listener(receiver);
		sender
			.send(LifecycleEvent::ProcessingOverdue {
				tenant_id: "t1".into(),
				order_ids: vec!["o1".into()],
			})
			.unwrap();
		drop(sender);
		handle.await.unwrap();
	}
}
