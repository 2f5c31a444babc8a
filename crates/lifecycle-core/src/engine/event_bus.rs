//! Event bus for lifecycle notifications.
//!
//! A thin wrapper over a tokio broadcast channel. Publishing never blocks and
//! succeeds only when at least one subscriber is listening; callers that do not
//! care about delivery drop the result with `.ok()`.

use lifecycle_types::LifecycleEvent;
use tokio::sync::broadcast;

/// Broadcast bus carrying [`LifecycleEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
	/// Creates a bus that buffers up to `capacity` events per slow subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.sender.subscribe()
	}

	/// Sends an event to every current subscriber.
	pub fn publish(
		&self,
		event: LifecycleEvent,
	) -> Result<usize, broadcast::error::SendError<LifecycleEvent>> {
		self.sender.send(event)
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_publish_without_subscribers_is_harmless() {
		let bus = EventBus::new(4);
		let result = bus.publish(LifecycleEvent::ProcessingOverdue {
			tenant_id: "t1".into(),
			order_ids: vec!["o1".into()],
		});
		assert!(result.is_err());
		assert_eq!(bus.subscriber_count(), 0);
	}

	#[tokio::test]
	async fn test_every_subscriber_receives_events() {
		let bus = EventBus::new(4);
		let mut first = bus.subscribe();
		let mut second = bus.clone().subscribe();

		bus.publish(LifecycleEvent::OrdersTimedOut {
			tenant_id: "t1".into(),
			order_ids: vec!["o1".into()],
			reason: "payment timeout".into(),
		})
		.unwrap();

		for receiver in [&mut first, &mut second] {
			match receiver.recv().await.unwrap() {
				LifecycleEvent::OrdersTimedOut { order_ids, .. } => {
					assert_eq!(order_ids, vec!["o1"])
				},
				other => panic!("unexpected event {:?}", other),
			}
		}
	}
}
