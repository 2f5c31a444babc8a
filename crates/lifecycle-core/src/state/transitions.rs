//! The order status transition table.

use lifecycle_types::OrderStatus;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Static transition table - each state maps to allowed next states.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		OrderStatus::Pending,
		HashSet::from([OrderStatus::Paid, OrderStatus::Cancelled]),
	);
	m.insert(
		OrderStatus::Paid,
		HashSet::from([OrderStatus::Processing, OrderStatus::Cancelled]),
	);
	m.insert(
		OrderStatus::Processing,
		HashSet::from([OrderStatus::Completed, OrderStatus::Cancelled]),
	);
	m.insert(OrderStatus::Completed, HashSet::new()); // terminal
	m.insert(OrderStatus::Cancelled, HashSet::new()); // terminal
	m
});

/// Checks if a state transition is valid. Self-transitions never are.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
	TRANSITIONS
		.get(&from)
		.is_some_and(|targets| targets.contains(&to))
}

/// Statuses reachable from `from` in one step, in canonical order.
pub fn allowed_targets(from: OrderStatus) -> Vec<OrderStatus> {
	OrderStatus::ALL
		.into_iter()
		.filter(|to| is_valid_transition(from, *to))
		.collect()
}
