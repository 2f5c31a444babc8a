//! State management for orders.
//!
//! The transition table is the single authority on which status changes are
//! legal. The state machine applies a change and its history row as one
//! conditional write.

pub mod order;
pub mod transitions;

pub use order::{AppliedTransition, OrderStateError, OrderStateMachine, TransitionRequest};
pub use transitions::{allowed_targets, is_valid_transition};
