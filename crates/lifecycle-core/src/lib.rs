//! Order status lifecycle engine.
//!
//! This crate holds the logic that decides how an order's status may change and
//! records every change:
//!
//! - [`state`]: the transition table and the executor that applies one change
//!   atomically
//! - [`history`]: read access and chain verification over the history ledger
//! - [`batch`]: applying one change to many orders with per-item failure reporting
//! - [`timeout`]: policy resolution, policy CRUD and the idle-order scanner
//! - [`engine`]: the scanner lifecycle controller, the event bus and the
//!   [`LifecycleEngine`] facade
//! - [`builder`]: assembling an engine from configuration and storage factories

pub mod batch;
pub mod builder;
pub mod engine;
pub mod history;
pub mod state;
pub mod timeout;

pub use batch::BatchCoordinator;
pub use builder::{BuilderError, LifecycleBuilder, LifecycleFactories};
pub use engine::controller::{ScannerController, ScannerStatistics};
pub use engine::event_bus::EventBus;
pub use engine::{EngineError, LifecycleEngine};
pub use history::{ChainViolation, HistoryError, HistoryLedger};
pub use state::{AppliedTransition, OrderStateError, OrderStateMachine, TransitionRequest};
pub use timeout::{
	ScannerError, TimeoutPolicyError, TimeoutPolicyResolver, TimeoutPolicyService, TimeoutScanner,
};

#[cfg(test)]
pub(crate) mod testing;
