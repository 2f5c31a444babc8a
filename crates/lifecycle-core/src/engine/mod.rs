//! The lifecycle engine facade.
//!
//! [`LifecycleEngine`] bundles the components a caller (an HTTP layer, an admin
//! CLI, the service binary) needs: manual transitions, batches, history, timeout
//! policy CRUD and the scanner controller.

pub mod controller;
pub mod event_bus;

use crate::batch::BatchCoordinator;
use crate::history::{ChainViolation, HistoryError, HistoryLedger};
use crate::state::{AppliedTransition, OrderStateError, OrderStateMachine, TransitionRequest};
use crate::timeout::TimeoutPolicyService;
use controller::ScannerController;
use event_bus::EventBus;
use lifecycle_config::Config;
use lifecycle_types::{BatchResult, NewOrder, Order, OrderStatusHistory};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while running the engine.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Entry point to the order status lifecycle.
#[derive(Clone)]
pub struct LifecycleEngine {
	/// Service configuration.
	config: Config,
	state_machine: Arc<OrderStateMachine>,
	batch: Arc<BatchCoordinator>,
	ledger: Arc<HistoryLedger>,
	policies: Arc<TimeoutPolicyService>,
	scanner: Arc<ScannerController>,
	/// Event bus for lifecycle notifications.
	event_bus: EventBus,
}

impl LifecycleEngine {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		config: Config,
		state_machine: Arc<OrderStateMachine>,
		batch: Arc<BatchCoordinator>,
		ledger: Arc<HistoryLedger>,
		policies: Arc<TimeoutPolicyService>,
		scanner: Arc<ScannerController>,
		event_bus: EventBus,
	) -> Self {
		Self {
			config,
			state_machine,
			batch,
			ledger,
			policies,
			scanner,
			event_bus,
		}
	}

	pub async fn create_order(&self, new_order: NewOrder) -> Result<Order, OrderStateError> {
		self.state_machine.create_order(new_order).await
	}

	pub async fn get_order(&self, tenant_id: &str, order_id: &str) -> Result<Order, OrderStateError> {
		self.state_machine.get_order(tenant_id, order_id).await
	}

	/// Applies one manual or administrative status change.
	pub async fn apply_transition(
		&self,
		tenant_id: &str,
		order_id: &str,
		request: &TransitionRequest,
	) -> Result<AppliedTransition, OrderStateError> {
		self.state_machine
			.apply_transition(tenant_id, order_id, request)
			.await
	}

	/// Applies one status change to many orders, reporting failures per order.
	pub async fn apply_batch(
		&self,
		tenant_id: &str,
		order_ids: &[String],
		request: &TransitionRequest,
	) -> BatchResult {
		self.batch.apply_batch(tenant_id, order_ids, request).await
	}

	pub async fn history(
		&self,
		tenant_id: &str,
		order_id: &str,
	) -> Result<Vec<OrderStatusHistory>, HistoryError> {
		self.ledger.list(tenant_id, order_id).await
	}

	pub async fn verify_history_chain(
		&self,
		tenant_id: &str,
		order_id: &str,
	) -> Result<Vec<ChainViolation>, HistoryError> {
		self.ledger.verify_chain(tenant_id, order_id).await
	}

	pub fn timeout_policies(&self) -> &TimeoutPolicyService {
		&self.policies
	}

	pub fn scanner(&self) -> &ScannerController {
		&self.scanner
	}

	/// Starts the periodic scanner if the configuration enables it.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(service_id = %self.config.service.id, "Initializing lifecycle engine");
		if !self.config.scanner.enabled {
			tracing::info!("Timeout scanner disabled by configuration");
			return Ok(());
		}
		self.scanner
			.start(self.config.scanner.interval())
			.await
			.map(|_| ())
			.map_err(|e| EngineError::Config(e.to_string()))
	}

	/// Stops background work. In-flight transitions complete first.
	pub async fn shutdown(&self) {
		tracing::info!("Shutting down lifecycle engine");
		self.scanner.stop().await;
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}
}
