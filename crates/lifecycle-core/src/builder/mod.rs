//! Builder pattern for constructing lifecycle engines.
//!
//! Storage backends are pluggable: the builder receives a map of factory
//! functions keyed by implementation name and instantiates every backend the
//! configuration lists, then wires the primary one into all components.

use crate::batch::BatchCoordinator;
use crate::engine::{controller::ScannerController, event_bus::EventBus, LifecycleEngine};
use crate::history::HistoryLedger;
use crate::state::OrderStateMachine;
use crate::timeout::{TimeoutPolicyResolver, TimeoutPolicyService, TimeoutScanner};
use lifecycle_config::Config;
use lifecycle_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions needed to build a [`LifecycleEngine`].
pub struct LifecycleFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builder for constructing a LifecycleEngine with pluggable storage.
pub struct LifecycleBuilder {
	config: Config,
	event_capacity: usize,
}

impl LifecycleBuilder {
	/// Creates a new LifecycleBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			event_capacity: 1000,
		}
	}

	/// Overrides how many events the bus buffers per slow subscriber.
	pub fn with_event_capacity(mut self, capacity: usize) -> Self {
		self.event_capacity = capacity;
		self
	}

	/// Builds the engine, creating storage through the matching factories.
	pub fn build<SF>(self, factories: LifecycleFactories<SF>) -> Result<LifecycleEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			let Some(factory) = factories.storage_factories.get(name) else {
				tracing::warn!(
					component = "storage",
					implementation = %name,
					"No factory registered, skipping"
				);
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					let is_primary = &self.config.storage.primary == name;
					tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					storage_impls.insert(name.clone(), implementation);
				},
				Err(e) => {
					tracing::error!(
						component = "storage",
						implementation = %name,
						error = %e,
						"Failed to create storage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create storage implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		if storage_impls.is_empty() {
			return Err(BuilderError::Config(
				"No valid storage implementations available".into(),
			));
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary storage '{}' failed to load or has no factory",
				primary_storage
			))
		})?;

		Ok(self.with_storage(Arc::new(StorageService::new(storage_backend))))
	}

	/// Wires every component around an already constructed storage service.
	pub fn with_storage(self, storage: Arc<StorageService>) -> LifecycleEngine {
		let event_bus = EventBus::new(self.event_capacity);

		let state_machine = Arc::new(OrderStateMachine::new(storage.clone(), event_bus.clone()));
		let batch = Arc::new(BatchCoordinator::new(state_machine.clone()));
		let ledger = Arc::new(HistoryLedger::new(storage.clone(), storage.clone()));

		let resolver = Arc::new(TimeoutPolicyResolver::new(
			storage.clone(),
			self.config.timeouts.fallback_policy(),
		));
		let policies = Arc::new(TimeoutPolicyService::new(storage.clone(), resolver.clone()));

		let scanner = Arc::new(TimeoutScanner::new(
			storage.clone(),
			resolver,
			batch.clone(),
			event_bus.clone(),
			self.config.scanner.processing_timeout_action,
		));
		let controller = Arc::new(ScannerController::new(scanner, storage));

		tracing::info!(
			component = "scanner",
			processing_timeout_action = %self.config.scanner.processing_timeout_action,
			interval_seconds = self.config.scanner.interval_seconds,
			"Configured"
		);

		LifecycleEngine::new(
			self.config,
			state_machine,
			batch,
			ledger,
			policies,
			controller,
			event_bus,
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::state::TransitionRequest;
	use lifecycle_storage::get_all_implementations;
	use lifecycle_types::{NewOrder, OperatorType, OrderStatus, OrderTimeoutConfig};
	use tempfile::TempDir;

	fn config(primary: &str, storage_path: &std::path::Path) -> Config {
		format!(
			r#"
[service]
id = "lifecycle-test"

[storage]
primary = "{}"
[storage.implementations.memory]
[storage.implementations.file]
storage_path = "{}"

[scanner]
enabled = false
"#,
			primary,
			storage_path.display()
		)
		.parse()
		.unwrap()
	}

	fn factories() -> LifecycleFactories<lifecycle_storage::StorageFactory> {
		LifecycleFactories {
			storage_factories: get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	#[tokio::test]
	async fn test_engine_end_to_end_on_file_storage() {
		let temp_dir = TempDir::new().unwrap();
		let engine = LifecycleBuilder::new(config("file", temp_dir.path()))
			.build(factories())
			.unwrap();
		engine.initialize().await.unwrap();
		assert!(!engine.scanner().is_running().await);

		let order = engine
			.create_order(NewOrder::new("t1", "m1", "c1"))
			.await
			.unwrap();
		for to in [OrderStatus::Paid, OrderStatus::Processing] {
			engine
				.apply_transition(
					"t1",
					&order.id,
					&TransitionRequest::new(to, "progress", OperatorType::Merchant, Some("m1".into())),
				)
				.await
				.unwrap();
		}

		let history = engine.history("t1", &order.id).await.unwrap();
		assert_eq!(history.len(), 2);
		assert!(engine
			.verify_history_chain("t1", &order.id)
			.await
			.unwrap()
			.is_empty());

		engine
			.timeout_policies()
			.set(OrderTimeoutConfig::tenant_default("t1", 20, 24))
			.await
			.unwrap();
		let resolved = engine.timeout_policies().resolve("t1", "m1").await.unwrap();
		assert_eq!(resolved.payment_timeout_minutes, 20);

		let stats = engine.scanner().statistics("t1", None).await.unwrap();
		assert_eq!(stats.per_status_counts[&OrderStatus::Processing], 1);
	}

	#[test]
	fn test_missing_primary_factory() {
		let temp_dir = TempDir::new().unwrap();
		let empty: LifecycleFactories<lifecycle_storage::StorageFactory> = LifecycleFactories {
			storage_factories: HashMap::new(),
		};
		let result = LifecycleBuilder::new(config("memory", temp_dir.path())).build(empty);
		assert!(matches!(result, Err(BuilderError::Config(_))));

		let mut only_file = factories();
		only_file.storage_factories.remove("memory");
		let result = LifecycleBuilder::new(config("memory", temp_dir.path())).build(only_file);
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}
}
