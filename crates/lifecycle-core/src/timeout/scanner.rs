//! Timeout scanner.
//!
//! Finds orders idle past their resolved timeout and routes them through the
//! batch coordinator, so automatic cancellations obey the same transition table
//! and history rules as manual ones. A scan never writes status directly.
//!
//! Re-running a scan is safe: a cancelled order no longer matches the idle query.

use crate::batch::BatchCoordinator;
use crate::engine::event_bus::EventBus;
use crate::state::TransitionRequest;
use crate::timeout::policy::TimeoutPolicyResolver;
use chrono::{DateTime, Duration, Utc};
use lifecycle_storage::{IdleQuery, OrderStore};
use lifecycle_types::{
	LifecycleEvent, OrderStatus, ProcessingTimeoutAction, ResolvedTimeoutPolicy, ScanReport,
	TimeoutCandidate, TimeoutKind,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

/// Errors that can occur during a scan.
#[derive(Debug, Error)]
pub enum ScannerError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Policy error: {0}")]
	Policy(String),
	#[error("Invalid scan interval: {0}")]
	InvalidInterval(String),
}

fn watched_status(kind: TimeoutKind) -> OrderStatus {
	match kind {
		TimeoutKind::Payment => OrderStatus::Pending,
		TimeoutKind::Processing => OrderStatus::Processing,
	}
}

fn timeout_window(kind: TimeoutKind, policy: &ResolvedTimeoutPolicy) -> Duration {
	match kind {
		TimeoutKind::Payment => policy.payment_timeout(),
		TimeoutKind::Processing => policy.processing_timeout(),
	}
}

/// Periodic idle-order detection and resolution.
pub struct TimeoutScanner {
	orders: Arc<dyn OrderStore>,
	resolver: Arc<TimeoutPolicyResolver>,
	batch: Arc<BatchCoordinator>,
	event_bus: EventBus,
	processing_action: ProcessingTimeoutAction,
	/// Processing orders already alerted, per tenant.
	alerted: Mutex<HashMap<String, HashSet<String>>>,
}

impl TimeoutScanner {
	pub fn new(
		orders: Arc<dyn OrderStore>,
		resolver: Arc<TimeoutPolicyResolver>,
		batch: Arc<BatchCoordinator>,
		event_bus: EventBus,
		processing_action: ProcessingTimeoutAction,
	) -> Self {
		Self {
			orders,
			resolver,
			batch,
			event_bus,
			processing_action,
			alerted: Mutex::new(HashMap::new()),
		}
	}

	pub fn processing_action(&self) -> ProcessingTimeoutAction {
		self.processing_action
	}

	/// Returns every order eligible for timeout action as of `now`, across tenants.
	///
	/// Tenants whose policies or orders cannot be read are logged and skipped.
	pub async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<TimeoutCandidate>, ScannerError> {
		let mut candidates = Vec::new();
		for tenant_id in self.tenants().await? {
			match self.scan_tenant(&tenant_id, now).await {
				Ok(found) => candidates.extend(found),
				Err(e) => {
					tracing::warn!(tenant_id = %tenant_id, error = %e, "Skipping tenant")
				},
			}
		}
		Ok(candidates)
	}

	/// Returns the eligible orders of one tenant, payment timeouts first.
	#[instrument(skip_all, fields(tenant_id = %tenant_id))]
	pub async fn scan_tenant(
		&self,
		tenant_id: &str,
		now: DateTime<Utc>,
	) -> Result<Vec<TimeoutCandidate>, ScannerError> {
		let floor = self
			.resolver
			.tenant_floor(tenant_id)
			.await
			.map_err(|e| ScannerError::Policy(e.to_string()))?;

		let mut policies: HashMap<String, Option<ResolvedTimeoutPolicy>> = HashMap::new();
		let mut candidates = Vec::new();

		for kind in [TimeoutKind::Payment, TimeoutKind::Processing] {
			let query = IdleQuery {
				tenant_id: tenant_id.to_string(),
				merchant_id: None,
				statuses: vec![watched_status(kind)],
				older_than: now - timeout_window(kind, &floor),
			};
			let idle = self
				.orders
				.list_idle(&query)
				.await
				.map_err(|e| ScannerError::Storage(e.to_string()))?;

			for order in idle {
				let policy = match policies.get(&order.merchant_id) {
					Some(policy) => *policy,
					None => {
						let policy = match self.resolver.resolve(tenant_id, &order.merchant_id).await {
							Ok(policy) => Some(policy),
							Err(e) => {
								tracing::warn!(
									merchant_id = %order.merchant_id,
									error = %e,
									"Skipping merchant, policy resolution failed"
								);
								None
							},
						};
						policies.insert(order.merchant_id.clone(), policy);
						policy
					},
				};
				let Some(policy) = policy else {
					continue;
				};

				if order.idle_for(now) >= timeout_window(kind, &policy) {
					candidates.push(TimeoutCandidate {
						tenant_id: tenant_id.to_string(),
						merchant_id: order.merchant_id,
						order_id: order.id,
						kind,
					});
				}
			}
		}

		tracing::debug!(candidates = candidates.len(), "Tenant scanned");
		Ok(candidates)
	}

	/// Scans every tenant and resolves what it finds.
	///
	/// Fails only when the tenant list itself cannot be read. Per-tenant failures
	/// are recorded in the report and the pass continues.
	#[instrument(skip_all)]
	pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<ScanReport, ScannerError> {
		let mut report = ScanReport::new(Utc::now());

		for tenant_id in self.tenants().await? {
			report.tenants_scanned += 1;
			let candidates = match self.scan_tenant(&tenant_id, now).await {
				Ok(candidates) => candidates,
				Err(e) => {
					tracing::error!(tenant_id = %tenant_id, error = %e, "Tenant scan failed");
					report.tenants_failed.push(tenant_id);
					continue;
				},
			};
			report.candidates += candidates.len();

			let (payment, processing): (Vec<_>, Vec<_>) = candidates
				.into_iter()
				.partition(|c| c.kind == TimeoutKind::Payment);

			let payment_ids: Vec<String> = payment.into_iter().map(|c| c.order_id).collect();
			report
				.payment_timeouts
				.merge(self.cancel(&tenant_id, &payment_ids, TimeoutKind::Payment).await);

			let processing_ids: Vec<String> = processing.into_iter().map(|c| c.order_id).collect();
			match self.processing_action {
				ProcessingTimeoutAction::Cancel => {
					report.processing_timeouts.merge(
						self.cancel(&tenant_id, &processing_ids, TimeoutKind::Processing)
							.await,
					);
				},
				ProcessingTimeoutAction::Alert => {
					report.alerted += self.alert(&tenant_id, processing_ids).await;
				},
			}
		}

		report.finished_at = Utc::now();
		tracing::info!(
			tenants = report.tenants_scanned,
			failed_tenants = report.tenants_failed.len(),
			candidates = report.candidates,
			transitioned = report.transitioned(),
			failed = report.failed(),
			alerted = report.alerted,
			"Scan pass completed"
		);
		self.event_bus
			.publish(LifecycleEvent::ScanCompleted {
				report: report.clone(),
			})
			.ok();
		Ok(report)
	}

	/// Counts orders currently overdue for payment and for processing.
	pub async fn overdue_counts(
		&self,
		tenant_id: &str,
		merchant_id: Option<&str>,
		now: DateTime<Utc>,
	) -> Result<(u64, u64), ScannerError> {
		let candidates = self.scan_tenant(tenant_id, now).await?;
		let relevant = candidates
			.iter()
			.filter(|c| merchant_id.map_or(true, |m| c.merchant_id == m));

		let (mut payment, mut processing) = (0, 0);
		for candidate in relevant {
			match candidate.kind {
				TimeoutKind::Payment => payment += 1,
				TimeoutKind::Processing => processing += 1,
			}
		}
		Ok((payment, processing))
	}

	async fn tenants(&self) -> Result<Vec<String>, ScannerError> {
		self.orders
			.list_tenants()
			.await
			.map_err(|e| ScannerError::Storage(e.to_string()))
	}

	async fn cancel(
		&self,
		tenant_id: &str,
		order_ids: &[String],
		kind: TimeoutKind,
	) -> lifecycle_types::BatchResult {
		if order_ids.is_empty() {
			return Default::default();
		}

		let request = TransitionRequest::system(OrderStatus::Cancelled, kind.reason());
		let result = self.batch.apply_batch(tenant_id, order_ids, &request).await;
		if !result.succeeded.is_empty() {
			self.event_bus
				.publish(LifecycleEvent::OrdersTimedOut {
					tenant_id: tenant_id.to_string(),
					order_ids: result.succeeded.clone(),
					reason: kind.reason().to_string(),
				})
				.ok();
		}
		result
	}

	/// Publishes overdue processing orders not alerted before. Returns how many.
	async fn alert(&self, tenant_id: &str, overdue: Vec<String>) -> usize {
		let fresh: Vec<String> = {
			let mut alerted = self.alerted.lock().await;
			let seen = alerted.entry(tenant_id.to_string()).or_default();
			let current: HashSet<&String> = overdue.iter().collect();
			seen.retain(|id| current.contains(id));
			overdue
				.iter()
				.filter(|id| seen.insert((*id).clone()))
				.cloned()
				.collect()
		};
		if fresh.is_empty() {
			return 0;
		}

		tracing::warn!(
			tenant_id = %tenant_id,
			orders = fresh.len(),
			"Orders overdue in processing"
		);
		let count = fresh.len();
		self.event_bus
			.publish(LifecycleEvent::ProcessingOverdue {
				tenant_id: tenant_id.to_string(),
				order_ids: fresh,
			})
			.ok();
		count
	}
}
