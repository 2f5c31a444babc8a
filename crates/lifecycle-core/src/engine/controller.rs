//! Scanner lifecycle controller.
//!
//! Owns the periodic timeout scan. At most one loop runs per controller:
//! starting a running controller does nothing, and stopping waits for the loop
//! to exit. A pass already in flight always finishes before the loop observes
//! the stop signal, so no order is left half-processed. The loop slot stays
//! locked until the old loop has exited, so a start racing a stop waits for it.

use crate::timeout::scanner::{ScannerError, TimeoutScanner};
use chrono::{DateTime, Utc};
use lifecycle_storage::OrderStore;
use lifecycle_types::{OrderStatus, ScanReport};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Aggregate scanner counters plus a point-in-time view of one tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannerStatistics {
	pub running: bool,
	/// Interval of the running loop, if any.
	pub interval: Option<Duration>,
	/// Passes completed since the controller was created.
	pub passes: u64,
	/// Orders that matched the idle predicate, summed over passes.
	pub scanned: u64,
	/// Orders moved by the scanner, summed over passes.
	pub transitioned: u64,
	/// Orders the scanner tried and failed to move, summed over passes.
	pub failed: u64,
	pub last_run_at: Option<DateTime<Utc>>,
	pub last_report: Option<ScanReport>,
	/// Message of the last pass that could not run at all.
	pub last_error: Option<String>,
	pub per_status_counts: BTreeMap<OrderStatus, u64>,
	pub overdue_pending: u64,
	pub overdue_processing: u64,
}

#[derive(Debug, Default)]
struct Totals {
	passes: u64,
	scanned: u64,
	transitioned: u64,
	failed: u64,
	last_run_at: Option<DateTime<Utc>>,
	last_report: Option<ScanReport>,
	last_error: Option<String>,
}

impl Totals {
	fn record(&mut self, outcome: &Result<ScanReport, ScannerError>) {
		match outcome {
			Ok(report) => {
				self.passes += 1;
				self.scanned += report.candidates as u64;
				self.transitioned += report.transitioned() as u64;
				self.failed += report.failed() as u64;
				self.last_run_at = Some(report.finished_at);
				self.last_report = Some(report.clone());
				self.last_error = None;
			},
			Err(e) => {
				self.last_run_at = Some(Utc::now());
				self.last_error = Some(e.to_string());
			},
		}
	}
}

struct RunningLoop {
	interval: Duration,
	shutdown: watch::Sender<bool>,
	handle: JoinHandle<()>,
}

/// Starts, stops and reports on the periodic timeout scan.
pub struct ScannerController {
	scanner: Arc<TimeoutScanner>,
	orders: Arc<dyn OrderStore>,
	running: Mutex<Option<RunningLoop>>,
	totals: Arc<RwLock<Totals>>,
}

impl ScannerController {
	pub fn new(scanner: Arc<TimeoutScanner>, orders: Arc<dyn OrderStore>) -> Self {
		Self {
			scanner,
			orders,
			running: Mutex::new(None),
			totals: Arc::new(RwLock::new(Totals::default())),
		}
	}

	/// Starts the periodic loop. Returns `false` if it was already running.
	///
	/// The first pass runs immediately.
	pub async fn start(&self, interval: Duration) -> Result<bool, ScannerError> {
		if interval.is_zero() {
			return Err(ScannerError::InvalidInterval(
				"interval must be greater than zero".into(),
			));
		}

		let mut running = self.running.lock().await;
		if let Some(current) = running.as_ref() {
			if !current.handle.is_finished() {
				tracing::debug!("Timeout scanner already running");
				return Ok(false);
			}
		}

		let (shutdown, shutdown_rx) = watch::channel(false);
		let handle = tokio::spawn(run_loop(
			self.scanner.clone(),
			self.totals.clone(),
			interval,
			shutdown_rx,
		));
		*running = Some(RunningLoop {
			interval,
			shutdown,
			handle,
		});

		tracing::info!(interval_seconds = interval.as_secs_f64(), "Timeout scanner started");
		Ok(true)
	}

	/// Stops the loop and waits for it to exit. Returns `false` if it was not running.
	pub async fn stop(&self) -> bool {
		let mut running = self.running.lock().await;
		let Some(current) = running.take() else {
			return false;
		};

		current.shutdown.send(true).ok();
		if let Err(e) = current.handle.await {
			tracing::error!(error = %e, "Timeout scanner task ended abnormally");
		}
		tracing::info!("Timeout scanner stopped");
		drop(running);
		true
	}

	pub async fn is_running(&self) -> bool {
		self.running
			.lock()
			.await
			.as_ref()
			.is_some_and(|current| !current.handle.is_finished())
	}

	/// Runs one scan-and-transition pass now, independent of the loop.
	pub async fn run_once(&self) -> Result<ScanReport, ScannerError> {
		let outcome = self.scanner.run_pass(Utc::now()).await;
		self.totals.write().await.record(&outcome);
		outcome
	}

	/// Reports scanner counters and the current state of one tenant.
	pub async fn statistics(
		&self,
		tenant_id: &str,
		merchant_id: Option<&str>,
	) -> Result<ScannerStatistics, ScannerError> {
		let per_status_counts = self
			.orders
			.count_by_status(tenant_id, merchant_id)
			.await
			.map_err(|e| ScannerError::Storage(e.to_string()))?;
		let (overdue_pending, overdue_processing) = self
			.scanner
			.overdue_counts(tenant_id, merchant_id, Utc::now())
			.await?;

		let interval = {
			let running = self.running.lock().await;
			running
				.as_ref()
				.filter(|current| !current.handle.is_finished())
				.map(|current| current.interval)
		};
		let totals = self.totals.read().await;

		Ok(ScannerStatistics {
			running: interval.is_some(),
			interval,
			passes: totals.passes,
			scanned: totals.scanned,
			transitioned: totals.transitioned,
			failed: totals.failed,
			last_run_at: totals.last_run_at,
			last_report: totals.last_report.clone(),
			last_error: totals.last_error.clone(),
			per_status_counts,
			overdue_pending,
			overdue_processing,
		})
	}
}

async fn run_loop(
	scanner: Arc<TimeoutScanner>,
	totals: Arc<RwLock<Totals>>,
	interval: Duration,
	mut shutdown: watch::Receiver<bool>,
) {
	let mut ticker = tokio::time::interval(interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			biased;
			_ = shutdown.changed() => break,
			_ = ticker.tick() => {},
		}

		// Runs outside the select so a stop request never interrupts a pass
		let outcome = scanner.run_pass(Utc::now()).await;
		if let Err(e) = &outcome {
			tracing::error!(error = %e, "Timeout scan pass failed");
		}
		totals.write().await.record(&outcome);

		if *shutdown.borrow() {
			break;
		}
	}
}
