//! Reports produced by timeout scan passes.

use crate::BatchResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which timeout an order exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
	/// Pending for longer than the payment timeout.
	Payment,
	/// Processing for longer than the processing timeout.
	Processing,
}

impl TimeoutKind {
	/// Reason recorded in the history row of an automatic cancellation.
	pub fn reason(self) -> &'static str {
		match self {
			TimeoutKind::Payment => "payment timeout",
			TimeoutKind::Processing => "processing timeout",
		}
	}
}

/// An order that matched the idle predicate during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutCandidate {
	pub tenant_id: String,
	pub merchant_id: String,
	pub order_id: String,
	pub kind: TimeoutKind,
}

/// Summary of one scan-and-transition pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
	pub tenants_scanned: usize,
	/// Tenants skipped this pass because of store or policy failures.
	pub tenants_failed: Vec<String>,
	/// Orders that matched the idle predicate.
	pub candidates: usize,
	pub payment_timeouts: BatchResult,
	pub processing_timeouts: BatchResult,
	/// Processing orders reported instead of cancelled.
	pub alerted: usize,
}

impl ScanReport {
	pub fn new(started_at: DateTime<Utc>) -> Self {
		Self {
			started_at,
			finished_at: started_at,
			tenants_scanned: 0,
			tenants_failed: Vec::new(),
			candidates: 0,
			payment_timeouts: BatchResult::default(),
			processing_timeouts: BatchResult::default(),
			alerted: 0,
		}
	}

	/// Orders successfully moved by this pass.
	pub fn transitioned(&self) -> usize {
		self.payment_timeouts.success_count + self.processing_timeouts.success_count
	}

	/// Orders the pass tried and failed to move.
	pub fn failed(&self) -> usize {
		self.payment_timeouts.failures.len() + self.processing_timeouts.failures.len()
	}

	/// Both batch results combined.
	pub fn combined(&self) -> BatchResult {
		let mut combined = self.payment_timeouts.clone();
		combined.merge(self.processing_timeouts.clone());
		combined
	}
}
