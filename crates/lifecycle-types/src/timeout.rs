//! Timeout policy types.
//!
//! A policy is scoped either to a whole tenant (the tenant default) or to a single
//! merchant within it (an override). Resolution picks the merchant override, then
//! the tenant default, then the system fallback from configuration.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Inclusive bounds for `payment_timeout_minutes`.
pub const PAYMENT_TIMEOUT_MINUTES_RANGE: (u32, u32) = (1, 1440);
/// Inclusive bounds for `processing_timeout_hours`.
pub const PROCESSING_TIMEOUT_HOURS_RANGE: (u32, u32) = (1, 720);

/// Errors raised when a timeout policy violates its bounds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutBoundsError {
	#[error("payment_timeout_minutes must be between {min} and {max}, got {value}")]
	PaymentTimeout { value: u32, min: u32, max: u32 },
	#[error("processing_timeout_hours must be between {min} and {max}, got {value}")]
	ProcessingTimeout { value: u32, min: u32, max: u32 },
}

/// Checks both timeout values against their bounds.
pub fn validate_timeouts(
	payment_timeout_minutes: u32,
	processing_timeout_hours: u32,
) -> Result<(), TimeoutBoundsError> {
	let (min, max) = PAYMENT_TIMEOUT_MINUTES_RANGE;
	if !(min..=max).contains(&payment_timeout_minutes) {
		return Err(TimeoutBoundsError::PaymentTimeout {
			value: payment_timeout_minutes,
			min,
			max,
		});
	}
	let (min, max) = PROCESSING_TIMEOUT_HOURS_RANGE;
	if !(min..=max).contains(&processing_timeout_hours) {
		return Err(TimeoutBoundsError::ProcessingTimeout {
			value: processing_timeout_hours,
			min,
			max,
		});
	}
	Ok(())
}

/// A stored timeout policy for a tenant default or a merchant override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTimeoutConfig {
	pub tenant_id: String,
	/// `None` marks the tenant-wide default.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub merchant_id: Option<String>,
	pub payment_timeout_minutes: u32,
	pub processing_timeout_hours: u32,
	pub updated_at: DateTime<Utc>,
}

impl OrderTimeoutConfig {
	/// Creates the tenant-wide default policy.
	pub fn tenant_default(
		tenant_id: impl Into<String>,
		payment_timeout_minutes: u32,
		processing_timeout_hours: u32,
	) -> Self {
		Self {
			tenant_id: tenant_id.into(),
			merchant_id: None,
			payment_timeout_minutes,
			processing_timeout_hours,
			updated_at: Utc::now(),
		}
	}

	/// Creates a merchant-specific override.
	pub fn merchant_override(
		tenant_id: impl Into<String>,
		merchant_id: impl Into<String>,
		payment_timeout_minutes: u32,
		processing_timeout_hours: u32,
	) -> Self {
		Self {
			tenant_id: tenant_id.into(),
			merchant_id: Some(merchant_id.into()),
			payment_timeout_minutes,
			processing_timeout_hours,
			updated_at: Utc::now(),
		}
	}

	pub fn is_tenant_default(&self) -> bool {
		self.merchant_id.is_none()
	}

	pub fn validate(&self) -> Result<(), TimeoutBoundsError> {
		validate_timeouts(self.payment_timeout_minutes, self.processing_timeout_hours)
	}
}

/// Where a resolved policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicySource {
	Merchant,
	Tenant,
	System,
}

/// The effective timeouts for one merchant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTimeoutPolicy {
	pub payment_timeout_minutes: u32,
	pub processing_timeout_hours: u32,
	pub source: PolicySource,
}

impl ResolvedTimeoutPolicy {
	pub fn from_config(config: &OrderTimeoutConfig, source: PolicySource) -> Self {
		Self {
			payment_timeout_minutes: config.payment_timeout_minutes,
			processing_timeout_hours: config.processing_timeout_hours,
			source,
		}
	}

	/// Idle time after which a `Pending` order is overdue.
	pub fn payment_timeout(&self) -> Duration {
		Duration::minutes(i64::from(self.payment_timeout_minutes))
	}

	/// Idle time after which a `Processing` order is overdue.
	pub fn processing_timeout(&self) -> Duration {
		Duration::hours(i64::from(self.processing_timeout_hours))
	}
}

/// What the scanner does with orders stuck in `Processing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingTimeoutAction {
	/// Cancel the order with reason "processing timeout".
	#[default]
	Cancel,
	/// Leave the order alone and raise an alert event.
	Alert,
}

impl fmt::Display for ProcessingTimeoutAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProcessingTimeoutAction::Cancel => write!(f, "cancel"),
			ProcessingTimeoutAction::Alert => write!(f, "alert"),
		}
	}
}

impl FromStr for ProcessingTimeoutAction {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"cancel" => Ok(Self::Cancel),
			"alert" => Ok(Self::Alert),
			other => Err(format!("Unknown processing timeout action: {}", other)),
		}
	}
}
