//! Order status enumeration and operator types.
//!
//! `OrderStatus` is the single source type for an order's state. It has two
//! presentation adapters: a compact integer code used for persistence and ordering,
//! and a lowercase display string used in logs and operator-facing output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a status or operator representation cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusParseError {
	#[error("Unknown order status code: {0}")]
	UnknownCode(u8),
	#[error("Unknown order status: {0}")]
	UnknownStatus(String),
	#[error("Unknown operator type: {0}")]
	UnknownOperator(String),
}

/// Status of an order in its business lifecycle.
///
/// Declaration order matches the integer codes, so the derived `Ord` sorts
/// statuses the same way their persisted form does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OrderStatus {
	/// Order has been created and awaits payment.
	Pending,
	/// Payment has been captured.
	Paid,
	/// The merchant is fulfilling the order.
	Processing,
	/// Fulfilment is complete. Terminal.
	Completed,
	/// The order was cancelled. Terminal.
	Cancelled,
}

impl OrderStatus {
	/// Every status, in code order.
	pub const ALL: [OrderStatus; 5] = [
		OrderStatus::Pending,
		OrderStatus::Paid,
		OrderStatus::Processing,
		OrderStatus::Completed,
		OrderStatus::Cancelled,
	];

	/// Returns the compact integer code used for storage.
	pub fn code(self) -> u8 {
		match self {
			OrderStatus::Pending => 0,
			OrderStatus::Paid => 1,
			OrderStatus::Processing => 2,
			OrderStatus::Completed => 3,
			OrderStatus::Cancelled => 4,
		}
	}

	/// Returns the display name of the status.
	pub fn as_str(self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Paid => "paid",
			OrderStatus::Processing => "processing",
			OrderStatus::Completed => "completed",
			OrderStatus::Cancelled => "cancelled",
		}
	}

	/// Whether no further transition can leave this status.
	pub fn is_terminal(self) -> bool {
		matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
	}
}

impl From<OrderStatus> for u8 {
	fn from(status: OrderStatus) -> Self {
		status.code()
	}
}

impl TryFrom<u8> for OrderStatus {
	type Error = StatusParseError;

	fn try_from(code: u8) -> Result<Self, Self::Error> {
		OrderStatus::ALL
			.into_iter()
			.find(|status| status.code() == code)
			.ok_or(StatusParseError::UnknownCode(code))
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = StatusParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let normalized = s.trim().to_ascii_lowercase();
		OrderStatus::ALL
			.into_iter()
			.find(|status| status.as_str() == normalized)
			.ok_or_else(|| StatusParseError::UnknownStatus(s.to_string()))
	}
}

/// The class of actor that initiated a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorType {
	Customer,
	Merchant,
	System,
	Admin,
}

impl OperatorType {
	pub fn as_str(self) -> &'static str {
		match self {
			OperatorType::Customer => "customer",
			OperatorType::Merchant => "merchant",
			OperatorType::System => "system",
			OperatorType::Admin => "admin",
		}
	}
}

impl fmt::Display for OperatorType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OperatorType {
	type Err = StatusParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"customer" => Ok(OperatorType::Customer),
			"merchant" => Ok(OperatorType::Merchant),
			"system" => Ok(OperatorType::System),
			"admin" => Ok(OperatorType::Admin),
			_ => Err(StatusParseError::UnknownOperator(s.to_string())),
		}
	}
}
