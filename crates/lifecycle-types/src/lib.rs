//! Common types module for the order lifecycle system.
//!
//! This module defines the core data types shared by every lifecycle component:
//! the canonical order status enumeration, orders and their status history,
//! timeout policies, batch results and lifecycle events. Nothing in here performs
//! I/O, which keeps the types usable from storage backends, the core engine and
//! the service binary alike.

/// Batch transition results and per-item failures.
pub mod batch;
/// Event types published on the lifecycle event bus.
pub mod events;
/// Orders and their append-only status history.
pub mod order;
/// Scan pass reports produced by the timeout scanner.
pub mod scan;
/// The canonical order status enumeration and operator types.
pub mod status;
/// Storage namespaces and key construction.
pub mod storage;
/// Timeout policy types and bounds.
pub mod timeout;
/// Utility functions for display formatting.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use batch::*;
pub use events::*;
pub use order::*;
pub use scan::*;
pub use status::*;
pub use storage::*;
pub use timeout::*;
pub use utils::truncate_id;
pub use validation::*;
