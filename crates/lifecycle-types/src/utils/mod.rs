//! Utility functions for display formatting.

pub mod formatting;

pub use formatting::truncate_id;
