//! Timeout policies and the idle-order scanner.

pub mod policy;
pub mod scanner;

pub use policy::{TimeoutPolicyError, TimeoutPolicyResolver, TimeoutPolicyService};
pub use scanner::{ScannerError, TimeoutScanner};
