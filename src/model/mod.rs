//! Report data model shared by every output format.
//!
//! - [`Report`] - Scan output for one artifact
//! - [`ScanResult`] - Findings for one scanned target
//! - [`Results`] - The ordered list of targets, with [`Results::failed`]
//! - [`Package`] / [`DetectedVulnerability`] - Records produced by detection
//! - [`Severity`] - Vulnerability impact levels
//!
//! Every collection and optional field is omitted from serialized output
//! when empty, and defaults to empty when absent on input.
//!
//! # Example
//!
//! ```
//! use vulnreport::{DetectedVulnerability, Report, ScanResult, Severity};
//!
//! let result = ScanResult::new("package-lock.json")
//!     .with_kind("npm")
//!     .with_vulnerabilities(vec![DetectedVulnerability::new(
//!         "CVE-2021-23337",
//!         "lodash",
//!         "4.17.20",
//!         Severity::High,
//!     )]);
//! let report = Report::new("app:latest", vec![result]);
//!
//! assert!(report.results.failed());
//! ```

mod package;
mod report;
mod severity;
mod vulnerability;

pub use package::*;
pub use report::*;
pub use severity::*;
pub use vulnerability::*;
