pub mod config;
pub mod model;
pub mod output;
pub mod template;

pub use config::Config;
pub use model::{DetectedVulnerability, Package, Report, Results, ScanResult, Severity};
pub use output::{write, Format, ReportError, WriteError, Writer};
