pub mod aggregate;
pub mod checkpoint;
pub mod upstream_report;

pub use aggregate::{Summary, highlights};
pub use checkpoint::{parse_results, render_result, render_results};
pub use upstream_report::{ReportEntry, build_report, render_report};
