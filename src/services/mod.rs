pub mod reporting;

pub use reporting::{AdminQuery, Period, ReportingService};
