pub mod aggregate;
pub mod report;

pub use report::AnalyticsService;
