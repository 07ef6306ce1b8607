pub mod api;
pub mod billing;
pub mod cli;
pub mod config;
pub mod core;
pub mod dashboard;
pub mod errors;
pub mod monitoring;
pub mod pricing;
pub mod reporting;

// Re-exports
pub use api::routes::{create_router, AppState};
pub use billing::BillingLedger;
pub use crate::core::SessionManager;
pub use dashboard::start_dashboard;
pub use errors::{MeterError, MeterResult};
pub use monitoring::Sampler;
pub use pricing::compute_cost;
pub use reporting::ReportDispatcher;
pub type AsyncMutex<T> = tokio::sync::Mutex<T>;
