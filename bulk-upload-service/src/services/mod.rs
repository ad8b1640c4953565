pub mod database;
pub mod metrics;
pub mod uploads;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
