//! Service layer: database access, metrics and business orchestration.

pub mod database;
pub mod limits;
pub mod metrics;
pub mod storage;
pub mod wallet;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
