//! Utility modules for refcat-store

pub mod cancel;
pub mod db_retry;
pub mod pool_monitor;

pub use cancel::cancellable;
pub use db_retry::retry_on_lock;
pub use pool_monitor::{begin_monitored, MonitoredTransaction};
