pub mod browser;
pub mod config;
pub mod detector;
pub mod extractor;
pub mod models;
pub mod monitor;
pub mod navigator;
pub mod notifier;
pub mod plugins;
pub mod retry;
pub mod session;
pub mod site;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use crate::config::AppConfig;
pub use crate::monitor::{CycleReport, MonitorLoop, MonitorState};
pub use crate::utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
