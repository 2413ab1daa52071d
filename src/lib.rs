// Dashcam Merge - Library Entry Point

pub mod config;
pub mod constants;
pub mod error;
pub mod footage;
pub mod logging;
pub mod permissions;
pub mod retention;
pub mod scheduler;
pub mod services;
pub mod stats;
pub mod tools;
pub mod transfer;

pub use config::Config;
pub use error::{MergeError, Result};
