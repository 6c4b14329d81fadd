pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logging;

pub use config::AppConfig;
pub use engine::{Engine, EngineDeps};
pub use error::{HiveError, Result};
