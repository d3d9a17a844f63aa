pub mod config;
pub mod console;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod orchestrator;
pub mod services;

pub use error::{AppError, AppResult};
pub use orchestrator::{CoreSettings, SessionCore, Snapshot, Tab};
