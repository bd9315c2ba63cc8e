pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use config::TransferConfig;
pub use error::TransferError;
pub use models::{RunReport, TransferResult};
pub use services::pipeline::TransferPipeline;
