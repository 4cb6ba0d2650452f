pub mod app;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod sink;
pub mod utils;

pub use dataset::{Dataset, Record};
pub use error::{AppError, Result};
