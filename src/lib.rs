pub mod app;
pub mod config;
pub mod error;
pub mod fetch;
pub mod notify;
pub mod records;
pub mod services;
#[cfg(test)]
pub mod testing;

pub use error::{AppError, Result};
