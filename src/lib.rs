pub mod api;
pub mod app;
pub mod batch;
pub mod canonical;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod services;

pub use error::{AppError, Result};
