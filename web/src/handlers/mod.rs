//! HTTP request handlers.

pub mod health;
pub mod plans;

pub use health::health_check;
