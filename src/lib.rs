pub mod bridge;
pub mod config;
pub mod error;
pub mod metrics;
pub mod scan;
pub mod server;
