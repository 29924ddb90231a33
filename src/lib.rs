pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod plugins;
pub mod scheduler;
pub mod shutdown;
pub mod worker;
