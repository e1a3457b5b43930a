//! Soak runner: configuration and status API of the long-running test process

pub mod api;
pub mod config;
