//! Deployment controller library
//!
//! Core modules for the Docker Compose deployment controller.

pub mod app;
pub mod compose;
pub mod config;
pub mod containers;
pub mod deploy;
pub mod env;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod server;
pub mod storage;
pub mod utils;
