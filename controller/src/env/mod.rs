//! Environment variable management

pub mod manager;
