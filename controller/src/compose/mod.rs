//! Docker Compose integration

pub mod gateway;
pub mod topology;
