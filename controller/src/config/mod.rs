//! Deployment configuration store

pub mod envfile;
pub mod store;
