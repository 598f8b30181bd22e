//! Deployment module

pub mod fsm;
pub mod machine;
