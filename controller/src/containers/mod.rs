//! Single-container control

pub mod controller;
