//! OpenAPI server models
//!
//! Request and response bodies of the deployment controller's REST surface.

pub mod models;
