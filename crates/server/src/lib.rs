//! HTTP surface of the forge service.

pub mod api;
pub mod metrics;
pub mod state;
