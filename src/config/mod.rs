//! Configuration types

mod service_config;

pub use service_config::{AudioPostConfig, ServiceConfig};
