pub mod global;
pub mod loader;
pub mod sections;

pub use global::{GlobalConfig, SystemConfig};
pub use loader::ConfigLoader;
pub use sections::{AnomalyConfig, GatewayConfig, LoggingConfig, OccupancyConfig};
