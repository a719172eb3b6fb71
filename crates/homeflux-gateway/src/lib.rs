pub mod cache;
pub mod client;
pub mod error;
pub mod gateway;
pub mod queue;
pub mod simulated;

pub use cache::DeviceCache;
pub use client::DeviceCloudClient;
pub use error::{GatewayError, Result};
pub use gateway::{DeviceGateway, ReplayReport};
pub use queue::{CommandQueue, QueueStatus};
pub use simulated::{SimulatedCloudClient, UpstreamCall};
