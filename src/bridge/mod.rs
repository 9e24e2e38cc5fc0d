mod client;
mod model;

pub use client::{BridgeClient, HueBridge};
pub use model::{DiscoveryRecord, LightRecord, LightState, SensorRecord};
