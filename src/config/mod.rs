mod loader;
mod types;

pub use types::{
    CollectorConfig, Collectors, Config, DeliveryConfig, LabelsConfig, PushConfig, QueueConfig,
    SocketConfig, TelemetryConfig,
};
