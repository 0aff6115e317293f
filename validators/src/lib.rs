pub mod chunks;
pub mod labels;
pub mod metrics;
pub mod poller;

pub use labels::LabelSchema;
pub use metrics::ValidatorMetrics;
pub use poller::Poller;
