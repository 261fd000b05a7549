pub mod config;
pub mod duration;

pub use config::{ConfigError, FleetConfig, HealthSection, ResolvedHealth, StoreSection};
pub use duration::{format_duration, parse_duration};
