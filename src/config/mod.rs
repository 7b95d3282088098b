mod loader;

pub use loader::{Config, MonitorConfig, ServerConfig, SourceConfig};
