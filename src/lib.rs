pub mod config;
pub mod detector;

pub use config::{Config, ConfigError, DetectorConfig};
pub use detector::{DetectorHandle, FailureDetector, Member, MemberId};
