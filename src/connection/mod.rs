pub mod health;

pub use health::{ConnectionState, HealthEvent, HealthMonitor, HealthStatus, PING_TIMEOUT};
