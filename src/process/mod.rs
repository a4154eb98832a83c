// Process module - spawning, signalling and supervising OS processes

pub mod controller;
pub mod health;
pub mod probe;
pub mod restart;
pub mod spawner;

pub use controller::{ControllerConfig, ProcessController};
pub use health::{HealthMonitor, MonitorHandle};
pub use probe::{ProcessMetrics, ProcessProbe};
pub use restart::RestartPolicy;
pub use spawner::{parse_command, spawn_detached, SpawnRequest};
