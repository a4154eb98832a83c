// Daemon module - background monitor process management

pub mod daemonize;
pub mod manager;
pub mod pid;

pub use daemonize::daemonize;
pub use manager::{DaemonManager, DaemonStatus};
pub use pid::PidFile;
