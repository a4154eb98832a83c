// Logs module - per-service output files

mod manager;
mod reader;

pub use manager::{LogManager, MarkerKind};
pub use reader::{read_last_lines, LogStream};
