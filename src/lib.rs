// Library exports for the overseer service supervisor

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod logs;
pub mod process;
pub mod service;
pub mod state;
pub mod supervisor;
