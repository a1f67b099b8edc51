pub mod cli;
pub mod config;
pub mod labels;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
#[cfg(feature = "tui")]
pub mod tui;
pub mod upload;
