pub mod config;
pub mod crop;
pub mod logging;
pub mod pipeline;
pub mod report;

pub use config::{Cli, Commands, ConfigError, Settings};
pub use pipeline::{run_analysis, PipelineError, RunReport};
