pub mod config;
pub mod pipeline;

pub use config::ToolConfig;
