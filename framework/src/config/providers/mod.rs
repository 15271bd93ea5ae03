mod log;
mod server;

pub use log::LogConfig;
pub use server::{ServerConfig, ServerConfigBuilder};
