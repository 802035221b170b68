pub mod cli;
pub mod load_config;
pub mod payload_file;

pub use cli::{run, Cli, Commands};
