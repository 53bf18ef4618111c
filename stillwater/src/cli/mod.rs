//! Command-line interface: the server and a draft client.

mod args;
mod commands;

pub use args::Cli;
pub use commands::execute;
