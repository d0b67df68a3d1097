//! Command-line surface: clap argument structs, a shared nebula-directory
//! loader, and the output formatting every command renders through.

pub mod commands;
pub mod loader;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};
