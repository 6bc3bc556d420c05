//! CLI module
//!
//! Handles command-line argument parsing and wiring the configured
//! components together for each subcommand.

pub mod args;
pub mod setup;

pub use args::{Args, Commands, Verbosity};
pub use setup::{load_recall, load_system};
