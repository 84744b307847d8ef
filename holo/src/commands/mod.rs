//! Subcommand implementations. Each returns the process exit code.

pub mod build;
pub mod helpers;
pub mod inspect;
pub mod project;
pub mod resolve;
