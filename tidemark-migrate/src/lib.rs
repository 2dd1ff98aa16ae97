//! Tidemark Migration CLI
//!
//! Command-line interface for creating, applying, rolling back and inspecting
//! tidemark SQL migrations. Exposed as a library so command handling can be driven
//! against any [`tidemark::Executor`].

pub mod cli;
pub mod commands;
pub mod render;

pub use cli::{Cli, Commands};
