//! Subcommand implementations.

pub mod chat;
pub mod platforms;
pub mod tools;
