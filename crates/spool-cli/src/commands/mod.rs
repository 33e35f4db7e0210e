//! Subcommand implementations

pub mod callbacks;
pub mod countdown;
pub mod echo;
pub mod generate;
