//! Command-line interface
//!
//! Subcommands live in [`commands`]; terminal styling in [`ui`].

pub mod commands;
pub mod ui;

pub use ui::Output;
