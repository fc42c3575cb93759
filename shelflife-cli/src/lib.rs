//! Shelflife command-line client.

pub mod cli;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;
