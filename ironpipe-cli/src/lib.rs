//! Ironpipe CLI library
//!
//! The `ironpipe` binary is a thin wrapper around these modules; the report
//! builders in [`commands`] are usable without going through stdout.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
