//! envsync command-line interface.
//!
//! Reconciles the variables declared in `envsync.toml` into a local,
//! snapshot-backed remote. The binary in `main.rs` is a thin dispatcher over
//! the modules here.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod output;
