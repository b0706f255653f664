//! Library side of `joytask`: the task model, both task stores, the
//! reconciler that picks between them, and the CLI/TUI front ends.

pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod reconciler;
pub mod remote;
pub mod storage;
pub mod tui;
pub mod views;

pub use error::{JoytaskError, Result};
