//! Jolt CLI library.
//!
//! Shared pieces of the `jolt` shell: configuration, logging setup, output
//! colors and the interactive loop.

pub mod colors;
pub mod config;
pub mod logging;
pub mod repl;
