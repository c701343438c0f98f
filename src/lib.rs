//! xcc: a pluggable command-line dispatcher with watch supervision.
//!
//! Plugins contribute named sub-commands at startup; the selected command
//! runs once per process invocation, optionally under a watch-and-restart
//! session that supervises a long-running child process.

pub mod app;
pub mod commands;
pub mod logger;
pub mod output;
pub mod paths;
pub mod plugin;
pub mod pm;
pub mod registry;
pub mod supervisor;
pub mod watch;
