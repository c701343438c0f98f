//! Built-in command handlers, registered by the Globals plugin.

pub mod list_commands;
pub mod node_watch;

pub use list_commands::ListCommands;
pub use node_watch::NodeWatch;
