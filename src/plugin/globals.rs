//! The built-in plugin shipping with the CLI.

use crate::commands::{ListCommands, NodeWatch};
use crate::registry::CommandRegistry;

use super::Plugin;

/// The "Globals" plugin: commands available in every project, registered
/// before any external plugin so external registrations can shadow them.
#[must_use]
pub fn plugin() -> Plugin {
    Plugin::new("Globals", "Built-in commands available everywhere.").on_init_commands(
        |registry, plugin| {
            Box::pin(async move {
                registry.add_commands(
                    &plugin,
                    &[
                        CommandRegistry::add_command::<ListCommands>,
                        CommandRegistry::add_command::<NodeWatch>,
                    ],
                );
                Ok(())
            })
        },
    )
}
