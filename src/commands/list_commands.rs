//! The `list-commands` introspection command.

use std::sync::Arc;

use clap::{Arg, ArgAction, Command};
use futures::future::BoxFuture;

use crate::output::{Color, Output, Symbol};
use crate::registry::{
    CliCommand, CommandContext, CommandDescriptor, CommandError, CommandListing,
};

/// Lists every registered command in registration order, optionally
/// filtered by a substring of the command name.
pub struct ListCommands {
    out: Output,
    commands: Arc<[CommandListing]>,
    details: bool,
    find: Option<String>,
}

impl CliCommand for ListCommands {
    fn descriptor() -> CommandDescriptor {
        CommandDescriptor {
            command: "list-commands",
            description: "List all commands registered by the loaded plugins.",
            examples: &["list-commands", "list-commands -d", "list-commands -f watch"],
        }
    }

    fn configure(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("details")
                .short('d')
                .long("details")
                .action(ArgAction::SetTrue)
                .help("Show the plugin each command belongs to"),
        )
        .arg(
            Arg::new("find")
                .short('f')
                .long("find")
                .value_name("SUBSTRING")
                .help("Only list commands whose name contains SUBSTRING"),
        )
    }

    fn new(ctx: CommandContext) -> Result<Self, CommandError> {
        Ok(Self {
            out: ctx.out,
            commands: ctx.commands,
            details: ctx.matches.get_flag("details"),
            find: ctx.matches.get_one::<String>("find").cloned(),
        })
    }

    fn execute(self) -> BoxFuture<'static, Result<(), CommandError>> {
        Box::pin(async move {
            let find = self.find.as_deref();
            let listed: Vec<&CommandListing> = self
                .commands
                .iter()
                .filter(|c| find.is_none_or(|f| c.descriptor.command.contains(f)))
                .collect();

            if listed.is_empty() {
                let message = match find {
                    Some(f) => format!("No commands matching '{f}'"),
                    None => "No commands registered".to_string(),
                };
                self.out.star(&message);
                return Ok(());
            }

            for listing in listed {
                // Pad before styling so escape codes don't skew the column
                self.out.log(&format!(
                    "  {} {} {}",
                    self.out.symbol(Symbol::Bullet, Color::Cyan),
                    self.out.bold(&format!("{:<18}", listing.descriptor.command)),
                    listing.descriptor.description
                ));
                if self.details {
                    self.out.log(&self.out.color(
                        &format!(
                            "      Plugin: {} ({}:{})",
                            listing.plugin.name,
                            listing.plugin.package_name,
                            listing.plugin.version
                        ),
                        Color::Grey,
                    ));
                }
            }
            Ok(())
        })
    }
}
