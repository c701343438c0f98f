//! Command registry and dispatch.
//!
//! Plugins contribute commands here without the dispatcher knowing their
//! identities ahead of time. Each registration binds a [`CliCommand`] type
//! to a clap sub-command and wraps its execution in the dispatch wrapper
//! (banner, per-invocation handler construction, trailing padding).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgMatches, Command};
use futures::future::BoxFuture;
use log::{debug, warn};
use thiserror::Error;

use crate::output::{Color, Output, Symbol};
use crate::plugin::PluginDescriptor;
use crate::watch::WatchError;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("command failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Static metadata for a command type.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    /// The unique slug identifying the sub-command on the command line.
    pub command: &'static str,
    pub description: &'static str,
    /// Example invocations (without the leading program name), shown in the
    /// command's help output.
    pub examples: &'static [&'static str],
}

/// A command contributed by a plugin.
///
/// Static methods describe and configure the clap sub-command; a fresh
/// handler instance is constructed per invocation and destroyed once
/// `execute()` settles.
pub trait CliCommand: Sized + Send + 'static {
    fn descriptor() -> CommandDescriptor;

    /// Attach flags and options to the clap sub-command.
    #[must_use]
    fn configure(cmd: Command) -> Command {
        cmd
    }

    /// Construct a handler for one invocation.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if the invocation context is unusable.
    fn new(ctx: CommandContext) -> Result<Self, CommandError>;

    fn execute(self) -> BoxFuture<'static, Result<(), CommandError>>;
}

/// Everything a command handler may need for one invocation.
pub struct CommandContext {
    /// Parsed matches for this sub-command.
    pub matches: ArgMatches,
    pub out: Output,
    /// The plugin that registered the command.
    pub plugin: Arc<PluginDescriptor>,
    /// The invoking working directory.
    pub cwd: PathBuf,
    /// Snapshot of the registry for introspection commands.
    pub commands: Arc<[CommandListing]>,
}

/// Introspection view of one registry entry.
#[derive(Clone)]
pub struct CommandListing {
    pub descriptor: CommandDescriptor,
    pub plugin: Arc<PluginDescriptor>,
}

type CommandAction =
    Box<dyn Fn(CommandContext) -> BoxFuture<'static, Result<(), CommandError>> + Send + Sync>;

/// One registered command: descriptor, owning plugin, bound clap command,
/// and the wrapped action. Never mutated after registration.
pub struct CommandEntry {
    pub descriptor: CommandDescriptor,
    pub plugin: Arc<PluginDescriptor>,
    clap_command: Command,
    action: CommandAction,
}

/// A registrar adds one command type to the registry; used for batch
/// registration (`CommandRegistry::add_command::<C>` coerces to this).
pub type Registrar = fn(&mut CommandRegistry, &Arc<PluginDescriptor>);

/// Stores every registered command in insertion order and binds each to the
/// argument parser.
pub struct CommandRegistry {
    entries: Vec<CommandEntry>,
    out: Output,
}

impl CommandRegistry {
    #[must_use]
    pub fn new(out: Output) -> Self {
        Self {
            entries: Vec::new(),
            out,
        }
    }

    /// Register a single command type on behalf of `plugin`.
    ///
    /// Duplicate slugs are allowed: the collision is flagged with a warning
    /// and the last-registered entry wins at dispatch time.
    pub fn add_command<C: CliCommand>(&mut self, plugin: &Arc<PluginDescriptor>) {
        let descriptor = C::descriptor();
        debug!(
            "Registering command '{}' for plugin '{}'",
            descriptor.command, plugin.name
        );

        if let Some(existing) = self
            .entries
            .iter()
            .find(|e| e.descriptor.command == descriptor.command)
        {
            warn!(
                "Command slug '{}' from plugin '{}' collides with an earlier registration \
                 from plugin '{}'; the later registration wins",
                descriptor.command, plugin.name, existing.plugin.name
            );
        }

        let mut cmd = Command::new(descriptor.command).about(format!(
            "{} (Plugin:{})",
            descriptor.description, plugin.name
        ));
        cmd = C::configure(cmd);
        if !descriptor.examples.is_empty() {
            cmd = cmd.after_help(examples_help(descriptor.examples));
        }

        let action: CommandAction = Box::new(|ctx| {
            Box::pin(async move {
                let handler = C::new(ctx)?;
                handler.execute().await
            })
        });

        self.entries.push(CommandEntry {
            descriptor,
            plugin: Arc::clone(plugin),
            clap_command: cmd,
            action,
        });
    }

    /// Register a batch of command types for one plugin.
    pub fn add_commands(&mut self, plugin: &Arc<PluginDescriptor>, registrars: &[Registrar]) {
        for registrar in registrars {
            registrar(self, plugin);
        }
    }

    /// Registered entries in insertion order, optionally filtered by a
    /// literal, case-sensitive substring match on the command slug.
    #[must_use]
    pub fn list(&self, find: Option<&str>) -> Vec<&CommandEntry> {
        self.entries
            .iter()
            .filter(|e| find.is_none_or(|f| e.descriptor.command.contains(f)))
            .collect()
    }

    /// Cheap introspection snapshot, safe to hand to a command handler
    /// without borrowing the registry across an await.
    #[must_use]
    pub fn listing(&self) -> Arc<[CommandListing]> {
        self.entries
            .iter()
            .map(|e| CommandListing {
                descriptor: e.descriptor.clone(),
                plugin: Arc::clone(&e.plugin),
            })
            .collect()
    }

    /// Attach every registered sub-command to the root clap command.
    #[must_use]
    pub fn build_cli(&self, root: Command) -> Command {
        self.entries
            .iter()
            .fold(root, |acc, e| acc.subcommand(e.clap_command.clone()))
    }

    /// Dispatch the selected sub-command: print the banner, construct a
    /// fresh handler, await its execution, and pad the output afterwards.
    /// Failures propagate to the process-level handler untouched.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Unknown` when no entry matches `slug`, or the
    /// handler's own error.
    pub async fn dispatch(
        &self,
        slug: &str,
        matches: &ArgMatches,
        cwd: &Path,
    ) -> Result<(), CommandError> {
        // Reverse lookup: on slug collisions the last registration wins.
        let entry = self
            .entries
            .iter()
            .rev()
            .find(|e| e.descriptor.command == slug)
            .ok_or_else(|| CommandError::Unknown(slug.to_string()))?;

        let out = &self.out;
        out.log(&format!(
            " {} {}{}",
            out.symbol(Symbol::Pointer, Color::Yellow),
            out.bold("Executing command: "),
            out.color(&format!("'{slug}'"), Color::Cyan)
        ));
        out.blank();

        let ctx = CommandContext {
            matches: matches.clone(),
            out: out.clone(),
            plugin: Arc::clone(&entry.plugin),
            cwd: cwd.to_path_buf(),
            commands: self.listing(),
        };
        (entry.action)(ctx).await?;

        // Bottom pad after the command completes
        out.blank();
        out.blank();
        Ok(())
    }
}

fn examples_help(examples: &[&str]) -> String {
    let mut help = String::from("Examples:\n");
    for example in examples {
        help.push_str("  $ xcc ");
        help.push_str(example);
        help.push('\n');
    }
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_plugin(name: &str) -> Arc<PluginDescriptor> {
        Arc::new(PluginDescriptor {
            name: name.to_string(),
            description: String::new(),
            package_name: format!("xcc-plugin-{}", name.to_lowercase()),
            version: "1.0.0".to_string(),
        })
    }

    struct EchoA;
    impl CliCommand for EchoA {
        fn descriptor() -> CommandDescriptor {
            CommandDescriptor {
                command: "alpha",
                description: "First test command.",
                examples: &["alpha"],
            }
        }
        fn new(ctx: CommandContext) -> Result<Self, CommandError> {
            ctx.out.log("alpha ran");
            Ok(Self)
        }
        fn execute(self) -> BoxFuture<'static, Result<(), CommandError>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct EchoB;
    impl CliCommand for EchoB {
        fn descriptor() -> CommandDescriptor {
            CommandDescriptor {
                command: "beta",
                description: "Second test command.",
                examples: &[],
            }
        }
        fn new(_ctx: CommandContext) -> Result<Self, CommandError> {
            Ok(Self)
        }
        fn execute(self) -> BoxFuture<'static, Result<(), CommandError>> {
            Box::pin(async { Ok(()) })
        }
    }

    /// Same slug as [`EchoA`], different output, for collision tests.
    struct ShadowAlpha;
    impl CliCommand for ShadowAlpha {
        fn descriptor() -> CommandDescriptor {
            CommandDescriptor {
                command: "alpha",
                description: "Shadowing test command.",
                examples: &[],
            }
        }
        fn new(ctx: CommandContext) -> Result<Self, CommandError> {
            ctx.out.log("shadow ran");
            Ok(Self)
        }
        fn execute(self) -> BoxFuture<'static, Result<(), CommandError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn registry_with(entries: &[(Registrar, &Arc<PluginDescriptor>)]) -> CommandRegistry {
        let mut registry = CommandRegistry::new(Output::buffer());
        for (registrar, plugin) in entries {
            registrar(&mut registry, plugin);
        }
        registry
    }

    #[test]
    fn test_registration_order_preserved() {
        let p1 = test_plugin("One");
        let p2 = test_plugin("Two");
        let registry = registry_with(&[
            (CommandRegistry::add_command::<EchoB>, &p1),
            (CommandRegistry::add_command::<EchoA>, &p2),
        ]);

        let slugs: Vec<&str> = registry
            .list(None)
            .iter()
            .map(|e| e.descriptor.command)
            .collect();
        assert_eq!(slugs, vec!["beta", "alpha"]);
    }

    #[test]
    fn test_list_filters_by_substring() {
        let plugin = test_plugin("One");
        let registry = registry_with(&[
            (CommandRegistry::add_command::<EchoA>, &plugin),
            (CommandRegistry::add_command::<EchoB>, &plugin),
        ]);

        let filtered = registry.list(Some("alph"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].descriptor.command, "alpha");

        // Literal substring, not a glob
        assert!(registry.list(Some("alp*")).is_empty());
        assert_eq!(registry.list(Some("a")).len(), 2);
    }

    #[test]
    fn test_duplicate_slug_keeps_both_entries() {
        let p1 = test_plugin("One");
        let p2 = test_plugin("Two");
        let registry = registry_with(&[
            (CommandRegistry::add_command::<EchoA>, &p1),
            (CommandRegistry::add_command::<ShadowAlpha>, &p2),
        ]);

        // No dedup is performed; both registrations stay listed.
        assert_eq!(registry.list(Some("alpha")).len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_runs_last_registered_on_collision() {
        let p1 = test_plugin("One");
        let p2 = test_plugin("Two");
        let out = Output::buffer();
        let mut registry = CommandRegistry::new(out.clone());
        registry.add_command::<EchoA>(&p1);
        registry.add_command::<ShadowAlpha>(&p2);

        let cli = registry.build_cli(Command::new("xcc"));
        let matches = cli.get_matches_from(["xcc", "alpha"]);
        let (slug, sub) = matches.subcommand().unwrap();
        registry.dispatch(slug, sub, Path::new(".")).await.unwrap();

        let captured = out.captured();
        assert!(captured.contains("shadow ran"));
        assert!(!captured.contains("alpha ran"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_slug() {
        let registry = CommandRegistry::new(Output::buffer());
        let matches = Command::new("xcc").get_matches_from(["xcc"]);
        let result = registry.dispatch("missing", &matches, Path::new(".")).await;
        match result {
            Err(CommandError::Unknown(slug)) => assert_eq!(slug, "missing"),
            other => panic!("Expected Unknown, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_prints_banner_and_padding() {
        let plugin = test_plugin("One");
        let out = Output::buffer();
        let mut registry = CommandRegistry::new(out.clone());
        registry.add_command::<EchoA>(&plugin);

        let cli = registry.build_cli(Command::new("xcc"));
        let matches = cli.get_matches_from(["xcc", "alpha"]);
        let (slug, sub) = matches.subcommand().unwrap();
        registry.dispatch(slug, sub, Path::new(".")).await.unwrap();

        let captured = out.captured();
        assert!(captured.contains("Executing command: 'alpha'"));
        assert!(captured.ends_with("alpha ran\n\n\n"));
    }
}
