//! CLI assembly and top-level run loop.
//!
//! The [`Controller`] wires the output surface, the plugin host, and the
//! plugin manager together, loads every plugin, and hands the parsed
//! invocation to the command registry. Startup-phase failures (plugin
//! metadata, lifecycle hooks) abort before any command executes.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use log::{debug, warn};
use thiserror::Error;

use crate::output::{Color, Output};
use crate::plugin::{globals, Host, PluginError, PluginManager};
use crate::registry::CommandError;
use crate::{logger, pm};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("{0}")]
    Usage(#[from] clap::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Global arguments recognized before any plugin has registered a command.
struct GlobalArgs {
    plugin_paths: Vec<PathBuf>,
    log_file: Option<PathBuf>,
    suppress_greeting: bool,
}

/// Owns the pieces of a CLI process and drives one invocation.
pub struct Controller {
    out: Output,
    host: Host,
    manager: PluginManager,
}

impl Controller {
    #[must_use]
    pub fn new(out: Output) -> Self {
        Self {
            host: Host::new(out.clone()),
            manager: PluginManager::new(),
            out,
        }
    }

    /// The plugin manager, for making plugin entries available before
    /// [`Self::run`].
    pub fn plugins_mut(&mut self) -> &mut PluginManager {
        &mut self.manager
    }

    /// Run one CLI invocation end to end: initialize logging, load plugins,
    /// parse `argv`, dispatch the selected command.
    ///
    /// # Errors
    ///
    /// Plugin load failures, argument errors, and command failures all
    /// propagate; the binary reports them and exits non-zero.
    pub async fn run<I, T>(mut self, argv: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
        let globals_args = Self::parse_global(&argv);

        logger::init(globals_args.log_file.as_deref())?;

        let cwd = std::env::current_dir()?;
        self.load_plugins(&globals_args.plugin_paths, &cwd).await?;

        // Greet only once the command surface is known to be loadable
        if !globals_args.suppress_greeting {
            self.greet();
        }

        let cli = self.host.commands.build_cli(self.root_command());
        let matches = match cli.try_get_matches_from(&argv) {
            Ok(matches) => matches,
            // Help and version renderings are successful outcomes
            Err(e)
                if matches!(
                    e.kind(),
                    clap::error::ErrorKind::DisplayHelp
                        | clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                        | clap::error::ErrorKind::DisplayVersion
                ) =>
            {
                e.print()?;
                return Ok(());
            }
            Err(e) => return Err(AppError::Usage(e)),
        };

        let Some((slug, sub)) = matches.subcommand() else {
            return Ok(());
        };
        self.host.commands.dispatch(slug, sub, &cwd).await?;
        Ok(())
    }

    /// Pre-parse the arguments the controller needs before the full command
    /// surface exists. Unknown arguments are expected here; the complete
    /// parse happens after plugin loading.
    fn parse_global(argv: &[OsString]) -> GlobalArgs {
        let matches = Command::new("xcc")
            .ignore_errors(true)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .allow_external_subcommands(true)
            .arg(
                Arg::new("plugin")
                    .long("plugin")
                    .action(ArgAction::Append)
                    .value_name("PATH"),
            )
            .arg(Arg::new("log-file").long("log-file").value_name("PATH"))
            .get_matches_from(argv);

        let mut plugin_paths: Vec<PathBuf> = std::env::var("XCC_PLUGIN_PATH")
            .map(|paths| paths.split(':').filter(|p| !p.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_default();
        if let Some(flagged) = matches.get_many::<String>("plugin") {
            plugin_paths.extend(flagged.map(PathBuf::from));
        }

        let suppress_greeting = argv.iter().any(|arg| {
            matches!(
                arg.to_str(),
                Some("--help" | "-h" | "--version" | "-V")
            )
        });

        GlobalArgs {
            plugin_paths,
            log_file: matches.get_one::<String>("log-file").map(PathBuf::from),
            suppress_greeting,
        }
    }

    fn greet(&self) {
        let banner = format!(
            "{} {}\n{}",
            self.out.bold("XCC"),
            self.out.color(concat!("v", env!("CARGO_PKG_VERSION")), Color::Grey),
            self.out.color("The extensible command line.", Color::Grey)
        );
        self.out.greet(&banner);
    }

    /// Load the built-in plugin, then the explicitly configured plugin
    /// roots (fatal on failure), then globally installed plugins (best
    /// effort).
    async fn load_plugins(
        &mut self,
        plugin_paths: &[PathBuf],
        cwd: &std::path::Path,
    ) -> Result<(), AppError> {
        self.manager
            .load_builtin(globals::plugin(), &mut self.host)
            .await?;

        for path in plugin_paths {
            self.manager.load_plugin_at(path, &mut self.host).await?;
        }

        match pm::discover_global_plugins(cwd) {
            Ok(discovered) => {
                debug!("Discovered {} global plugin dir(s)", discovered.len());
                self.manager
                    .load_discovered(&discovered, &mut self.host)
                    .await?;
            }
            Err(e) => warn!("Skipping global plugin discovery: {e}"),
        }
        Ok(())
    }

    fn root_command(&self) -> Command {
        Command::new("xcc")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Pluggable command dispatcher with watch supervision")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                Arg::new("plugin")
                    .long("plugin")
                    .global(true)
                    .action(ArgAction::Append)
                    .value_name("PATH")
                    .help("Load an additional plugin from PATH"),
            )
            .arg(
                Arg::new("log-file")
                    .long("log-file")
                    .global(true)
                    .value_name("PATH")
                    .help("Mirror diagnostic logging into PATH"),
            )
    }
}
