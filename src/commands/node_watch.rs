//! The `node-watch` command: run a node script and keep it running.
//!
//! Wires the watch harness to the process supervisor: file changes under the
//! module's source tree terminate the child, and the supervisor respawns it.

use std::path::{Path, PathBuf};

use clap::{Arg, Command};
use futures::future::BoxFuture;
use log::{info, warn};
use tokio::sync::mpsc;

use crate::output::Output;
use crate::paths;
use crate::registry::{CliCommand, CommandContext, CommandDescriptor, CommandError};
use crate::supervisor::ProcessSupervisor;
use crate::watch::{self, WatchOptions};

/// The script to run and the paths to watch for one session.
struct WatchTargets {
    script: PathBuf,
    watch_paths: Vec<String>,
}

/// Resolve the session targets against the module root: the nearest ancestor
/// of `cwd` carrying a `package.json`, falling back to `cwd` itself.
///
/// With a `lib/` source tree the watch set is `lib/` plus the script;
/// otherwise the whole module root is watched.
fn resolve_targets(cwd: &Path, file: Option<&str>) -> WatchTargets {
    let root = paths::search_up(cwd, "package.json").unwrap_or_else(|| cwd.to_path_buf());
    info!("Module root: {}", root.display());

    let script = match file {
        Some(file) => paths::normalize_child_path(&root, Path::new(file)),
        None => root.join("index.js"),
    };

    let lib = root.join("lib");
    let watch_paths = if lib.is_dir() {
        vec![
            lib.to_string_lossy().into_owned(),
            script.to_string_lossy().into_owned(),
        ]
    } else {
        vec![root.to_string_lossy().into_owned()]
    };

    WatchTargets { script, watch_paths }
}

pub struct NodeWatch {
    out: Output,
    targets: WatchTargets,
}

impl CliCommand for NodeWatch {
    fn descriptor() -> CommandDescriptor {
        CommandDescriptor {
            command: "node-watch",
            description: "Run a node script and restart it when files change.",
            examples: &["node-watch", "node-watch -f lib/server.js"],
        }
    }

    fn configure(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("PATH")
                .help("Script to run, relative to the module root (default index.js)"),
        )
    }

    fn new(ctx: CommandContext) -> Result<Self, CommandError> {
        let file = ctx.matches.get_one::<String>("file").map(String::as_str);
        Ok(Self {
            out: ctx.out,
            targets: resolve_targets(&ctx.cwd, file),
        })
    }

    fn execute(self) -> BoxFuture<'static, Result<(), CommandError>> {
        Box::pin(async move {
            let supervisor = ProcessSupervisor::new(
                "node",
                vec![self.targets.script.to_string_lossy().into_owned()],
                self.out.clone(),
            );
            let (restart_tx, restart_rx) = mpsc::channel(16);
            let supervisor_task = tokio::spawn(supervisor.run(restart_rx));

            let opts = WatchOptions {
                watch_paths: self.targets.watch_paths,
                ..WatchOptions::default()
            };
            let session = watch::run_and_watch(
                move || {
                    if let Err(e) = restart_tx.try_send(()) {
                        warn!("Dropping restart signal: {e}");
                    }
                },
                opts,
            );

            // The watch session runs until interrupted; Ctrl-C is the
            // operator's stop path.
            tokio::select! {
                result = session => result?,
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    self.out.blank();
                    self.out.star("Interrupted; shutting down");
                }
            }

            supervisor_task.abort();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_default_to_module_root_index() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();

        let targets = resolve_targets(&nested, None);
        assert_eq!(targets.script, dir.path().join("index.js"));
        assert_eq!(
            targets.watch_paths,
            vec![dir.path().to_string_lossy().into_owned()]
        );
    }

    #[test]
    fn test_targets_watch_lib_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();

        let targets = resolve_targets(dir.path(), Some("lib/server.js"));
        assert_eq!(targets.script, dir.path().join("lib/server.js"));
        assert_eq!(
            targets.watch_paths,
            vec![
                dir.path().join("lib").to_string_lossy().into_owned(),
                dir.path().join("lib/server.js").to_string_lossy().into_owned(),
            ]
        );
    }

    #[test]
    fn test_targets_without_module_root_fall_back_to_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let targets = resolve_targets(dir.path(), None);
        assert_eq!(targets.script, dir.path().join("index.js"));
    }

    #[test]
    fn test_absolute_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let targets = resolve_targets(dir.path(), Some("/opt/app/main.js"));
        assert_eq!(targets.script, PathBuf::from("/opt/app/main.js"));
    }
}
