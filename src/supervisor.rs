//! Child-process supervision for watch mode.
//!
//! A [`ProcessSupervisor`] owns the lifecycle of exactly one external child
//! process: start it, relay its output, classify its exit, and restart it.
//! Restart-on-exit is unconditional policy: the supervisor respawns after
//! clean exits and failures alike, not only after change-triggered kills.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::output::{Color, Output};

/// Why the supervised child exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Signal-terminated; treated as a change-triggered restart.
    ChangeTriggered,
    Clean,
    Failed(i32),
}

impl ExitKind {
    #[must_use]
    pub fn classify(code: Option<i32>) -> Self {
        match code {
            None => Self::ChangeTriggered,
            Some(0) => Self::Clean,
            Some(code) => Self::Failed(code),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamTag {
    Stdout,
    Stderr,
}

impl StreamTag {
    fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    fn color(self) -> Color {
        match self {
            Self::Stdout => Color::Green,
            Self::Stderr => Color::Red,
        }
    }
}

struct ChildHandle {
    child: Child,
    relays: Vec<JoinHandle<()>>,
}

/// Supervises one external child process under the watch supervisor's
/// re-run callback.
pub struct ProcessSupervisor {
    program: String,
    args: Vec<String>,
    out: Output,
    restart_delay: Duration,
    child: Option<ChildHandle>,
    spawn_count: Arc<AtomicU64>,
}

enum Event {
    Exited(Option<ExitStatus>),
    Restart,
    Closed,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(program: &str, args: Vec<String>, out: Output) -> Self {
        Self {
            program: program.to_string(),
            args,
            out,
            restart_delay: Duration::from_millis(50),
            child: None,
            spawn_count: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// How many times a child has been spawned so far.
    #[must_use]
    pub fn spawn_count(&self) -> u64 {
        self.spawn_count.load(Ordering::SeqCst)
    }

    /// Shared view of the spawn counter, usable after the supervisor moves
    /// into its event loop.
    #[must_use]
    pub fn spawn_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.spawn_count)
    }

    /// Start the child process.
    ///
    /// If a live handle already exists, the child is sent SIGTERM (so a
    /// TERM handler gets to run its cleanup) and *no* spawn happens here:
    /// the respawn is deferred to the exit handler, so two children never
    /// coexist.
    ///
    /// Spawn failures surface as relayed stderr output rather than a
    /// structured error; the supervision loop stays alive and tries again
    /// on the next change or exit event.
    pub fn start(&mut self) {
        if let Some(handle) = &mut self.child {
            info!("Child is live; signalling termination and deferring respawn");
            if let Err(e) = terminate(&mut handle.child) {
                warn!("Failed to signal child process: {e}");
            }
            return;
        }

        self.out.chevron(
            &format!("Running {}: '{}'", self.program, self.args.join(" ")),
            Color::Cyan,
        );
        self.out.div();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match command.spawn() {
            Ok(mut child) => {
                debug!("Spawned '{}' (pid {:?})", self.program, child.id());
                let mut relays = Vec::new();
                if let Some(stdout) = child.stdout.take() {
                    relays.push(relay(self.out.clone(), StreamTag::Stdout, stdout));
                }
                if let Some(stderr) = child.stderr.take() {
                    relays.push(relay(self.out.clone(), StreamTag::Stderr, stderr));
                }
                self.spawn_count.fetch_add(1, Ordering::SeqCst);
                self.child = Some(ChildHandle { child, relays });
            }
            Err(e) => {
                self.out
                    .log(&relay_line(&self.out, StreamTag::Stderr, &e.to_string()));
            }
        }
    }

    /// Report the exit, detach the stream relays, and clear the handle.
    /// The caller schedules the unconditional respawn.
    fn handle_exit(&mut self, status: Option<ExitStatus>) -> ExitKind {
        let kind = ExitKind::classify(status.and_then(|s| s.code()));

        self.out.div();
        match kind {
            ExitKind::ChangeTriggered => {
                self.out.star("Changes detected; restarting the process ...");
            }
            ExitKind::Clean => self.out.star(&format!(
                "Child process exited with code {}",
                self.out.color("0", Color::Green)
            )),
            ExitKind::Failed(code) => self.out.star(&format!(
                "Child process exited with code {}",
                self.out.color(&code.to_string(), Color::Red)
            )),
        }
        self.out.blank();

        if let Some(handle) = self.child.take() {
            for relay in handle.relays {
                relay.abort();
            }
        }
        kind
    }

    /// The supervision event loop: every message on `restart_rx` drives
    /// [`Self::start`], and every child exit schedules an unconditional
    /// respawn after the fixed restart delay. Returns when the sender side
    /// of `restart_rx` is dropped.
    pub async fn run(mut self, mut restart_rx: mpsc::Receiver<()>) {
        loop {
            let Some(handle) = self.child.as_mut() else {
                match restart_rx.recv().await {
                    Some(()) => {
                        self.start();
                        continue;
                    }
                    None => return,
                }
            };

            let event = tokio::select! {
                status = handle.child.wait() => Event::Exited(status.ok()),
                msg = restart_rx.recv() => match msg {
                    Some(()) => Event::Restart,
                    None => Event::Closed,
                },
            };

            match event {
                Event::Exited(status) => {
                    self.handle_exit(status);
                    tokio::time::sleep(self.restart_delay).await;
                    self.start();
                }
                // Live child: start() signals it and defers the respawn to
                // the exit arm above.
                Event::Restart => self.start(),
                Event::Closed => return,
            }
        }
    }
}

/// Ask the child to terminate. On unix this is SIGTERM, so a child with a
/// TERM handler can flush and clean up before the respawn; `kill_on_drop`
/// remains the hard-kill backstop.
#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match child.id() {
        // Already reaped; nothing left to signal
        None => Ok(()),
        Some(pid) => {
            kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from)
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

/// Relay one output stream line by line, tagged and colored so operator
/// output stays attributable.
fn relay<R>(out: Output, tag: StreamTag, reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let rendered = relay_line(&out, tag, line.trim_end());
            out.log(&rendered);
        }
    })
}

fn relay_line(out: &Output, tag: StreamTag, line: &str) -> String {
    format!(
        "{}{}{}{}",
        out.color("child.", Color::Grey),
        out.color(tag.name(), tag.color()),
        out.color("  |  ", Color::Grey),
        line
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessSupervisor {
        ProcessSupervisor::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            Output::buffer(),
        )
    }

    #[test]
    fn test_exit_classification() {
        assert_eq!(ExitKind::classify(None), ExitKind::ChangeTriggered);
        assert_eq!(ExitKind::classify(Some(0)), ExitKind::Clean);
        assert_eq!(ExitKind::classify(Some(7)), ExitKind::Failed(7));
    }

    #[test]
    fn test_relay_line_format() {
        let out = Output::buffer();
        assert_eq!(
            relay_line(&out, StreamTag::Stdout, "hello"),
            "child.stdout  |  hello"
        );
        assert_eq!(
            relay_line(&out, StreamTag::Stderr, "oops"),
            "child.stderr  |  oops"
        );
    }

    #[tokio::test]
    async fn test_start_while_live_never_spawns_twice() {
        let mut supervisor = sh("sleep 5");
        supervisor.start();
        assert_eq!(supervisor.spawn_count(), 1);
        assert!(supervisor.is_running());

        // Second start only terminates the first child
        supervisor.start();
        assert_eq!(supervisor.spawn_count(), 1);
        assert!(supervisor.is_running());

        // The signalled child exits; the handle clears and the next start
        // is the deferred respawn.
        let status = supervisor.child.as_mut().unwrap().child.wait().await.ok();
        let kind = supervisor.handle_exit(status);
        assert_eq!(kind, ExitKind::ChangeTriggered);
        assert!(!supervisor.is_running());

        supervisor.start();
        assert_eq!(supervisor.spawn_count(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_term_trapping_child_runs_cleanup_before_restart() {
        let out = Output::buffer();
        let mut supervisor = ProcessSupervisor::new(
            "sh",
            vec![
                "-c".to_string(),
                "trap 'echo cleanup-ran; exit 0' TERM; sleep 5 & wait".to_string(),
            ],
            out.clone(),
        );
        supervisor.start();
        // Let the shell install its trap before signalling
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Kill-and-defer must leave the TERM handler a chance to run
        supervisor.start();
        let status = supervisor.child.as_mut().unwrap().child.wait().await.ok();
        tokio::time::sleep(Duration::from_millis(100)).await;
        supervisor.handle_exit(status);

        // The banner echoes the script text, so match the relayed line
        assert!(out.captured().contains("child.stdout  |  cleanup-ran"));
    }

    #[tokio::test]
    async fn test_restart_after_every_exit_kind() {
        // Clean exit
        let mut supervisor = sh("exit 0");
        supervisor.start();
        let status = supervisor.child.as_mut().unwrap().child.wait().await.ok();
        assert_eq!(supervisor.handle_exit(status), ExitKind::Clean);
        supervisor.start();
        assert_eq!(supervisor.spawn_count(), 2);

        // Failing exit still restarts
        let mut supervisor = sh("exit 3");
        supervisor.start();
        let status = supervisor.child.as_mut().unwrap().child.wait().await.ok();
        assert_eq!(supervisor.handle_exit(status), ExitKind::Failed(3));
        supervisor.start();
        assert_eq!(supervisor.spawn_count(), 2);
    }

    #[tokio::test]
    async fn test_run_loop_restarts_unconditionally() {
        let supervisor =
            sh("exit 0").with_restart_delay(Duration::from_millis(10));
        let spawns = supervisor.spawn_counter();
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(supervisor.run(rx));

        // Initial run comes from the watch supervisor's first callback
        tx.send(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // N consecutive exits mean N+1 spawns; with a 10ms delay the loop
        // has respawned several times by now.
        assert!(spawns.load(Ordering::SeqCst) >= 3);

        task.abort();
    }

    #[tokio::test]
    async fn test_spawn_failure_is_relayed_not_fatal() {
        let out = Output::buffer();
        let mut supervisor =
            ProcessSupervisor::new("xcc-no-such-binary", Vec::new(), out.clone());
        supervisor.start();

        assert_eq!(supervisor.spawn_count(), 0);
        assert!(!supervisor.is_running());
        assert!(out.captured().contains("child.stderr  |  "));
    }

    #[tokio::test]
    async fn test_child_output_is_relayed_with_stream_tags() {
        let out = Output::buffer();
        let mut supervisor = ProcessSupervisor::new(
            "sh",
            vec!["-c".to_string(), "echo out-line; echo err-line >&2".to_string()],
            out.clone(),
        );
        supervisor.start();
        let status = supervisor.child.as_mut().unwrap().child.wait().await.ok();
        // Give the relay tasks a beat to drain before detaching them
        tokio::time::sleep(Duration::from_millis(100)).await;
        supervisor.handle_exit(status);

        let captured = out.captured();
        assert!(captured.contains("child.stdout  |  out-line"));
        assert!(captured.contains("child.stderr  |  err-line"));
    }
}
