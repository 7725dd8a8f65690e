//! Named external tasks: the long-running `tilt up` deploy and the build.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

pub const TILT_UP: &str = "tilt-up";
pub const DOTNET_BUILD: &str = "dotnet-build";

/// A runnable task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// When set, combined stdout/stderr is piped through `tee` into this file.
    pub output_log: Option<PathBuf>,
}

impl TaskHandle {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            output_log: None,
        }
    }

    pub fn tee_into(mut self, log: &Path) -> Self {
        self.output_log = Some(log.to_path_buf());
        self
    }

    /// The `sh -c` command line for this task.
    pub fn shell_line(&self) -> String {
        let mut line = std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(log) = &self.output_log {
            line.push_str(&format!(
                " 2>&1 | tee {}",
                shell_quote(&log.to_string_lossy())
            ));
        }
        line
    }
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn fetch_task(&self, name: &str) -> Option<TaskHandle>;

    /// Start `task`. Returns the id of the spawned process when there is one.
    async fn execute(&self, task: TaskHandle) -> std::io::Result<Option<u32>>;

    fn is_running(&self, name: &str) -> bool;

    /// Receives the name of each task as it ends.
    fn subscribe_ended(&self) -> broadcast::Receiver<String>;

    /// Stop a running task. Not running is not an error.
    async fn terminate(&self, name: &str) -> std::io::Result<()>;
}

/// Runs task definitions through `sh -c`.
pub struct ShellTaskRunner {
    definitions: Vec<TaskHandle>,
    working_dir: PathBuf,
    running: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
    ended: broadcast::Sender<String>,
}

impl ShellTaskRunner {
    pub fn new(definitions: Vec<TaskHandle>, working_dir: impl Into<PathBuf>) -> Self {
        let (ended, _) = broadcast::channel(16);
        Self {
            definitions,
            working_dir: working_dir.into(),
            running: Arc::new(Mutex::new(HashMap::new())),
            ended,
        }
    }
}

#[async_trait]
impl TaskRunner for ShellTaskRunner {
    async fn fetch_task(&self, name: &str) -> Option<TaskHandle> {
        self.definitions.iter().find(|t| t.name == name).cloned()
    }

    async fn execute(&self, task: TaskHandle) -> std::io::Result<Option<u32>> {
        let line = task.shell_line();
        info!("Starting task {}: {}", task.name, line);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()?;

        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel();
        if let Ok(mut running) = self.running.lock() {
            running.insert(task.name.clone(), kill_tx);
        }

        let running = self.running.clone();
        let ended = self.ended.clone();
        let name = task.name;
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => info!("Task {} exited with {}", name, status),
                    Err(e) => warn!("Waiting on task {} failed: {}", name, e),
                },
                _ = kill_rx => {
                    debug!("Terminating task {}", name);
                    // The shell pipeline leads its own process group; signal
                    // all of it so `tilt` and `tee` go down with `sh`.
                    if let Some(pid) = child.id() {
                        let _ = Command::new("kill")
                            .args(["-TERM", &format!("-{}", pid)])
                            .status()
                            .await;
                    }
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill task {}: {}", name, e);
                    }
                }
            }
            if let Ok(mut running) = running.lock() {
                running.remove(&name);
            }
            let _ = ended.send(name);
        });
        Ok(pid)
    }

    fn is_running(&self, name: &str) -> bool {
        self.running
            .lock()
            .map(|running| running.contains_key(name))
            .unwrap_or(false)
    }

    fn subscribe_ended(&self) -> broadcast::Receiver<String> {
        self.ended.subscribe()
    }

    async fn terminate(&self, name: &str) -> std::io::Result<()> {
        let kill = self
            .running
            .lock()
            .ok()
            .and_then(|mut running| running.remove(name));
        if let Some(kill) = kill {
            let _ = kill.send(());
        }
        Ok(())
    }
}
