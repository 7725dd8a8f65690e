//! Launches the live-reload deploy task and waits for its log to report
//! readiness.
//!
//! Each launch gets a fresh, uniquely named log file under
//! `<tempdir>/tilt/`. A readiness wait binds one [`LogReader`] with a zeroed
//! cursor to that file and races change notifications against a poll timer
//! until the ready pattern matches or the total wait runs out. A timeout is
//! reported, never raised, and the task keeps running.
//!
//! A launch also leaves `<task>.pid` next to its log. Another `kuba` process
//! that finds a live record adopts that run and its log instead of starting a
//! second copy.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::CoordinatorError;
use crate::log_reader::LogReader;
use crate::tasks::TaskRunner;
use crate::utils::write_atomic;
use crate::watch::FileWatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessPhase {
    NotRunning,
    Launching,
    Running,
    ReadyDetected,
    TimedOut,
    Exited,
}

/// Progress of the current readiness wait. Reset by every launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveReadinessState {
    NotStarted,
    ProcessLaunched,
    OutputWatched,
    PatternMatched,
    TimedOut,
}

/// How a readiness wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The ready pattern matched this log line.
    Ready { line: String },
    TimedOut,
    /// The task ended while we were waiting.
    Exited,
    /// No task has been launched, so there is no log to watch.
    NotLaunched,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

/// Who is running a task and where its output goes. Stored as
/// `<scratch>/<task>.pid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRecord {
    pid: u32,
    log_file: PathBuf,
}

struct CoordinatorState {
    phase: ProcessPhase,
    readiness: LiveReadinessState,
    task: Option<String>,
    log_file: Option<PathBuf>,
    /// Bumped for every launch and every exit so a wait can tell that its
    /// log file has been retired.
    generation: u64,
}

pub struct ProcessCoordinator {
    runner: Arc<dyn TaskRunner>,
    scratch_dir: PathBuf,
    start_timeout: Duration,
    state: Mutex<CoordinatorState>,
}

/// Default scratch directory: `<tempdir>/tilt`.
pub fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("tilt")
}

/// A fresh log file path inside `dir`.
pub fn unique_log_path(dir: &Path) -> PathBuf {
    let id = Uuid::new_v4().simple().to_string();
    dir.join(format!("tilt-{}", &id[..8]))
}

impl ProcessCoordinator {
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        scratch_dir: impl Into<PathBuf>,
        start_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            scratch_dir: scratch_dir.into(),
            start_timeout,
            state: Mutex::new(CoordinatorState {
                phase: ProcessPhase::NotRunning,
                readiness: LiveReadinessState::NotStarted,
                task: None,
                log_file: None,
                generation: 0,
            }),
        }
    }

    pub fn phase(&self) -> ProcessPhase {
        self.lock().phase
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.lock().log_file.clone()
    }

    pub fn readiness_state(&self) -> LiveReadinessState {
        self.lock().readiness
    }

    /// Launch `task_id` unless it is already running, here or in another
    /// process with a live run record. Returns whether this call launched it.
    pub async fn ensure_running(&self, task_id: &str) -> Result<bool, CoordinatorError> {
        if self.runner.is_running(task_id) {
            debug!("Task {} already running", task_id);
            return Ok(false);
        }
        if let Some(record) = self.live_record(task_id).await {
            info!(
                "Task {} already running as pid {}, following {}",
                task_id,
                record.pid,
                record.log_file.display()
            );
            self.track(task_id, record.log_file);
            return Ok(false);
        }
        let task = self
            .runner
            .fetch_task(task_id)
            .await
            .ok_or_else(|| CoordinatorError::UnknownTask(task_id.to_string()))?;

        self.set_phase(ProcessPhase::Launching);
        if let Err(source) = tokio::fs::create_dir_all(&self.scratch_dir).await {
            self.set_phase(ProcessPhase::NotRunning);
            return Err(CoordinatorError::FileSystem {
                path: self.scratch_dir.clone(),
                source,
            });
        }
        let log_file = unique_log_path(&self.scratch_dir);

        let pid = match self.runner.execute(task.tee_into(&log_file)).await {
            Ok(pid) => pid,
            Err(source) => {
                self.set_phase(ProcessPhase::NotRunning);
                return Err(CoordinatorError::Launch {
                    name: task_id.to_string(),
                    source,
                });
            }
        };
        if let Some(pid) = pid {
            self.write_record(task_id, &RunRecord {
                pid,
                log_file: log_file.clone(),
            });
        }

        info!("Task {} running, output in {}", task_id, log_file.display());
        self.track(task_id, log_file);
        Ok(true)
    }

    /// Wait until the current task's log matches `ready_pattern`.
    ///
    /// Waits at most `poll_timeout` for each change notification and at most
    /// the configured start timeout overall.
    pub async fn await_ready(&self, ready_pattern: &Regex, poll_timeout: Duration) -> Readiness {
        let (log_file, task, generation) = {
            let state = self.lock();
            match (&state.log_file, &state.task) {
                (Some(log), Some(task)) => (log.clone(), task.clone(), state.generation),
                _ => {
                    warn!("No deploy task launched; nothing to wait for");
                    return Readiness::NotLaunched;
                }
            }
        };
        let mut ended = self.runner.subscribe_ended();

        let Some(file_name) = log_file.file_name().map(|n| n.to_string_lossy().into_owned())
        else {
            return Readiness::NotLaunched;
        };
        let dir = log_file.parent().unwrap_or(self.scratch_dir.as_path()).to_path_buf();
        let mut watch = FileWatch::spawn(&dir, &file_name);
        let mut reader = LogReader::open(&log_file);
        self.advance(LiveReadinessState::OutputWatched);

        let deadline = Instant::now() + self.start_timeout;
        // Trailing text without a newline, kept so a line split across two
        // reads is matched as a whole.
        let mut partial = String::new();
        let mut watching = true;

        loop {
            match reader.read_new().await {
                Ok(Some(chunk)) => {
                    if let Some(line) = match_chunk(ready_pattern, &mut partial, &chunk) {
                        return self.ready(generation, line);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Reading {} failed: {}", log_file.display(), e),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = poll_timeout.min(deadline - now);
            tokio::select! {
                changed = watch.changed(), if watching => {
                    if changed.is_none() {
                        debug!("No change notifications for {}; polling", log_file.display());
                        watching = false;
                    }
                }
                _ = tokio::time::sleep(wait) => {}
                name = ended.recv() => {
                    if ended_matches(name, &task) {
                        info!("Task {} ended before reporting ready", task);
                        return Readiness::Exited;
                    }
                }
            }
        }

        // Output may stop without a trailing newline.
        if !partial.is_empty() && ready_pattern.is_match(&partial) {
            return self.ready(generation, partial);
        }

        self.advance(LiveReadinessState::TimedOut);
        warn!(
            "No match for '{}' in {} after {:?}",
            ready_pattern.as_str(),
            log_file.display(),
            self.start_timeout
        );
        self.set_phase_if(generation, ProcessPhase::TimedOut);
        Readiness::TimedOut
    }

    /// Called when a task ends: drops the scratch log and returns to
    /// NotRunning. Events for other tasks are ignored.
    pub async fn on_exited(&self, task_id: &str) {
        let log_file = {
            let mut state = self.lock();
            if state.task.as_deref() != Some(task_id) {
                return;
            }
            state.phase = ProcessPhase::Exited;
            state.task = None;
            state.generation += 1;
            state.log_file.take()
        };
        info!("Task {} exited", task_id);
        self.remove_record(task_id).await;

        if let Some(log_file) = log_file
            && let Err(e) = tokio::fs::remove_file(&log_file).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            error!("Could not delete {}: {}", log_file.display(), e);
        }
        self.set_phase(ProcessPhase::NotRunning);
    }

    fn ready(&self, generation: u64, line: String) -> Readiness {
        self.advance(LiveReadinessState::PatternMatched);
        info!("Deploy is ready: {}", line.trim());
        self.set_phase_if(generation, ProcessPhase::ReadyDetected);
        Readiness::Ready { line }
    }

    /// Feed task-ended events from the runner into [`Self::on_exited`].
    pub fn spawn_exit_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut ended = self.runner.subscribe_ended();
        tokio::spawn(async move {
            loop {
                match ended.recv().await {
                    Ok(name) => coordinator.on_exited(&name).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Missed {} task-ended events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, phase: ProcessPhase) {
        self.lock().phase = phase;
    }

    fn advance(&self, to: LiveReadinessState) {
        let mut state = self.lock();
        debug!("readiness: {:?} -> {:?}", state.readiness, to);
        state.readiness = to;
    }

    /// Make `log_file` the current task's output, starting a new generation.
    fn track(&self, task_id: &str, log_file: PathBuf) {
        let mut state = self.lock();
        state.phase = ProcessPhase::Running;
        state.readiness = LiveReadinessState::ProcessLaunched;
        state.task = Some(task_id.to_string());
        state.log_file = Some(log_file);
        state.generation += 1;
    }

    fn record_path(&self, task_id: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}.pid", task_id))
    }

    /// The run record for `task_id` if its process is still alive. A stale
    /// record is removed.
    async fn live_record(&self, task_id: &str) -> Option<RunRecord> {
        let path = self.record_path(task_id);
        let content = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_yaml::from_str::<RunRecord>(&content) {
            Ok(record) if process_alive(record.pid).await => return Some(record),
            Ok(record) => debug!("Run record for {} names dead pid {}", task_id, record.pid),
            Err(e) => warn!("Ignoring unreadable run record {}: {}", path.display(), e),
        }
        self.remove_record(task_id).await;
        None
    }

    fn write_record(&self, task_id: &str, record: &RunRecord) {
        let path = self.record_path(task_id);
        let written = serde_yaml::to_string(record)
            .map_err(std::io::Error::other)
            .and_then(|content| write_atomic(&path, &content));
        if let Err(e) = written {
            warn!("Could not write run record {}: {}", path.display(), e);
        }
    }

    async fn remove_record(&self, task_id: &str) {
        let path = self.record_path(task_id);
        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Could not delete {}: {}", path.display(), e);
        }
    }

    /// Record a wait result unless the task was relaunched or exited meanwhile.
    fn set_phase_if(&self, generation: u64, phase: ProcessPhase) {
        let mut state = self.lock();
        if state.generation == generation {
            state.phase = phase;
        }
    }
}

/// Whether `pid` names a live process we may signal.
async fn process_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

fn ended_matches(event: Result<String, broadcast::error::RecvError>, task: &str) -> bool {
    matches!(event, Ok(name) if name == task)
}

/// Test `chunk` against the pattern line by line, carrying an unterminated
/// final line over to the next chunk. Returns the first matching complete
/// line.
fn match_chunk(pattern: &Regex, partial: &mut String, chunk: &str) -> Option<String> {
    partial.push_str(chunk);
    let complete_len = partial.rfind('\n').map(|i| i + 1).unwrap_or(0);

    let found = partial[..complete_len]
        .lines()
        .find(|line| pattern.is_match(line))
        .map(str::to_string);
    let rest = partial.split_off(complete_len);
    *partial = rest;
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTaskRunner;
    use crate::tasks::TILT_UP;
    use std::io::Write;
    use tempfile::tempdir;

    fn coordinator(runner: Arc<FakeTaskRunner>, dir: &Path, timeout: Duration) -> ProcessCoordinator {
        ProcessCoordinator::new(runner, dir, timeout)
    }

    #[test]
    fn test_match_chunk_waits_for_line_end() {
        let pattern = Regex::new("Forwarding from").unwrap();
        let mut partial = String::new();
        assert_eq!(
            match_chunk(&pattern, &mut partial, "Forwarding from 127.0.0.1:5000 -> 5"),
            None
        );
        assert_eq!(
            match_chunk(&pattern, &mut partial, "000\n"),
            Some("Forwarding from 127.0.0.1:5000 -> 5000".to_string())
        );
        assert!(partial.is_empty());
    }

    #[test]
    fn test_match_chunk_line_split_across_reads() {
        let pattern = Regex::new(r"Forwarding from \d+").unwrap();
        let mut partial = String::new();
        assert_eq!(match_chunk(&pattern, &mut partial, "Building\nForwar"), None);
        assert_eq!(partial, "Forwar");
        assert_eq!(
            match_chunk(&pattern, &mut partial, "ding from 127.0.0.1\n"),
            Some("Forwarding from 127.0.0.1".to_string())
        );
    }

    #[test]
    fn test_unique_log_paths() {
        let dir = Path::new("/tmp/tilt");
        let a = unique_log_path(dir);
        let b = unique_log_path(dir);
        assert_ne!(a, b);
        assert!(a.starts_with(dir));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("tilt-"));
    }

    #[tokio::test]
    async fn test_ensure_running_launches_once() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("tilt");
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = coordinator(runner.clone(), &scratch, Duration::from_millis(50));

        assert!(coordinator.ensure_running(TILT_UP).await.unwrap());
        assert!(!coordinator.ensure_running(TILT_UP).await.unwrap());

        assert_eq!(runner.executed().len(), 1);
        assert!(scratch.is_dir());
        let log = coordinator.log_file().unwrap();
        assert!(log.starts_with(&scratch));
        assert_eq!(runner.executed()[0].output_log.as_deref(), Some(log.as_path()));
        assert_eq!(coordinator.phase(), ProcessPhase::Running);
    }

    #[tokio::test]
    async fn test_ensure_running_unknown_task() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[]));
        let coordinator = coordinator(runner, dir.path(), Duration::from_millis(50));
        let err = coordinator.ensure_running(TILT_UP).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::UnknownTask(_)));
        assert_eq!(coordinator.phase(), ProcessPhase::NotRunning);
    }

    #[tokio::test]
    async fn test_ready_only_after_second_chunk() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = coordinator(runner, dir.path(), Duration::from_secs(5));
        coordinator.ensure_running(TILT_UP).await.unwrap();
        let log = coordinator.log_file().unwrap();
        let pattern = Regex::new("Forwarding from").unwrap();

        let writer = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let mut file = std::fs::File::create(&log).unwrap();
            file.write_all(b"Building image web\n").unwrap();
            file.flush().unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            let appended_at = Instant::now();
            file.write_all(b"Forwarding from 127.0.0.1:5000 -> 5000\n").unwrap();
            file.flush().unwrap();
            appended_at
        };

        let (readiness, appended_at) = tokio::join!(
            coordinator.await_ready(&pattern, Duration::from_millis(20)),
            writer
        );

        assert_eq!(
            readiness,
            Readiness::Ready {
                line: "Forwarding from 127.0.0.1:5000 -> 5000".to_string()
            }
        );
        assert!(Instant::now() >= appended_at);
        assert_eq!(coordinator.phase(), ProcessPhase::ReadyDetected);
    }

    #[tokio::test]
    async fn test_cursor_does_not_reprocess_first_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tilt-1");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"Forwarding disabled\n").unwrap();

        // A pattern that matches text spanning both chunks only if the first
        // chunk were read twice.
        let pattern = Regex::new("disabled\nForwarding disabled").unwrap();
        let mut reader = LogReader::open(&path);
        let mut partial = String::new();
        let first = reader.read_new().await.unwrap().unwrap();
        assert_eq!(match_chunk(&pattern, &mut partial, &first), None);

        file.write_all(b"ok\n").unwrap();
        let second = reader.read_new().await.unwrap().unwrap();
        assert_eq!(second, "ok\n");
        assert_eq!(reader.cursor().offset(), 23);
    }

    #[tokio::test]
    async fn test_times_out_with_bounded_overshoot() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = coordinator(runner.clone(), dir.path(), Duration::from_millis(50));
        coordinator.ensure_running(TILT_UP).await.unwrap();
        std::fs::write(coordinator.log_file().unwrap(), "still building\n").unwrap();
        let pattern = Regex::new("never-going-to-match").unwrap();

        let started = Instant::now();
        let readiness = coordinator
            .await_ready(&pattern, Duration::from_millis(20))
            .await;
        let elapsed = started.elapsed();

        assert_eq!(readiness, Readiness::TimedOut);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);
        assert_eq!(coordinator.phase(), ProcessPhase::TimedOut);
        // The task is left running.
        assert!(runner.terminated().is_empty());
    }

    #[tokio::test]
    async fn test_unterminated_line_checked_at_deadline() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = coordinator(runner, dir.path(), Duration::from_millis(60));
        coordinator.ensure_running(TILT_UP).await.unwrap();
        std::fs::write(coordinator.log_file().unwrap(), "Forwarding from 127.0.0.1:5000").unwrap();
        let pattern = Regex::new("Forwarding from").unwrap();

        let started = Instant::now();
        let readiness = coordinator
            .await_ready(&pattern, Duration::from_millis(20))
            .await;

        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(
            readiness,
            Readiness::Ready {
                line: "Forwarding from 127.0.0.1:5000".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_readiness_state_tracks_wait() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = coordinator(runner, dir.path(), Duration::from_millis(30));
        assert_eq!(coordinator.readiness_state(), LiveReadinessState::NotStarted);

        coordinator.ensure_running(TILT_UP).await.unwrap();
        assert_eq!(coordinator.readiness_state(), LiveReadinessState::ProcessLaunched);

        let pattern = Regex::new("Forwarding").unwrap();
        coordinator.await_ready(&pattern, Duration::from_millis(10)).await;
        assert_eq!(coordinator.readiness_state(), LiveReadinessState::TimedOut);

        std::fs::write(coordinator.log_file().unwrap(), "Forwarding from :5000\n").unwrap();
        coordinator.await_ready(&pattern, Duration::from_millis(10)).await;
        assert_eq!(coordinator.readiness_state(), LiveReadinessState::PatternMatched);
    }

    #[tokio::test]
    async fn test_adopts_run_started_by_another_process() {
        let dir = tempdir().unwrap();
        let first_runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let first = coordinator(first_runner, dir.path(), Duration::from_secs(5));
        assert!(first.ensure_running(TILT_UP).await.unwrap());
        let log = first.log_file().unwrap();
        assert!(dir.path().join("tilt-up.pid").exists());

        // A second session sharing the scratch directory.
        let second_runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let second = coordinator(second_runner.clone(), dir.path(), Duration::from_secs(5));
        assert!(!second.ensure_running(TILT_UP).await.unwrap());

        assert!(second_runner.executed().is_empty());
        assert_eq!(second.log_file(), Some(log.clone()));
        assert_eq!(second.phase(), ProcessPhase::Running);

        std::fs::write(&log, "Forwarding from 127.0.0.1:5000\n").unwrap();
        let pattern = Regex::new("Forwarding").unwrap();
        let readiness = second.await_ready(&pattern, Duration::from_millis(20)).await;
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_stale_run_record_is_replaced() {
        let dir = tempdir().unwrap();
        let record = dir.path().join("tilt-up.pid");
        std::fs::write(&record, "pid: 99999999\nlogFile: /nonexistent/tilt-dead\n").unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = coordinator(runner.clone(), dir.path(), Duration::from_secs(5));

        assert!(coordinator.ensure_running(TILT_UP).await.unwrap());

        assert_eq!(runner.executed().len(), 1);
        let stored: RunRecord =
            serde_yaml::from_str(&std::fs::read_to_string(&record).unwrap()).unwrap();
        assert_eq!(stored.pid, std::process::id());
        assert_eq!(Some(stored.log_file), coordinator.log_file());
    }

    #[tokio::test]
    async fn test_missing_log_file_keeps_polling() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = coordinator(runner, dir.path(), Duration::from_secs(5));
        coordinator.ensure_running(TILT_UP).await.unwrap();
        let log = coordinator.log_file().unwrap();
        assert!(!log.exists());

        let writer = async {
            tokio::time::sleep(Duration::from_millis(80)).await;
            std::fs::write(&log, "Forwarding from 127.0.0.1:5000\n").unwrap();
        };
        let pattern = Regex::new("Forwarding").unwrap();
        let (readiness, _) = tokio::join!(
            coordinator.await_ready(&pattern, Duration::from_millis(1000)),
            writer
        );
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_wait_ends_when_task_exits() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = coordinator(runner.clone(), dir.path(), Duration::from_secs(5));
        coordinator.ensure_running(TILT_UP).await.unwrap();
        let pattern = Regex::new("Forwarding").unwrap();

        let exit = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            runner.finish(TILT_UP);
        };
        let (readiness, _) = tokio::join!(
            coordinator.await_ready(&pattern, Duration::from_millis(20)),
            exit
        );
        assert_eq!(readiness, Readiness::Exited);
    }

    #[tokio::test]
    async fn test_await_ready_without_launch() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = coordinator(runner, dir.path(), Duration::from_millis(50));
        let pattern = Regex::new("x").unwrap();
        assert_eq!(
            coordinator.await_ready(&pattern, Duration::from_millis(10)).await,
            Readiness::NotLaunched
        );
    }

    #[tokio::test]
    async fn test_on_exited_deletes_log_and_resets() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = Arc::new(coordinator(runner.clone(), dir.path(), Duration::from_millis(50)));
        let listener = coordinator.spawn_exit_listener();

        coordinator.ensure_running(TILT_UP).await.unwrap();
        let log = coordinator.log_file().unwrap();
        std::fs::write(&log, "output\n").unwrap();

        coordinator.on_exited("dotnet-build").await;
        assert!(log.exists());

        runner.finish(TILT_UP);
        for _ in 0..100 {
            if coordinator.phase() == ProcessPhase::NotRunning {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(coordinator.phase(), ProcessPhase::NotRunning);
        assert!(!log.exists());
        assert!(!dir.path().join("tilt-up.pid").exists());
        assert!(coordinator.log_file().is_none());

        // Relaunch gets a different file.
        coordinator.ensure_running(TILT_UP).await.unwrap();
        assert_ne!(coordinator.log_file().unwrap(), log);
        listener.abort();
    }

    #[tokio::test]
    async fn test_on_exited_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeTaskRunner::with_tasks(&[TILT_UP]));
        let coordinator = coordinator(runner, dir.path(), Duration::from_millis(50));
        coordinator.ensure_running(TILT_UP).await.unwrap();
        coordinator.on_exited(TILT_UP).await;
        assert_eq!(coordinator.phase(), ProcessPhase::NotRunning);
    }
}
