//! Test doubles for the injected collaborators.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc};

use crate::cluster::{ClusterQuery, QueryFilter, ResourceKind};
use crate::error::QueryError;
use crate::launch::{DebugConfiguration, DebugLauncher};
use crate::notify::Notifier;
use crate::picker::{PickOptions, Picker};
use crate::tasks::{TaskHandle, TaskRunner};

/// In-memory cluster keyed by namespace and pod.
#[derive(Default)]
pub struct FakeCluster {
    contexts: Vec<String>,
    namespaces: Vec<String>,
    pods: HashMap<String, Vec<String>>,
    containers: HashMap<(String, String), Vec<String>>,
    failure: Option<String>,
    current: Mutex<Option<String>>,
    calls: Mutex<Vec<(ResourceKind, QueryFilter)>>,
    switches: Mutex<Vec<String>>,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl FakeCluster {
    pub fn with_contexts(mut self, names: &[&str]) -> Self {
        self.contexts = owned(names);
        self
    }

    pub fn with_namespaces(mut self, names: &[&str]) -> Self {
        self.namespaces = owned(names);
        self
    }

    pub fn with_pods(mut self, namespace: &str, names: &[&str]) -> Self {
        self.pods.insert(namespace.to_string(), owned(names));
        self
    }

    pub fn with_containers(mut self, namespace: &str, pod: &str, names: &[&str]) -> Self {
        self.containers
            .insert((namespace.to_string(), pod.to_string()), owned(names));
        self
    }

    /// Every list query fails with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(ResourceKind, QueryFilter)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn context_switches(&self) -> Vec<String> {
        self.switches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterQuery for FakeCluster {
    async fn list_names(
        &self,
        kind: ResourceKind,
        filter: &QueryFilter,
    ) -> Result<Vec<String>, QueryError> {
        self.calls.lock().unwrap().push((kind, filter.clone()));
        if let Some(message) = &self.failure {
            return Err(QueryError::Failed {
                message: message.clone(),
            });
        }
        let namespace = filter.namespace.clone().unwrap_or_default();
        Ok(match kind {
            ResourceKind::Contexts => self.contexts.clone(),
            ResourceKind::Namespaces => self.namespaces.clone(),
            ResourceKind::Pods => self.pods.get(&namespace).cloned().unwrap_or_default(),
            ResourceKind::Containers => {
                let pod = filter.pod.clone().unwrap_or_default();
                match self.containers.get(&(namespace, pod.clone())) {
                    Some(names) => names.clone(),
                    None if filter.ignore_missing => Vec::new(),
                    None => {
                        return Err(QueryError::Failed {
                            message: format!("pods \"{}\" not found", pod),
                        });
                    }
                }
            }
        })
    }

    async fn current_context(&self) -> Result<String, QueryError> {
        let current = self.current.lock().unwrap().clone();
        current
            .or_else(|| self.contexts.first().cloned())
            .ok_or_else(|| QueryError::Failed {
                message: "current-context is not set".to_string(),
            })
    }

    async fn set_current_context(&self, name: &str) -> Result<(), QueryError> {
        self.switches.lock().unwrap().push(name.to_string());
        *self.current.lock().unwrap() = Some(name.to_string());
        Ok(())
    }
}

/// Answers picker prompts from a script, or holds each prompt open until the
/// test releases it.
pub struct ScriptedPicker {
    script: Mutex<VecDeque<String>>,
    blocking: bool,
    answers_tx: mpsc::UnboundedSender<Option<String>>,
    answers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<String>>>,
    shown_signal: Notify,
    shown: Mutex<Vec<PickOptions>>,
    previews: Mutex<Vec<(String, Duration)>>,
}

impl ScriptedPicker {
    fn build(script: &[&str], blocking: bool) -> Self {
        let (answers_tx, answers_rx) = mpsc::unbounded_channel();
        Self {
            script: Mutex::new(script.iter().map(|s| s.to_string()).collect()),
            blocking,
            answers_tx,
            answers_rx: tokio::sync::Mutex::new(answers_rx),
            shown_signal: Notify::new(),
            shown: Mutex::new(Vec::new()),
            previews: Mutex::new(Vec::new()),
        }
    }

    /// Picks the scripted answers in order, then cancels.
    pub fn choosing(script: &[&str]) -> Self {
        Self::build(script, false)
    }

    pub fn blocking() -> Self {
        Self::build(&[], true)
    }

    pub async fn wait_until_shown(&self) {
        self.shown_signal.notified().await;
    }

    pub fn release(&self, answer: Option<String>) {
        let _ = self.answers_tx.send(answer);
    }

    pub fn shown(&self) -> Vec<PickOptions> {
        self.shown.lock().unwrap().clone()
    }

    pub fn shown_count(&self) -> usize {
        self.shown.lock().unwrap().len()
    }

    pub fn previews(&self) -> Vec<(String, Duration)> {
        self.previews.lock().unwrap().clone()
    }
}

#[async_trait]
impl Picker for ScriptedPicker {
    async fn show(&self, options: &PickOptions) -> Option<String> {
        self.shown.lock().unwrap().push(options.clone());
        if self.blocking {
            self.shown_signal.notify_one();
            return self.answers_rx.lock().await.recv().await.flatten();
        }
        self.script.lock().unwrap().pop_front()
    }

    async fn preview_auto_pick(&self, _options: &PickOptions, choice: &str, delay: Duration) {
        self.previews
            .lock()
            .unwrap()
            .push((choice.to_string(), delay));
        tokio::time::sleep(delay).await;
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    infos: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }
}

/// Task runner that never spawns anything. Tests end tasks with
/// [`FakeTaskRunner::finish`].
pub struct FakeTaskRunner {
    definitions: Vec<TaskHandle>,
    running: Mutex<HashSet<String>>,
    executed: Mutex<Vec<TaskHandle>>,
    terminated: Mutex<Vec<String>>,
    ended: broadcast::Sender<String>,
}

impl FakeTaskRunner {
    pub fn with_tasks(names: &[&str]) -> Self {
        let (ended, _) = broadcast::channel(16);
        Self {
            definitions: names
                .iter()
                .map(|name| TaskHandle::new(*name, "true", Vec::new()))
                .collect(),
            running: Mutex::new(HashSet::new()),
            executed: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            ended,
        }
    }

    /// Mark `name` as already running, as if started outside this session.
    pub fn already_running(self, name: &str) -> Self {
        self.running.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn finish(&self, name: &str) {
        self.running.lock().unwrap().remove(name);
        let _ = self.ended.send(name.to_string());
    }

    pub fn executed(&self) -> Vec<TaskHandle> {
        self.executed.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskRunner for FakeTaskRunner {
    async fn fetch_task(&self, name: &str) -> Option<TaskHandle> {
        self.definitions.iter().find(|t| t.name == name).cloned()
    }

    /// Reports the test process itself, so run records name a live pid.
    async fn execute(&self, task: TaskHandle) -> std::io::Result<Option<u32>> {
        self.running.lock().unwrap().insert(task.name.clone());
        self.executed.lock().unwrap().push(task);
        Ok(Some(std::process::id()))
    }

    fn is_running(&self, name: &str) -> bool {
        self.running.lock().unwrap().contains(name)
    }

    fn subscribe_ended(&self) -> broadcast::Receiver<String> {
        self.ended.subscribe()
    }

    async fn terminate(&self, name: &str) -> std::io::Result<()> {
        self.terminated.lock().unwrap().push(name.to_string());
        self.finish(name);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<DebugConfiguration>>,
}

impl RecordingLauncher {
    pub fn launched(&self) -> Vec<DebugConfiguration> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl DebugLauncher for RecordingLauncher {
    async fn launch(&self, config: &DebugConfiguration) -> anyhow::Result<()> {
        self.launched.lock().unwrap().push(config.clone());
        Ok(())
    }
}
