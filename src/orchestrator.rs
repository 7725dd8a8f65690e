//! Attach flow: cached target validation, resolution on a miss, optional
//! readiness gate, debugger launch.

use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cluster::{ClusterQuery, QueryFilter, ResourceKind};
use crate::coordinator::{ProcessCoordinator, Readiness};
use crate::error::AttachError;
use crate::launch::{DebugConfiguration, DebugLauncher};
use crate::notify::Notifier;
use crate::resolver::Resolver;
use crate::selection::SelectionCache;
use crate::types::{DebugTarget, Stage};

/// Readiness gate applied before launching the debugger.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    pub task_name: String,
    pub ready_pattern: Regex,
    pub poll_timeout: Duration,
}

#[derive(Debug)]
pub struct AttachOutcome {
    pub target: DebugTarget,
    pub configuration: DebugConfiguration,
    /// Whether the cached target was used without running the resolver.
    pub from_cache: bool,
    /// Result of the readiness gate, when one ran.
    pub readiness: Option<Readiness>,
    /// Whether this attach launched the deploy task.
    pub launched_task: bool,
}

pub struct AttachOrchestrator {
    query: Arc<dyn ClusterQuery>,
    cache: Arc<SelectionCache>,
    resolver: Arc<Resolver>,
    coordinator: Arc<ProcessCoordinator>,
    launcher: Arc<dyn DebugLauncher>,
    notifier: Arc<dyn Notifier>,
    template: DebugConfiguration,
    gate: Option<ReadinessGate>,
}

impl AttachOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        query: Arc<dyn ClusterQuery>,
        cache: Arc<SelectionCache>,
        resolver: Arc<Resolver>,
        coordinator: Arc<ProcessCoordinator>,
        launcher: Arc<dyn DebugLauncher>,
        notifier: Arc<dyn Notifier>,
        template: DebugConfiguration,
        gate: Option<ReadinessGate>,
    ) -> Self {
        Self {
            query,
            cache,
            resolver,
            coordinator,
            launcher,
            notifier,
            template,
            gate,
        }
    }

    pub async fn attach(&self) -> Result<AttachOutcome, AttachError> {
        let (target, from_cache) = match self.validated_cache().await {
            Some(target) => (target, true),
            None => {
                let start = self
                    .cache
                    .snapshot()
                    .first_missing()
                    .unwrap_or(Stage::Context);
                let target = self.resolver.resolve(start).await.map_err(|e| {
                    info!("Attach stopped: {}", e);
                    AttachError::from(e)
                })?;
                (target, false)
            }
        };
        info!("Debug target: {}", target);

        let mut launched_task = false;
        let mut readiness = None;
        if let Some(gate) = &self.gate
            && let Some(launched) = self.ensure_deploy(gate).await
        {
            launched_task = launched;
            readiness = Some(self.wait_for_deploy(gate).await);
        }

        let configuration = self.template.clone().attach_to(&target);
        self.launcher
            .launch(&configuration)
            .await
            .map_err(AttachError::Launch)?;

        Ok(AttachOutcome {
            target,
            configuration,
            from_cache,
            readiness,
            launched_task,
        })
    }

    /// Clear the cached selection. Safe to call repeatedly.
    pub fn reset_selection(&self) {
        self.cache.reset();
        info!("Selection cleared");
    }

    /// The cached target if it still names a live container. A complete but
    /// stale record is cleared entirely.
    async fn validated_cache(&self) -> Option<DebugTarget> {
        let snapshot = self.cache.snapshot();
        let Some(target) = snapshot.target() else {
            debug!("Cache incomplete, first missing: {:?}", snapshot.first_missing());
            return None;
        };

        let filter =
            QueryFilter::containers_of(&target.context, &target.namespace, &target.pod)
                .ignoring_missing();
        let live = match self.query.list_names(ResourceKind::Containers, &filter).await {
            Ok(names) => names,
            Err(e) => {
                error!("Validating cached target {} failed: {}", target, e);
                self.notifier.error(&e.to_string());
                Vec::new()
            }
        };

        if live.iter().any(|c| *c == target.container) {
            debug!("Cached target {} is live", target);
            return Some(target);
        }
        warn!("Cached target {} no longer exists", target);
        self.cache.reset();
        None
    }

    /// Whether this call launched the deploy task, or `None` when it could
    /// not be started. The attach goes ahead without a readiness wait then.
    async fn ensure_deploy(&self, gate: &ReadinessGate) -> Option<bool> {
        match self.coordinator.ensure_running(&gate.task_name).await {
            Ok(launched) => Some(launched),
            Err(e) => {
                error!("Could not start {}: {}", gate.task_name, e);
                self.notifier.error(&e.to_string());
                None
            }
        }
    }

    async fn wait_for_deploy(&self, gate: &ReadinessGate) -> Readiness {
        let readiness = self
            .coordinator
            .await_ready(&gate.ready_pattern, gate.poll_timeout)
            .await;
        match &readiness {
            Readiness::Ready { .. } => {}
            Readiness::TimedOut => self
                .notifier
                .info(&format!("{} did not report ready in time, assuming ready", gate.task_name)),
            Readiness::Exited => self
                .notifier
                .error(&format!("{} exited before reporting ready", gate.task_name)),
            Readiness::NotLaunched => self.notifier.info(&format!(
                "{} is running without a log to watch, assuming ready",
                gate.task_name
            )),
        }
        readiness
    }
}
