//! The context → namespace → pod → container selection wizard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cluster::{ClusterQuery, QueryFilter, ResourceKind};
use crate::error::ResolveError;
use crate::notify::Notifier;
use crate::picker::{PickOptions, Picker};
use crate::selection::SelectionCache;
use crate::types::{DebugTarget, Stage};

/// Visible pause before an automatic choice is committed.
pub const DEFAULT_AUTO_PICK_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Idle,
    Loading,
    Resolved,
    Cancelled,
}

/// Per-stage preferences for automatic selection.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub auto_pick_on_single_item: bool,
    pub auto_pick_delay: Duration,
    pub preferred_context: Option<String>,
    pub preferred_namespace: Option<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            auto_pick_on_single_item: true,
            auto_pick_delay: DEFAULT_AUTO_PICK_DELAY,
            preferred_context: None,
            preferred_namespace: None,
        }
    }
}

impl ResolverSettings {
    fn preferred(&self, stage: Stage) -> Option<String> {
        match stage {
            Stage::Context => self.preferred_context.clone(),
            Stage::Namespace => self.preferred_namespace.clone(),
            Stage::Pod | Stage::Container => None,
        }
    }
}

pub struct Resolver {
    query: Arc<dyn ClusterQuery>,
    picker: Arc<dyn Picker>,
    cache: Arc<SelectionCache>,
    notifier: Arc<dyn Notifier>,
    settings: ResolverSettings,
    in_flight: AtomicBool,
    states: Mutex<HashMap<Stage, StageState>>,
}

/// Clears the in-flight flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Resolver {
    pub fn new(
        query: Arc<dyn ClusterQuery>,
        picker: Arc<dyn Picker>,
        cache: Arc<SelectionCache>,
        notifier: Arc<dyn Notifier>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            query,
            picker,
            cache,
            notifier,
            settings,
            in_flight: AtomicBool::new(false),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn stage_state(&self, stage: Stage) -> StageState {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(&stage).copied())
            .unwrap_or(StageState::Idle)
    }

    /// Run the wizard from `start` through the container stage.
    ///
    /// Upstream values are taken from the cache; if one is missing the run
    /// starts at that earlier stage instead. Each stage is committed to the
    /// cache before the next one is queried. A cached value is only replaced
    /// by a committed choice, so a cancelled run leaves it in place.
    pub async fn resolve(&self, start: Stage) -> Result<DebugTarget, ResolveError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejected resolve request: another resolution is in progress");
            return Err(ResolveError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.in_flight);

        let start = match self.cache.snapshot().first_missing() {
            Some(missing) if missing < start => missing,
            _ => start,
        };
        self.reset_states(start);
        info!("Resolving debug target from the {} stage", start);

        let mut stage = Some(start);
        while let Some(current) = stage {
            self.run_stage(current).await?;
            stage = current.next();
        }

        // Every stage committed a non-empty value above.
        self.cache
            .snapshot()
            .target()
            .ok_or(ResolveError::Cancelled {
                stage: Stage::Container,
            })
    }

    async fn run_stage(&self, stage: Stage) -> Result<(), ResolveError> {
        let previous = self.cache.get(stage);
        let choice = match &previous {
            // Re-asked; the old value stays until a new one is committed.
            Some(_) => match self.pick(stage).await.filter(|v| !v.is_empty()) {
                Some(choice) => {
                    self.cache.set(stage, Some(choice.clone()));
                    choice
                }
                None => String::new(),
            },
            None => {
                self.cache
                    .get_or_resolve(stage, || self.pick(stage))
                    .await
            }
        };
        if choice.is_empty() {
            self.set_state(stage, StageState::Cancelled);
            info!("Resolution cancelled at the {} stage", stage);
            return Err(ResolveError::Cancelled { stage });
        }
        self.set_state(stage, StageState::Resolved);
        debug!("Committed {} '{}'", stage, choice);

        // Downstream values were chosen under the old value.
        if previous.as_deref() != Some(choice.as_str())
            && let Some(next) = stage.next()
        {
            self.cache.clear_from(next);
        }

        if stage == Stage::Context
            && let Err(e) = self.query.set_current_context(&choice).await
        {
            error!("Failed to switch to context {}: {}", choice, e);
            self.notifier
                .error(&format!("Could not switch to context {}: {}", choice, e));
        }
        Ok(())
    }

    async fn pick(&self, stage: Stage) -> Option<String> {
        self.set_state(stage, StageState::Loading);
        let items = self.load_items(stage).await;

        let mut options = PickOptions::for_stage(stage, items);
        options.auto_pick_on_single_item = self.settings.auto_pick_on_single_item;
        options.auto_select_on_name = self.settings.preferred(stage);

        match options.auto_choice().map(str::to_string) {
            Some(auto) => {
                debug!("Auto-selecting {} '{}'", stage, auto);
                self.picker
                    .preview_auto_pick(&options, &auto, self.settings.auto_pick_delay)
                    .await;
                Some(auto)
            }
            None => self.picker.show(&options).await,
        }
    }

    /// Candidates for `stage`. A failed query is reported and yields an empty
    /// list, which leaves the user with an empty picker to cancel.
    async fn load_items(&self, stage: Stage) -> Vec<String> {
        let snapshot = self.cache.snapshot();
        let filter = QueryFilter {
            context: snapshot.context.clone(),
            namespace: snapshot.namespace.clone(),
            pod: snapshot.pod.clone(),
            ignore_missing: false,
        };
        let kind = match stage {
            Stage::Context => ResourceKind::Contexts,
            Stage::Namespace => ResourceKind::Namespaces,
            Stage::Pod => ResourceKind::Pods,
            Stage::Container => ResourceKind::Containers,
        };
        match self.query.list_names(kind, &filter).await {
            Ok(names) => {
                debug!("Loaded {} {}", names.len(), kind);
                names
            }
            Err(e) => {
                error!("Listing {} failed: {}", kind, e);
                self.notifier.error(&e.to_string());
                Vec::new()
            }
        }
    }

    fn set_state(&self, stage: Stage, state: StageState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(stage, state);
        }
    }

    fn reset_states(&self, start: Stage) {
        if let Ok(mut states) = self.states.lock() {
            for stage in start.and_downstream() {
                states.insert(*stage, StageState::Idle);
            }
        }
    }
}
