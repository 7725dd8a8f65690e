//! Persistent cache of the resolved context, namespace, pod and container.
//!
//! Stored in `.kuba/selection.yaml` by default and rewritten after every
//! change through a temp file and rename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::{DebugTarget, Stage};
use crate::utils::write_atomic;

/// On-disk form of the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Selection {
    fn slot(&mut self, stage: Stage) -> &mut Option<String> {
        match stage {
            Stage::Context => &mut self.context,
            Stage::Namespace => &mut self.namespace,
            Stage::Pod => &mut self.pod,
            Stage::Container => &mut self.container,
        }
    }

    pub fn get(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Context => self.context.as_deref(),
            Stage::Namespace => self.namespace.as_deref(),
            Stage::Pod => self.pod.as_deref(),
            Stage::Container => self.container.as_deref(),
        }
    }

    /// First stage without a value. A downstream value is never trusted
    /// without all of its upstream values.
    pub fn first_missing(&self) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| self.get(*s).is_none())
    }

    pub fn target(&self) -> Option<DebugTarget> {
        Some(DebugTarget {
            context: self.context.clone()?,
            namespace: self.namespace.clone()?,
            pod: self.pod.clone()?,
            container: self.container.clone()?,
        })
    }
}

pub struct SelectionCache {
    state: RwLock<Selection>,
    path: Option<PathBuf>,
}

impl SelectionCache {
    /// An empty cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(Selection::default()),
            path: None,
        }
    }

    /// Load the cache persisted by a previous session. A missing file is an
    /// empty cache; a corrupt one is logged and discarded.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let selection = match read_selection(&path) {
            Ok(Some(selection)) => {
                debug!("Loaded selection from {}", path.display());
                sanitize(selection)
            }
            Ok(None) => Selection::default(),
            Err(e) => {
                warn!("Ignoring unreadable selection state: {}", e);
                Selection::default()
            }
        };
        Self {
            state: RwLock::new(selection),
            path: Some(path),
        }
    }

    pub fn get(&self, stage: Stage) -> Option<String> {
        self.read().get(stage).map(str::to_string)
    }

    /// Replace one field. Empty strings are stored as unset.
    pub fn set(&self, stage: Stage, value: Option<String>) {
        let value = value.filter(|v| !v.is_empty());
        let snapshot = {
            let mut state = self.write();
            *state.slot(stage) = value;
            state.updated_at = Some(Utc::now());
            state.clone()
        };
        self.persist(&snapshot);
    }

    /// Clear `stage` and every stage after it.
    pub fn clear_from(&self, stage: Stage) {
        let snapshot = {
            let mut state = self.write();
            for s in stage.and_downstream() {
                *state.slot(*s) = None;
            }
            state.updated_at = Some(Utc::now());
            state.clone()
        };
        self.persist(&snapshot);
    }

    pub fn reset(&self) {
        self.clear_from(Stage::Context);
    }

    pub fn snapshot(&self) -> Selection {
        self.read().clone()
    }

    /// Cached value for `stage`, or the non-empty result of `resolve`, which
    /// is stored before returning. Returns an empty string when `resolve`
    /// produces nothing.
    pub async fn get_or_resolve<F, Fut>(&self, stage: Stage, resolve: F) -> String
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        if let Some(cached) = self.get(stage) {
            return cached;
        }
        match resolve().await.filter(|v| !v.is_empty()) {
            Some(value) => {
                self.set(stage, Some(value.clone()));
                value
            }
            None => {
                debug!("No value resolved for {}", stage);
                String::new()
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Selection> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Selection> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, selection: &Selection) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_selection(path, selection) {
            warn!("Could not persist selection: {}", e);
        }
    }
}

fn sanitize(mut selection: Selection) -> Selection {
    for stage in Stage::ALL {
        let slot = selection.slot(stage);
        if slot.as_deref() == Some("") {
            *slot = None;
        }
    }
    selection
}

fn read_selection(path: &Path) -> Result<Option<Selection>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(serde_yaml::from_str(&content)?))
}

fn write_selection(path: &Path, selection: &Selection) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let content = serde_yaml::to_string(selection)?;
    write_atomic(path, &content).map_err(io_err)?;
    Ok(())
}
