//! Settings file (`kuba.yaml`).
//!
//! Every key is optional. A missing file yields the defaults; a file that
//! does not parse, or whose ready pattern is not a valid regex, is rejected
//! at startup.

use anyhow::Context as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::launch::DEFAULT_DEBUGGER_PATH;
use crate::resolver::ResolverSettings;
use crate::tasks::{DOTNET_BUILD, TILT_UP, TaskHandle};

pub const DEFAULT_CONFIG_FILE: &str = "kuba.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub tilt: TiltSettings,
    pub debug: DebugSettings,
    pub build: BuildSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TiltSettings {
    /// Matched against the deploy log to decide the app is reachable.
    #[serde(rename = "appReadyRegEx")]
    pub app_ready_regex: String,
    pub up_before_attach: bool,
    pub tiltfile_path: PathBuf,
    pub task_name: String,
}

impl Default for TiltSettings {
    fn default() -> Self {
        Self {
            app_ready_regex: "Forwarding from".to_string(),
            up_before_attach: false,
            tiltfile_path: PathBuf::from("Tiltfile"),
            task_name: TILT_UP.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebugSettings {
    pub tilt_up_start_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub auto_pick_delay_ms: u64,
    pub auto_pick_on_single_item: bool,
    pub attach_namespace: Option<String>,
    pub attach_kubernetes_context: Option<String>,
    pub debugger_path: String,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            tilt_up_start_timeout_ms: 30_000,
            poll_interval_ms: 500,
            auto_pick_delay_ms: 1000,
            auto_pick_on_single_item: true,
            attach_namespace: None,
            attach_kubernetes_context: None,
            debugger_path: DEFAULT_DEBUGGER_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildSettings {
    pub relative_src_dir: PathBuf,
    pub relative_build_output_dir: PathBuf,
    pub task_name: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            relative_src_dir: PathBuf::from("src"),
            relative_build_output_dir: PathBuf::from("dev/bin"),
            task_name: DOTNET_BUILD.to_string(),
        }
    }
}

impl Settings {
    /// Read settings from `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        let settings = Self::parse(&text).with_context(|| format!("parsing {}", path.display()))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        // An empty document deserializes as null.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(text)?;
        settings.ready_pattern()?;
        Ok(settings)
    }

    pub fn ready_pattern(&self) -> anyhow::Result<Regex> {
        Regex::new(&self.tilt.app_ready_regex)
            .with_context(|| format!("invalid appReadyRegEx '{}'", self.tilt.app_ready_regex))
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.debug.tilt_up_start_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.debug.poll_interval_ms)
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            auto_pick_on_single_item: self.debug.auto_pick_on_single_item,
            auto_pick_delay: Duration::from_millis(self.debug.auto_pick_delay_ms),
            preferred_context: non_empty(&self.debug.attach_kubernetes_context),
            preferred_namespace: non_empty(&self.debug.attach_namespace),
        }
    }

    /// The deploy and build tasks, with paths resolved against `workspace`.
    pub fn task_definitions(&self, workspace: &Path) -> Vec<TaskHandle> {
        let tiltfile = workspace.join(&self.tilt.tiltfile_path);
        let tilt_up = TaskHandle::new(
            self.tilt.task_name.clone(),
            "tilt",
            vec![
                "up".to_string(),
                format!("--file={}", tiltfile.display()),
                "--hud=false".to_string(),
                "--debug=true".to_string(),
            ],
        );
        let build = TaskHandle::new(
            self.build.task_name.clone(),
            "dotnet",
            vec![
                "build".to_string(),
                workspace.join(&self.build.relative_src_dir).display().to_string(),
                "/property:GenerateFullPaths=true".to_string(),
                "/consoleloggerparameters:NoSummary".to_string(),
                "--output".to_string(),
                workspace
                    .join(&self.build.relative_build_output_dir)
                    .display()
                    .to_string(),
            ],
        );
        vec![tilt_up, build]
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}
