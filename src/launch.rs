//! Debugger launch configuration handed to the IDE.

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use crate::types::DebugTarget;

pub const CONFIGURATION_NAME: &str = ".NET Core Attach to K8s (Kuba)";
pub const DEFAULT_DEBUGGER_PATH: &str = "/root/vsdbg/vsdbg";

/// How the debug adapter reaches the debugger inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeTransport {
    pub pipe_program: String,
    pub pipe_args: Vec<String>,
    pub pipe_cwd: String,
    pub debugger_path: String,
    pub quote_args: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugConfiguration {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub request: String,
    pub process_id: String,
    pub just_my_code: bool,
    pub pipe_transport: PipeTransport,
    pub source_file_map: BTreeMap<String, String>,
}

impl DebugConfiguration {
    /// The attach template with empty pipe arguments.
    pub fn template(debugger_path: &str) -> Self {
        let source = "${workspaceFolder}/src".to_string();
        Self {
            name: CONFIGURATION_NAME.to_string(),
            kind: "coreclr".to_string(),
            request: "attach".to_string(),
            process_id: "${command:pickRemoteProcess}".to_string(),
            just_my_code: true,
            pipe_transport: PipeTransport {
                pipe_program: "kubectl".to_string(),
                pipe_args: Vec::new(),
                pipe_cwd: "${workspaceFolder}".to_string(),
                debugger_path: debugger_path.to_string(),
                quote_args: false,
            },
            source_file_map: BTreeMap::from([
                ("/src".to_string(), source.clone()),
                ("/app".to_string(), source),
            ]),
        }
    }

    /// Point the pipe transport at `target` through `kubectl exec`.
    pub fn attach_to(mut self, target: &DebugTarget) -> Self {
        self.pipe_transport.pipe_args = pipe_args(target);
        self
    }
}

/// `kubectl` arguments that open a stdio pipe into the target container.
pub fn pipe_args(target: &DebugTarget) -> Vec<String> {
    [
        "exec",
        "-i",
        target.pod.as_str(),
        "-n",
        target.namespace.as_str(),
        "-c",
        target.container.as_str(),
        "--",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Receives the finished launch configuration.
#[async_trait]
pub trait DebugLauncher: Send + Sync {
    async fn launch(&self, config: &DebugConfiguration) -> anyhow::Result<()>;
}

/// Prints the configuration as JSON on stdout.
pub struct StdoutLauncher;

#[async_trait]
impl DebugLauncher for StdoutLauncher {
    async fn launch(&self, config: &DebugConfiguration) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(config)?);
        Ok(())
    }
}

/// Writes the configuration as JSON to a file.
pub struct FileLauncher {
    path: PathBuf,
}

impl FileLauncher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DebugLauncher for FileLauncher {
    async fn launch(&self, config: &DebugConfiguration) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;
        info!("Wrote launch configuration to {}", self.path.display());
        Ok(())
    }
}
