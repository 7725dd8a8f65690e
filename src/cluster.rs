//! Read-only cluster queries used to fill the selection wizard.
//!
//! Two backends are provided: [`KubectlQuery`] shells out to kubectl with
//! name-only output, [`KubeApiQuery`] talks to the API server through kube-rs
//! using the same kubeconfig.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, ResourceExt};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::QueryError;
use crate::utils::write_atomic;

/// Timeout for a single kubectl invocation.
const KUBECTL_TIMEOUT: Duration = Duration::from_secs(15);

/// Fallback locations when kubectl is not on PATH.
const KUBECTL_PATHS: &[&str] = &[
    "/opt/homebrew/bin/kubectl",
    "/usr/local/bin/kubectl",
    "/usr/bin/kubectl",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Contexts,
    Namespaces,
    Pods,
    Containers,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Contexts => "contexts",
            ResourceKind::Namespaces => "namespaces",
            ResourceKind::Pods => "pods",
            ResourceKind::Containers => "containers",
        };
        f.write_str(name)
    }
}

/// Upstream identifiers that parameterize a list query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub pod: Option<String>,
    /// A missing pod yields an empty container list instead of an error.
    pub ignore_missing: bool,
}

impl QueryFilter {
    pub fn containers_of(context: &str, namespace: &str, pod: &str) -> Self {
        Self {
            context: Some(context.to_string()),
            namespace: Some(namespace.to_string()),
            pod: Some(pod.to_string()),
            ignore_missing: false,
        }
    }

    pub fn ignoring_missing(mut self) -> Self {
        self.ignore_missing = true;
        self
    }
}

#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// Bare names of every object of `kind` matching `filter`.
    async fn list_names(
        &self,
        kind: ResourceKind,
        filter: &QueryFilter,
    ) -> Result<Vec<String>, QueryError>;

    async fn current_context(&self) -> Result<String, QueryError>;

    /// Switch the active context. Not retried on failure.
    async fn set_current_context(&self, name: &str) -> Result<(), QueryError>;
}

/// Parse name-only output, dropping any `kind/` qualifier.
///
/// Handles both `-o name` (one `kind/name` per line) and jsonpath output
/// (space separated names). Context names are taken verbatim, one per line,
/// since cloud provider contexts may contain slashes.
pub fn parse_names(kind: ResourceKind, output: &str) -> Vec<String> {
    if kind == ResourceKind::Contexts {
        return output
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
    }
    output
        .split_whitespace()
        .map(|item| item.split_once('/').map_or(item, |(_, name)| name))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Queries through the kubectl binary.
pub struct KubectlQuery {
    kubectl_path: Option<PathBuf>,
}

impl KubectlQuery {
    pub fn new() -> Self {
        Self {
            kubectl_path: find_kubectl(),
        }
    }

    pub fn with_path(kubectl_path: PathBuf) -> Self {
        Self {
            kubectl_path: Some(kubectl_path),
        }
    }

    /// Arguments for a list query, excluding the kubectl binary itself.
    pub fn list_args(kind: ResourceKind, filter: &QueryFilter) -> Vec<String> {
        let mut args: Vec<String> = match &filter.context {
            Some(ctx) if kind != ResourceKind::Contexts => vec![format!("--context={}", ctx)],
            _ => Vec::new(),
        };
        match kind {
            ResourceKind::Contexts => {
                args.extend(["config", "get-contexts", "-o", "name"].map(String::from));
            }
            ResourceKind::Namespaces => {
                args.extend(["get", "namespaces", "-o", "name"].map(String::from));
            }
            ResourceKind::Pods => {
                args.extend(["get", "pods"].map(String::from));
                if let Some(ns) = &filter.namespace {
                    args.extend(["-n".to_string(), ns.clone()]);
                }
                args.extend(["-o", "name"].map(String::from));
            }
            ResourceKind::Containers => {
                args.extend(["get".to_string(), "pod".to_string()]);
                args.push(filter.pod.clone().unwrap_or_default());
                if let Some(ns) = &filter.namespace {
                    args.extend(["-n".to_string(), ns.clone()]);
                }
                if filter.ignore_missing {
                    args.push("--ignore-not-found".to_string());
                }
                args.extend(["-o", "jsonpath={.spec.containers[*].name}"].map(String::from));
            }
        }
        args
    }

    /// Runs kubectl and returns stdout. Anything on stderr is a failure.
    async fn execute_kubectl(&self, args: &[String]) -> Result<String, QueryError> {
        let kubectl_path = self
            .kubectl_path
            .as_ref()
            .ok_or(QueryError::KubectlNotFound)?;

        debug!("kubectl {}", args.join(" "));
        let output = timeout(KUBECTL_TIMEOUT, Command::new(kubectl_path).args(args).output())
            .await
            .map_err(|_| QueryError::Timeout)??;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() || !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!("kubectl exited with {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            return Err(QueryError::Failed { message });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for KubectlQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterQuery for KubectlQuery {
    async fn list_names(
        &self,
        kind: ResourceKind,
        filter: &QueryFilter,
    ) -> Result<Vec<String>, QueryError> {
        let stdout = self.execute_kubectl(&Self::list_args(kind, filter)).await?;
        Ok(parse_names(kind, &stdout))
    }

    async fn current_context(&self) -> Result<String, QueryError> {
        let args = ["config", "current-context"].map(String::from);
        Ok(self.execute_kubectl(&args).await?.trim().to_string())
    }

    async fn set_current_context(&self, name: &str) -> Result<(), QueryError> {
        let args = ["config".to_string(), "use-context".to_string(), name.to_string()];
        self.execute_kubectl(&args).await?;
        Ok(())
    }
}

/// Looks for kubectl on PATH, then in the usual install locations.
fn find_kubectl() -> Option<PathBuf> {
    let on_path = std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join("kubectl"))
            .find(|candidate| candidate.is_file())
    });
    on_path.or_else(|| {
        KUBECTL_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
    })
}

/// Queries through the Kubernetes API using kube-rs.
pub struct KubeApiQuery {
    /// Context chosen during this session, ahead of the kubeconfig default.
    active_context: RwLock<Option<String>>,
}

impl KubeApiQuery {
    pub fn new() -> Self {
        Self {
            active_context: RwLock::new(None),
        }
    }

    async fn client_for(&self, context: Option<&str>) -> Result<Client, QueryError> {
        let context = context.map(str::to_string).or_else(|| {
            self.active_context
                .read()
                .ok()
                .and_then(|guard| guard.clone())
        });
        let options = KubeConfigOptions {
            context,
            ..Default::default()
        };
        let config = kube::Config::from_kubeconfig(&options)
            .await
            .map_err(|e| QueryError::Kubeconfig(e.to_string()))?;
        Ok(Client::try_from(config)?)
    }
}

impl Default for KubeApiQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterQuery for KubeApiQuery {
    async fn list_names(
        &self,
        kind: ResourceKind,
        filter: &QueryFilter,
    ) -> Result<Vec<String>, QueryError> {
        let namespace = filter.namespace.as_deref().unwrap_or("default");
        match kind {
            ResourceKind::Contexts => {
                let kubeconfig =
                    Kubeconfig::read().map_err(|e| QueryError::Kubeconfig(e.to_string()))?;
                Ok(kubeconfig.contexts.into_iter().map(|c| c.name).collect())
            }
            ResourceKind::Namespaces => {
                let client = self.client_for(filter.context.as_deref()).await?;
                let api: Api<Namespace> = Api::all(client);
                let list = api.list(&ListParams::default()).await?;
                Ok(list.items.iter().map(|ns| ns.name_any()).collect())
            }
            ResourceKind::Pods => {
                let client = self.client_for(filter.context.as_deref()).await?;
                let api: Api<Pod> = Api::namespaced(client, namespace);
                let list = api.list(&ListParams::default()).await?;
                Ok(list.items.iter().map(|pod| pod.name_any()).collect())
            }
            ResourceKind::Containers => {
                let client = self.client_for(filter.context.as_deref()).await?;
                let pod_name = filter.pod.as_deref().unwrap_or_default();
                let api: Api<Pod> = Api::namespaced(client, namespace);
                match api.get_opt(pod_name).await? {
                    Some(pod) => Ok(pod
                        .spec
                        .map(|spec| spec.containers.into_iter().map(|c| c.name).collect())
                        .unwrap_or_default()),
                    None if filter.ignore_missing => Ok(Vec::new()),
                    None => Err(QueryError::Failed {
                        message: format!("pods \"{}\" not found", pod_name),
                    }),
                }
            }
        }
    }

    async fn current_context(&self) -> Result<String, QueryError> {
        if let Some(ctx) = self
            .active_context
            .read()
            .ok()
            .and_then(|guard| guard.clone())
        {
            return Ok(ctx);
        }
        let kubeconfig = Kubeconfig::read().map_err(|e| QueryError::Kubeconfig(e.to_string()))?;
        kubeconfig
            .current_context
            .ok_or_else(|| QueryError::Kubeconfig("no current-context set".to_string()))
    }

    async fn set_current_context(&self, name: &str) -> Result<(), QueryError> {
        let kubeconfig = Kubeconfig::read().map_err(|e| QueryError::Kubeconfig(e.to_string()))?;
        if !kubeconfig.contexts.iter().any(|c| c.name == name) {
            return Err(QueryError::Failed {
                message: format!("no context exists with the name: \"{}\"", name),
            });
        }

        // The debugger transport runs plain `kubectl exec`, so the switch has
        // to land in the kubeconfig file and not only in this session.
        let path = kubeconfig_path().ok_or_else(|| {
            QueryError::Kubeconfig("cannot locate kubeconfig file".to_string())
        })?;
        write_current_context(&path, name)?;

        if let Ok(mut guard) = self.active_context.write() {
            *guard = Some(name.to_string());
        }
        Ok(())
    }
}

/// First file named by KUBECONFIG, else ~/.kube/config.
fn kubeconfig_path() -> Option<PathBuf> {
    resolve_kubeconfig_path(std::env::var_os("KUBECONFIG"), dirs::home_dir())
}

fn resolve_kubeconfig_path(kubeconfig: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(paths) = kubeconfig
        && let Some(first) = std::env::split_paths(&paths).find(|p| !p.as_os_str().is_empty())
    {
        return Some(first);
    }
    home.map(|home| home.join(".kube").join("config"))
}

/// Point `current-context` in the kubeconfig at `path` to `name`. Other keys
/// are carried over as parsed.
fn write_current_context(path: &Path, name: &str) -> Result<(), QueryError> {
    let content = std::fs::read_to_string(path)?;
    let mut doc: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| QueryError::Kubeconfig(e.to_string()))?;
    let serde_yaml::Value::Mapping(map) = &mut doc else {
        return Err(QueryError::Kubeconfig(format!(
            "{} is not a kubeconfig mapping",
            path.display()
        )));
    };
    map.insert(
        serde_yaml::Value::from("current-context"),
        serde_yaml::Value::from(name),
    );
    let updated =
        serde_yaml::to_string(&doc).map_err(|e| QueryError::Kubeconfig(e.to_string()))?;
    write_atomic(path, &updated)?;
    debug!("Set current-context to {} in {}", name, path.display());
    Ok(())
}
