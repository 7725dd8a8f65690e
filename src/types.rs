use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the debug target wizard, in resolution order.
#[derive(
    Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Context,
    Namespace,
    Pod,
    Container,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Context, Stage::Namespace, Stage::Pod, Stage::Container];

    /// 1-based position, used as the wizard step number.
    pub fn step(self) -> usize {
        self.index() + 1
    }

    pub fn index(self) -> usize {
        match self {
            Stage::Context => 0,
            Stage::Namespace => 1,
            Stage::Pod => 2,
            Stage::Container => 3,
        }
    }

    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    /// This stage and every stage after it.
    pub fn and_downstream(self) -> &'static [Stage] {
        &Stage::ALL[self.index()..]
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::Context => "Pick Kubernetes context",
            Stage::Namespace => "Pick namespace",
            Stage::Pod => "Pick pod",
            Stage::Container => "Pick container",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Context => "context",
            Stage::Namespace => "namespace",
            Stage::Pod => "pod",
            Stage::Container => "container",
        };
        f.write_str(name)
    }
}

/// A fully resolved debug target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugTarget {
    pub context: String,
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl fmt::Display for DebugTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.context, self.namespace, self.pod, self.container
        )
    }
}
