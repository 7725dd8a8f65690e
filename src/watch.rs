//! Change notifications for a single file inside a watched directory.
//!
//! Notifications coalesce: a consumer that falls behind sees one pending
//! change, not a backlog. When the directory cannot be watched the stream
//! ends at once and callers fall back to their poll timer.

use futures::StreamExt;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{trace, warn};

pub struct FileWatch {
    changes: ReceiverStream<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl FileWatch {
    /// Watch `dir` for changes to the entry called `file_name`.
    pub fn spawn(dir: &Path, file_name: &str) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let target = OsString::from(file_name);

        let watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            let Ok(event) = res else {
                return;
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            if event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(target.as_os_str()))
            {
                trace!("change on {:?}", target);
                // Full means a notification is already pending.
                let _ = tx.try_send(());
            }
        })
        .and_then(|mut watcher| {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            Ok(watcher)
        });

        let watcher = match watcher {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Cannot watch {}: {}; polling only", dir.display(), e);
                None
            }
        };
        Self {
            changes: ReceiverStream::new(rx),
            _watcher: watcher,
        }
    }

    /// Resolves on the next change notification, or `None` once no more can
    /// arrive.
    pub async fn changed(&mut self) -> Option<()> {
        self.changes.next().await
    }
}
