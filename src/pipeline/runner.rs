use crate::pipeline::dispatcher::Dispatcher;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Buffered notifications between the watcher thread and the drain task.
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to watch log directory: {0}")]
    Watch(#[from] notify::Error),

    #[error("notification channel closed")]
    EventsClosed,
}

/// What the directory watcher reports.
#[derive(Debug)]
pub enum WatchEvent {
    /// Entries were created in the watched directory.
    Created(Vec<PathBuf>),
    /// The notification source failed; watching continues.
    Error(notify::Error),
}

/// Start watching `dir` for newly created entries.
///
/// The returned watcher must be kept alive for events to keep flowing.
pub fn watch_directory(
    dir: &Path,
) -> Result<(RecommendedWatcher, mpsc::Receiver<WatchEvent>), PipelineError> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let event = match res {
            Ok(event) if is_new_entry(&event.kind) => WatchEvent::Created(event.paths),
            Ok(_) => return,
            Err(e) => WatchEvent::Error(e),
        };
        // A full buffer already guarantees another drain pass, so the
        // event can be dropped.
        let _ = tx.try_send(event);
    })?;

    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!(dir = %dir.display(), "Watching log directory");

    Ok((watcher, rx))
}

/// Whether `kind` means a new entry appeared in the directory. Files moved in
/// from elsewhere arrive as renames, not creates.
fn is_new_entry(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both))
    )
}

/// Drive `dispatcher` from directory notifications until shutdown.
///
/// Every create notification triggers one drain pass; notifications that
/// queued up meanwhile are folded into it. Shutdown is only observed between
/// passes.
pub async fn run_watcher(
    dispatcher: Dispatcher,
    mut events: mpsc::Receiver<WatchEvent>,
    mut shutdown: watch::Receiver<bool>,
    drain_on_startup: bool,
) -> Result<(), PipelineError> {
    info!(log_dir = %dispatcher.log_dir().display(), "Watcher started");

    if drain_on_startup {
        drain_pass(&dispatcher).await;
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("Watcher shutting down");
                return Ok(());
            }
            event = events.recv() => match event {
                Some(WatchEvent::Created(paths)) => {
                    debug!(?paths, "Entries created in log directory");
                    while let Ok(queued) = events.try_recv() {
                        if let WatchEvent::Error(e) = queued {
                            error!(error = %e, "Error while watching log directory");
                        }
                    }
                    drain_pass(&dispatcher).await;
                }
                Some(WatchEvent::Error(e)) => {
                    error!(error = %e, "Error while watching log directory");
                }
                None => return Err(PipelineError::EventsClosed),
            }
        }
    }
}

async fn drain_pass(dispatcher: &Dispatcher) {
    match dispatcher.drain().await {
        Ok(report) if report.files > 0 => {
            info!(
                files = report.files,
                samples = report.samples,
                "Drain pass complete"
            );
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, "Drain pass aborted, will retry on next notification");
        }
    }
}
