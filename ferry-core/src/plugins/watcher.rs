//! File watcher for plugin modules with debouncing

use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::PluginHostError;
use super::events::{ChangeEvent, coalesce};
use super::host::PluginHost;
use super::reporter::{Operation, PluginFailure};

const EVENT_BUFFER: usize = 256;

/// Watches the search roots and feeds module changes to a [`PluginHost`]
pub struct PluginWatcher {
    _watcher: RecommendedWatcher,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PluginWatcher {
    /// Start watching every existing search root of `host`.
    ///
    /// Roots that do not exist yet are skipped with a warning.
    pub fn start(host: PluginHost) -> Result<Self, PluginHostError> {
        Self::start_with_token(host, CancellationToken::new())
    }

    /// Like [`start`](Self::start), stopping when `shutdown` is cancelled
    pub fn start_with_token(host: PluginHost, shutdown: CancellationToken) -> Result<Self, PluginHostError> {
        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>(EVENT_BUFFER);

        let mut watcher = recommended_watcher(move |event| {
            // Runs on the notify thread
            let _ = tx.blocking_send(event);
        })?;

        for root in host.config().effective_roots() {
            if root.exists() {
                tracing::debug!(root = %root.display(), "Watching plugin root");
                watcher.watch(&root, RecursiveMode::Recursive)?;
            } else {
                tracing::warn!(root = %root.display(), "Plugin root does not exist, not watching");
            }
        }

        let debounce = host.config().debounce_window();
        let task = tokio::spawn(Self::dispatch_loop(rx, host, debounce, shutdown.clone()));

        Ok(Self {
            _watcher: watcher,
            shutdown,
            task: Some(task),
        })
    }

    /// Stop watching and wait for the dispatch loop to exit.
    ///
    /// Events already handed to the host keep running.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "Plugin watcher task failed");
        }
    }

    /// Wait for the first event, then until the debounce window passes
    /// without another, and dispatch the burst in order.
    async fn dispatch_loop(
        mut rx: mpsc::Receiver<notify::Result<notify::Event>>,
        host: PluginHost,
        debounce: Duration,
        shutdown: CancellationToken,
    ) {
        loop {
            let first = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let mut burst = vec![first];
            let mut closed = false;
            if !debounce.is_zero() {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        next = tokio::time::timeout(debounce, rx.recv()) => match next {
                            Ok(Some(event)) => burst.push(event),
                            Ok(None) => {
                                closed = true;
                                break;
                            }
                            Err(_) => break,
                        },
                    }
                }
            }

            let mut changes = Vec::new();
            for event in burst {
                match event {
                    Ok(event) => changes.extend(ChangeEvent::from_notify(&event)),
                    Err(e) => host.report(PluginFailure::new(Operation::Watch, e.into())),
                }
            }

            for change in coalesce(changes) {
                tracing::debug!(event = change.kind(), path = %change.path().display(), "Module change");
                host.dispatch(change);
            }

            if closed {
                break;
            }
        }

        tracing::debug!("Plugin watcher stopped");
    }
}

impl Drop for PluginWatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
