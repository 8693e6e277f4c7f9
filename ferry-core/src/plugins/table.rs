//! PluginTable - the set of currently active plugins

use std::collections::HashMap;

use tokio::sync::{RwLock, broadcast};

use super::context::LoadContext;
use super::descriptor::PluginDescriptor;

const CHANGE_CAPACITY: usize = 256;

/// A running plugin and the context that backs it.
///
/// Field order matters: the descriptor (and with it the plugin instance) is
/// dropped before the load context that holds its code.
#[derive(Debug)]
pub struct ActivePlugin {
    pub(crate) descriptor: PluginDescriptor,
    pub(crate) context: LoadContext,
}

impl ActivePlugin {
    /// Pair a descriptor with its load context
    pub fn new(descriptor: PluginDescriptor, context: LoadContext) -> Self {
        Self {
            descriptor,
            context,
        }
    }

    /// Plugin name
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Lifecycle descriptor
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Load context
    pub fn context(&self) -> &LoadContext {
        &self.context
    }
}

/// What happened to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableChangeKind {
    Inserted,
    Removed,
}

/// One table mutation, with the key set right after it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChange {
    pub kind: TableChangeKind,
    pub name: String,
    /// Sorted plugin names after the mutation
    pub names: Vec<String>,
}

/// Name-keyed table of active plugins.
///
/// The lock is only ever held around a single lookup or mutation, never
/// across a plugin hook.
pub struct PluginTable {
    entries: RwLock<HashMap<String, ActivePlugin>>,
    changes: broadcast::Sender<TableChange>,
}

impl Default for PluginTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginTable {
    /// Create an empty table
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Insert an entry, returning whatever was under the same name
    pub async fn insert(&self, entry: ActivePlugin) -> Option<ActivePlugin> {
        let name = entry.name().to_string();
        let mut entries = self.entries.write().await;
        let displaced = entries.insert(name.clone(), entry);
        self.publish(&entries, TableChangeKind::Inserted, name);
        displaced
    }

    /// Remove and return the entry for `name`
    pub async fn remove(&self, name: &str) -> Option<ActivePlugin> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(name);
        if removed.is_some() {
            self.publish(&entries, TableChangeKind::Removed, name.to_string());
        }
        removed
    }

    /// Whether `name` is present
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Sorted plugin names
    pub async fn names(&self) -> Vec<String> {
        sorted_names(&*self.entries.read().await)
    }

    /// Number of active plugins
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no plugin is active
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Run `f` against the entry for `name`
    pub async fn with_entry<R>(&self, name: &str, f: impl FnOnce(&ActivePlugin) -> R) -> Option<R> {
        self.entries.read().await.get(name).map(f)
    }

    /// Map every entry, sorted by name
    pub async fn map_entries<R>(&self, f: impl FnMut(&ActivePlugin) -> R) -> Vec<R> {
        let entries = self.entries.read().await;
        let mut sorted: Vec<_> = entries.values().collect();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));
        sorted.into_iter().map(f).collect()
    }

    /// Receive every subsequent table mutation
    pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.changes.subscribe()
    }

    // Sent while the write lock is held so the feed order is the mutation order.
    fn publish(&self, entries: &HashMap<String, ActivePlugin>, kind: TableChangeKind, name: String) {
        let change = TableChange {
            kind,
            name,
            names: sorted_names(entries),
        };
        tracing::trace!(?change, "Plugin table changed");
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

fn sorted_names(entries: &HashMap<String, ActivePlugin>) -> Vec<String> {
    let mut names: Vec<String> = entries.keys().cloned().collect();
    names.sort();
    names
}
