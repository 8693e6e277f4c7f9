//! Hot reload tests for PluginHost
//!
//! These tests drive the host with change events the way the watcher does
//! and check the active-plugin table after each one:
//! - Created/Deleted/Changed/Renamed reduce to the right unload/load steps
//! - The unload half always completes before the load half starts
//! - A failed reload never resurrects the old instance

use std::path::PathBuf;
use std::sync::Arc;

use ferry_core::plugins::{
    BuiltinInspector, ChangeEvent, ChannelReporter, Operation, PluginFailure, PluginHost,
    PluginHostConfig, PluginHostError, TableChange, TableChangeKind,
    mock::{Journal, MockPlugin},
};
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

struct Harness {
    dir: TempDir,
    inspector: Arc<BuiltinInspector>,
    journal: Journal,
    host: PluginHost,
    failures: mpsc::UnboundedReceiver<PluginFailure>,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let inspector = Arc::new(BuiltinInspector::new());
        let (reporter, failures) = ChannelReporter::channel();

        let mut config = PluginHostConfig::with_roots([dir.path()]).extension("mod");
        config.data_dir = dir.path().join("data");
        let host = PluginHost::builder(config, inspector.clone())
            .error_reporter(reporter)
            .build();

        Self {
            dir,
            inspector,
            journal: Journal::new(),
            host,
            failures,
        }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    fn module(&self, name: &str) -> PathBuf {
        let path = self.path(&format!("{name}.mod"));
        std::fs::write(&path, b"").unwrap();
        path
    }

    fn register(&self, name: &str) {
        self.register_with(name, |plugin| plugin);
    }

    fn register_with(&self, name: &str, configure: impl FnOnce(MockPlugin) -> MockPlugin) {
        let plugin = configure(MockPlugin::new(name, &self.journal));
        self.inspector.register(name, plugin.factory());
    }

    fn no_failures(&mut self) -> bool {
        self.failures.try_recv().is_err()
    }
}

fn drain(changes: &mut broadcast::Receiver<TableChange>) -> Vec<TableChange> {
    let mut seen = Vec::new();
    while let Ok(change) = changes.try_recv() {
        seen.push(change);
    }
    seen
}

#[tokio::test]
async fn startup_loads_every_discovered_plugin() {
    let h = Harness::new();
    h.register("a");
    h.register("b");
    h.module("a");
    h.module("b");
    std::fs::write(h.path("readme.txt"), b"").unwrap();

    let report = h.host.load_plugins().await;

    assert!(report.is_clean());
    assert_eq!(h.host.plugin_names().await, vec!["a", "b"]);
}

#[tokio::test]
async fn startup_with_missing_root_still_loads_the_rest() {
    let h = Harness::new();
    h.register("a");
    h.module("a");
    let mut config = h.host.config().clone();
    config.search_roots.insert(0, h.path("missing"));
    let host = PluginHost::new(config, h.inspector.clone());

    let report = host.load_plugins().await;

    assert_eq!(report.loaded, vec!["a"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].operation, Operation::Discovery);
    assert!(matches!(
        report.failures[0].error,
        PluginHostError::DiscoveryRootUnavailable { .. }
    ));
}

#[tokio::test]
async fn duplicate_names_across_roots_last_wins() {
    let h = Harness::new();
    h.register("a");
    let first = TempDir::new().unwrap();
    std::fs::write(first.path().join("a.mod"), b"").unwrap();
    let second = h.module("a");

    let mut config = h.host.config().clone();
    config.search_roots = vec![first.path().to_path_buf(), h.dir.path().to_path_buf()];
    let host = PluginHost::new(config, h.inspector.clone());

    let report = host.load_plugins().await;

    assert_eq!(report.loaded, vec!["a"]);
    assert_eq!(host.plugin_count().await, 1);
    assert_eq!(host.plugin_info("a").await.unwrap().module_path, second);
}

#[tokio::test]
async fn created_event_loads() {
    let mut h = Harness::new();
    h.register("a");

    h.host.handle_event(ChangeEvent::created(h.module("a"))).await;

    assert!(h.host.is_loaded("a").await);
    assert!(h.no_failures());
}

#[tokio::test]
async fn deleted_without_prior_load_is_a_noop() {
    let mut h = Harness::new();
    let mut changes = h.host.subscribe();

    h.host.handle_event(ChangeEvent::deleted(h.path("a.mod"))).await;

    assert_eq!(h.host.plugin_count().await, 0);
    assert!(drain(&mut changes).is_empty());
    assert!(h.no_failures(), "a benign no-op must not reach the reporter");
}

#[tokio::test]
async fn deleted_event_unloads() {
    let mut h = Harness::new();
    h.register("a");
    let path = h.module("a");
    h.host.load(&path).await.unwrap();

    h.host.handle_event(ChangeEvent::deleted(&path)).await;

    assert!(!h.host.is_loaded("a").await);
    assert_eq!(h.journal.count("a:dispose"), 1);
    assert!(h.no_failures());
}

#[tokio::test]
async fn module_without_plugin_is_skipped_silently() {
    let mut h = Harness::new();
    let mut changes = h.host.subscribe();

    h.host.handle_event(ChangeEvent::created(h.module("stray"))).await;

    assert!(!h.host.is_loaded("stray").await);
    assert!(drain(&mut changes).is_empty());
    assert!(h.no_failures());
}

#[tokio::test]
async fn changed_event_unloads_fully_before_loading() {
    let mut h = Harness::new();
    h.register("a");
    let path = h.module("a");
    h.host.load(&path).await.unwrap();
    let old_services = h.host.services("a").await.unwrap();
    let old_generation = h.host.plugin_info("a").await.unwrap().generation;
    let mut changes = h.host.subscribe();

    h.host.handle_event(ChangeEvent::changed(&path)).await;

    assert!(old_services.is_disposed());
    let info = h.host.plugin_info("a").await.unwrap();
    assert_ne!(info.generation, old_generation);

    let seen = drain(&mut changes);
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].kind, TableChangeKind::Removed);
    assert!(seen[0].names.is_empty());
    assert_eq!(seen[1].kind, TableChangeKind::Inserted);
    assert_eq!(seen[1].names, vec!["a"]);

    assert_eq!(
        h.journal.entries(),
        vec![
            "a:start", "a:migrate", "a:stop", "a:dispose", "a:start", "a:migrate"
        ]
    );
    assert!(h.no_failures());
}

#[tokio::test]
async fn failed_reload_does_not_resurrect_old_instance() {
    let mut h = Harness::new();
    h.register("a");
    let path = h.module("a");
    h.host.load(&path).await.unwrap();

    h.register_with("a", |plugin| plugin.fail_start("broken build"));
    h.host.handle_event(ChangeEvent::changed(&path)).await;

    assert!(!h.host.is_loaded("a").await);
    let failure = h.failures.recv().await.unwrap();
    assert_eq!(failure.operation, Operation::Reload);
    assert_eq!(failure.name.as_deref(), Some("a"));
    assert!(matches!(
        failure.error,
        PluginHostError::InitializationFailed { .. }
    ));
}

#[tokio::test]
async fn renamed_event_moves_plugin_to_new_name() {
    let mut h = Harness::new();
    h.register("a");
    h.register("c");
    let old = h.module("a");
    h.host.load(&old).await.unwrap();
    let mut changes = h.host.subscribe();

    let new = h.path("c.mod");
    std::fs::rename(&old, &new).unwrap();
    h.host.handle_event(ChangeEvent::renamed(&old, &new)).await;

    let seen = drain(&mut changes);
    let removed_at = seen
        .iter()
        .position(|c| c.kind == TableChangeKind::Removed && c.name == "a")
        .expect("a was removed");
    for change in &seen[removed_at..] {
        assert!(!change.names.contains(&"a".to_string()), "a reappeared: {change:?}");
    }
    assert_eq!(seen.last().unwrap().names, vec!["c"]);
    assert_eq!(h.host.plugin_names().await, vec!["c"]);

    let a_disposed = h.journal.position("a:dispose").unwrap();
    let c_started = h.journal.position("c:start").unwrap();
    assert!(a_disposed < c_started);
    assert!(h.no_failures());
}

#[tokio::test]
async fn rename_out_of_the_filter_unloads() {
    let mut h = Harness::new();
    h.register("a");
    let path = h.module("a");
    h.host.load(&path).await.unwrap();

    h.host
        .handle_event(ChangeEvent::renamed(&path, h.path("a.mod.disabled")))
        .await;

    assert_eq!(h.host.plugin_count().await, 0);
    assert!(h.no_failures());
}

#[tokio::test]
async fn rename_into_the_filter_loads() {
    let mut h = Harness::new();
    h.register("a");
    let path = h.module("a");

    h.host
        .handle_event(ChangeEvent::renamed(h.path("a.download"), &path))
        .await;

    assert!(h.host.is_loaded("a").await);
    assert!(h.no_failures());
}

#[tokio::test]
async fn migration_failure_on_event_is_reported_and_absent() {
    let mut h = Harness::new();
    h.register_with("a", |plugin| plugin.fail_migrate("column exists"));

    h.host.handle_event(ChangeEvent::created(h.module("a"))).await;

    assert!(!h.host.is_loaded("a").await);
    let failure = h.failures.recv().await.unwrap();
    assert!(matches!(failure.error, PluginHostError::MigrationFailed { .. }));
    assert_eq!(h.journal.count("a:dispose"), 1);
}

#[tokio::test]
async fn names_stay_unique_across_event_sequences() {
    let h = Harness::new();
    h.register("a");
    h.register("b");
    let a = h.module("a");
    let b = h.module("b");

    let events = vec![
        ChangeEvent::created(&a),
        ChangeEvent::created(&a),
        ChangeEvent::changed(&a),
        ChangeEvent::created(&b),
        ChangeEvent::renamed(&b, &a),
        ChangeEvent::changed(&b),
        ChangeEvent::deleted(&a),
        ChangeEvent::created(&a),
    ];
    for event in events {
        h.host.handle_event(event).await;
        let names = h.host.plugin_names().await;
        let mut unique = names.clone();
        unique.dedup();
        assert_eq!(names, unique);
    }

    assert_eq!(h.host.plugin_names().await, vec!["a", "b"]);
    assert_eq!(
        h.journal.count("a:start") + h.journal.count("b:start"),
        h.journal.count("a:dispose") + h.journal.count("b:dispose") + 2
    );
}
