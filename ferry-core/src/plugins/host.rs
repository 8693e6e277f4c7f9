//! PluginHost - manages plugin lifecycle, discovery and hot reload

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ferry_plugin_api::{API_VERSION, MigrationContext, PluginConfig, PluginManifest, ServiceCollection};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::config::PluginHostConfig;
use super::context::LoadContext;
use super::descriptor::{LifecycleState, PluginDescriptor};
use super::discovery::{self, Discovery, plugin_name};
use super::error::PluginHostError;
use super::events::{ChangeEvent, Reduction};
use super::inspector::{InspectedModule, ModuleInspector};
use super::reporter::{ErrorReporter, Operation, PluginFailure, TracingReporter};
use super::sequencer::{Sequencer, Ticket};
use super::services::ServiceRegistry;
use super::table::{ActivePlugin, PluginTable, TableChange};

/// Result of loading one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The plugin is running and in the table
    Loaded { name: String },
    /// The module does not provide a plugin; nothing changed
    Skipped { path: PathBuf },
}

/// Result of unloading one plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    Unloaded,
    /// No plugin of that name was loaded
    NotLoaded,
}

/// Summary of a bulk load
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names loaded, in load order (a later duplicate replaces an earlier one)
    pub loaded: Vec<String>,
    /// Modules that turned out not to be plugins
    pub skipped: Vec<PathBuf>,
    /// Discovery and load failures
    pub failures: Vec<PluginFailure>,
}

impl LoadReport {
    /// Whether nothing failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Information about a loaded plugin
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub module_path: PathBuf,
    pub manifest: PluginManifest,
    pub state: LifecycleState,
    /// Unique id of this load
    pub generation: Uuid,
    pub loaded_at: DateTime<Utc>,
    /// Loaded from a shared library rather than compiled in
    pub dynamic: bool,
    /// Types of the services the plugin itself registered
    pub services: Vec<String>,
}

impl PluginInfo {
    fn from_entry(entry: &ActivePlugin) -> Self {
        let descriptor = entry.descriptor();
        let context = entry.context();
        Self {
            name: descriptor.name().to_string(),
            module_path: context.module_path().to_path_buf(),
            manifest: descriptor.manifest().clone(),
            state: descriptor.state().clone(),
            generation: context.generation(),
            loaded_at: context.loaded_at(),
            dynamic: context.is_dynamic(),
            services: descriptor
                .services()
                .type_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Builder for [`PluginHost`]
pub struct PluginHostBuilder {
    config: PluginHostConfig,
    inspector: Arc<dyn ModuleInspector>,
    host_services: ServiceCollection,
    reporter: Arc<dyn ErrorReporter>,
}

impl PluginHostBuilder {
    /// Services every plugin can resolve
    pub fn host_services(mut self, services: ServiceCollection) -> Self {
        self.host_services = services;
        self
    }

    /// Where failures of event-driven operations go
    pub fn error_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn build(self) -> PluginHost {
        PluginHost {
            inner: Arc::new(HostInner {
                config: self.config,
                inspector: self.inspector,
                host_services: ServiceRegistry::host(self.host_services),
                table: PluginTable::new(),
                sequencer: Sequencer::new(),
                reporter: self.reporter,
            }),
        }
    }
}

/// The plugin host.
///
/// Cheap to clone; clones share the same table. Operations on one plugin
/// name run strictly in the order they were requested, operations on
/// different names run concurrently.
#[derive(Clone)]
pub struct PluginHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    config: PluginHostConfig,
    inspector: Arc<dyn ModuleInspector>,
    host_services: Arc<ServiceRegistry>,
    table: PluginTable,
    sequencer: Sequencer,
    reporter: Arc<dyn ErrorReporter>,
}

/// One unit of event work: an optional unload then an optional load, under
/// one ticket
struct Step {
    ticket: Ticket,
    unload: bool,
    load: Option<PathBuf>,
}

impl PluginHost {
    /// Start building a host
    pub fn builder(config: PluginHostConfig, inspector: Arc<dyn ModuleInspector>) -> PluginHostBuilder {
        PluginHostBuilder {
            config,
            inspector,
            host_services: ServiceCollection::new(),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Host with no host-wide services, reporting failures through tracing
    pub fn new(config: PluginHostConfig, inspector: Arc<dyn ModuleInspector>) -> Self {
        Self::builder(config, inspector).build()
    }

    pub fn config(&self) -> &PluginHostConfig {
        &self.inner.config
    }

    /// The host-wide registry every plugin registry falls back to
    pub fn host_services(&self) -> &Arc<ServiceRegistry> {
        &self.inner.host_services
    }

    /// Scan the search roots for candidate modules
    pub fn discover(&self) -> Discovery {
        discovery::discover(&self.inner.config)
    }

    /// Discover and load every candidate module.
    ///
    /// Failures are collected in the report; one bad module does not stop
    /// the others.
    pub async fn load_plugins(&self) -> LoadReport {
        let Discovery { modules, errors } = self.discover();
        let mut report = LoadReport::default();

        report.failures.extend(
            errors
                .into_iter()
                .map(|error| PluginFailure::new(Operation::Discovery, error)),
        );

        for path in modules {
            match self.load(&path).await {
                Ok(LoadOutcome::Loaded { name }) => {
                    report.loaded.retain(|loaded| *loaded != name);
                    report.loaded.push(name);
                }
                Ok(LoadOutcome::Skipped { path }) => report.skipped.push(path),
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "Failed to load plugin");
                    report
                        .failures
                        .push(failure(Operation::Load, error, None, Some(&path)));
                }
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "Plugin load complete"
        );
        report
    }

    /// Load the module at `path`.
    ///
    /// A plugin of the same name that is already loaded is replaced, but
    /// only once the new module has produced a plugin instance. A panicking
    /// hook is returned as [`PluginHostError::PluginPanicked`].
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<LoadOutcome, PluginHostError> {
        let path = path.as_ref().to_path_buf();
        let name = name_of(&path)?;
        let ticket = self.inner.sequencer.ticket(&name);
        let inner = self.inner.clone();
        isolate(name, async move {
            let turn = ticket.wait().await;
            inner.load_in_turn(turn.name(), &path).await
        })
        .await
    }

    /// Stop, dispose and release the named plugin.
    ///
    /// A failing stop hook is returned as [`PluginHostError::StopFailed`],
    /// but the plugin is gone from the table and fully torn down either way.
    pub async fn unload(&self, name: &str) -> Result<UnloadOutcome, PluginHostError> {
        let ticket = self.inner.sequencer.ticket(name);
        let inner = self.inner.clone();
        isolate(name.to_string(), async move {
            let turn = ticket.wait().await;
            inner.unload_in_turn(turn.name()).await
        })
        .await
    }

    /// Unload the plugin from `path` (if loaded), then load `path` again
    pub async fn reload(&self, path: impl AsRef<Path>) -> Result<LoadOutcome, PluginHostError> {
        let path = path.as_ref().to_path_buf();
        let name = name_of(&path)?;
        let ticket = self.inner.sequencer.ticket(&name);
        let inner = self.inner.clone();
        isolate(name, async move {
            let turn = ticket.wait().await;
            let name = turn.name();
            if let Err(error) = inner.unload_in_turn(name).await {
                inner
                    .reporter
                    .report(failure(Operation::Reload, error, Some(name), Some(&path)));
            }
            inner.load_in_turn(name, &path).await
        })
        .await
    }

    /// Accept a change event and process it in the background.
    ///
    /// The event is ordered against every other operation on the same
    /// plugin name at the moment this is called. Failures, including
    /// panicking plugin hooks, go to the error reporter. Returns `None`
    /// when the event needs no work.
    pub fn dispatch(&self, event: ChangeEvent) -> Option<JoinHandle<()>> {
        let Some(event) = event.filter(&self.inner.config) else {
            tracing::trace!("Ignoring change to a non-module file");
            return None;
        };

        let operation = match event {
            ChangeEvent::Created { .. } => Operation::Load,
            ChangeEvent::Deleted { .. } => Operation::Unload,
            ChangeEvent::Changed { .. } | ChangeEvent::Renamed { .. } => Operation::Reload,
        };

        let steps = match self.inner.plan(event.reduce()) {
            Ok(steps) => steps,
            Err(error) => {
                self.inner
                    .reporter
                    .report(failure(operation, error, None, Some(event.path())));
                return None;
            }
        };
        if steps.is_empty() {
            return None;
        }

        tracing::debug!(
            event = event.kind(),
            path = %event.path().display(),
            "Dispatching plugin change"
        );

        let inner = self.inner.clone();
        Some(tokio::spawn(async move { inner.run_steps(operation, steps).await }))
    }

    /// Dispatch a change event and wait for it to be processed
    pub async fn handle_event(&self, event: ChangeEvent) {
        if let Some(handle) = self.dispatch(event)
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Plugin change task failed");
        }
    }

    /// Unload every plugin, reporting failures. Returns how many were unloaded.
    pub async fn unload_all(&self) -> usize {
        let mut unloaded = 0;
        for name in self.plugin_names().await {
            match self.unload(&name).await {
                Ok(UnloadOutcome::Unloaded) => unloaded += 1,
                Ok(UnloadOutcome::NotLoaded) => {}
                Err(error) => {
                    // Teardown completed even though stop failed.
                    unloaded += 1;
                    self.inner
                        .reporter
                        .report(failure(Operation::Unload, error, Some(&name), None));
                }
            }
        }
        unloaded
    }

    /// Sorted names of the loaded plugins
    pub async fn plugin_names(&self) -> Vec<String> {
        self.inner.table.names().await
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.inner.table.contains(name).await
    }

    pub async fn plugin_count(&self) -> usize {
        self.inner.table.len().await
    }

    pub async fn plugin_info(&self, name: &str) -> Option<PluginInfo> {
        self.inner.table.with_entry(name, PluginInfo::from_entry).await
    }

    /// Information about every loaded plugin, sorted by name
    pub async fn list_plugins(&self) -> Vec<PluginInfo> {
        self.inner.table.map_entries(PluginInfo::from_entry).await
    }

    /// The named plugin's service registry
    pub async fn services(&self, name: &str) -> Option<Arc<ServiceRegistry>> {
        self.inner
            .table
            .with_entry(name, |entry| entry.descriptor().services().clone())
            .await
    }

    /// Resolve a service as the named plugin sees it
    pub async fn resolve<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.services(name).await?.resolve::<T>()
    }

    /// Hand a failure to the configured error reporter
    pub fn report(&self, failure: PluginFailure) {
        self.inner.reporter.report(failure);
    }

    /// Receive every subsequent table insertion and removal
    pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.inner.table.subscribe()
    }
}

impl HostInner {
    /// Take the tickets an event needs, in arrival order
    fn plan(&self, reduction: Reduction) -> Result<Vec<Step>, PluginHostError> {
        let Reduction { unload, load } = reduction;

        let steps = match (unload, load) {
            (None, None) => Vec::new(),
            (Some(name), None) => vec![Step {
                ticket: self.sequencer.ticket(&name),
                unload: true,
                load: None,
            }],
            (unload, Some(path)) => {
                let name = name_of(&path)?;
                match unload {
                    Some(old) if old != name => {
                        let (old_turn, new_turn) = self.sequencer.ticket_pair(&old, &name);
                        vec![
                            Step {
                                ticket: old_turn,
                                unload: true,
                                load: None,
                            },
                            Step {
                                ticket: new_turn,
                                unload: false,
                                load: Some(path),
                            },
                        ]
                    }
                    unload => vec![Step {
                        ticket: self.sequencer.ticket(&name),
                        unload: unload.is_some(),
                        load: Some(path),
                    }],
                }
            }
        };
        Ok(steps)
    }

    /// Run each step on its own task, so a panic is pinned to the step's name
    async fn run_steps(self: Arc<Self>, operation: Operation, steps: Vec<Step>) {
        for step in steps {
            let name = step.ticket.name().to_string();
            let path = step.load.clone();
            let inner = self.clone();
            let worker = tokio::spawn(async move { inner.run_step(operation, step).await });

            if let Err(e) = worker.await
                && e.is_panic()
            {
                tracing::error!(plugin = %name, "Plugin panicked while handling a change");
                let mut failure = PluginFailure::new(operation, PluginHostError::PluginPanicked { name });
                if let Some(path) = path {
                    failure = failure.with_path(path);
                }
                self.reporter.report(failure);
            }
        }
    }

    async fn run_step(&self, operation: Operation, step: Step) {
        let Step {
            ticket,
            unload,
            load,
        } = step;
        // Held to the end of this step only, so a rename never holds one
        // name while waiting for the other.
        let turn = ticket.wait().await;
        let name = turn.name();

        if unload && let Err(error) = self.unload_in_turn(name).await {
            self.reporter
                .report(failure(operation, error, Some(name), None));
        }

        if let Some(path) = load
            && let Err(error) = self.load_in_turn(name, &path).await
        {
            self.reporter
                .report(failure(operation, error, Some(name), Some(&path)));
        }
    }

    /// Load `path` as `name`; the caller holds the name's turn
    async fn load_in_turn(&self, name: &str, path: &Path) -> Result<LoadOutcome, PluginHostError> {
        let Some(InspectedModule {
            descriptor: capability,
            library,
        }) = self.inspector.inspect(path)?
        else {
            tracing::debug!(path = %path.display(), "Module provides no plugin, skipping");
            return Ok(LoadOutcome::Skipped {
                path: path.to_path_buf(),
            });
        };

        let context = LoadContext::new(name, path, library);
        if capability.api_version != API_VERSION {
            let found = capability.api_version;
            drop(capability);
            self.release(context);
            return Err(PluginHostError::ApiVersionMismatch {
                expected: API_VERSION,
                found,
            });
        }

        let instance = capability.instantiate();
        drop(capability);
        let Some(instance) = instance else {
            tracing::debug!(plugin = %name, "Module factory produced no plugin, skipping");
            self.release(context);
            return Ok(LoadOutcome::Skipped {
                path: path.to_path_buf(),
            });
        };

        // Only a module that produced a plugin replaces the running one.
        if self.table.contains(name).await {
            tracing::debug!(plugin = %name, "Unloading previous instance before start");
            if let Err(error) = self.unload_in_turn(name).await {
                self.reporter
                    .report(failure(Operation::Unload, error, Some(name), None));
            }
        }

        let services = ServiceRegistry::for_plugin(name, instance.services(), self.host_services.clone());
        let mut descriptor = PluginDescriptor::new(name, instance, services.clone());

        if let Err(error) = descriptor.start().await {
            self.discard(descriptor, context).await;
            return Err(error);
        }

        let migrated = match self.migration_context(name, path, &services) {
            Ok(ctx) => descriptor.migrate(&ctx).await,
            Err(error) => Err(error),
        };
        if let Err(error) = migrated {
            self.discard(descriptor, context).await;
            return Err(error);
        }

        let version = descriptor.manifest().version.clone();
        if let Some(displaced) = self.table.insert(ActivePlugin::new(descriptor, context)).await {
            tracing::warn!(plugin = %name, "Replaced a plugin entry inserted concurrently");
            let ActivePlugin {
                descriptor,
                context,
            } = displaced;
            if let Err(error) = self.teardown(descriptor, context).await {
                self.reporter
                    .report(failure(Operation::Unload, error, Some(name), None));
            }
        }

        tracing::info!(
            plugin = %name,
            version = %version,
            path = %path.display(),
            "Plugin loaded"
        );
        Ok(LoadOutcome::Loaded {
            name: name.to_string(),
        })
    }

    /// Unload `name`; the caller holds the name's turn
    async fn unload_in_turn(&self, name: &str) -> Result<UnloadOutcome, PluginHostError> {
        let Some(ActivePlugin {
            descriptor,
            context,
        }) = self.table.remove(name).await
        else {
            tracing::debug!(plugin = %name, "Plugin not loaded, nothing to unload");
            return Ok(UnloadOutcome::NotLoaded);
        };

        let stopped = self.teardown(descriptor, context).await;
        tracing::info!(plugin = %name, "Plugin unloaded");
        stopped.map(|()| UnloadOutcome::Unloaded)
    }

    fn migration_context(
        &self,
        name: &str,
        path: &Path,
        services: &Arc<ServiceRegistry>,
    ) -> Result<MigrationContext, PluginHostError> {
        let config_path = path.with_extension("toml");
        let config = PluginConfig::load(&config_path).map_err(|e| PluginHostError::MigrationFailed {
            name: name.to_string(),
            message: format!("cannot read {}: {e}", config_path.display()),
        })?;

        Ok(MigrationContext::new(
            name,
            path,
            self.config.plugin_data_dir(name),
            services.clone(),
        )
        .with_config(config))
    }

    /// Tear down a plugin that never made it into the table
    async fn discard(&self, descriptor: PluginDescriptor, context: LoadContext) {
        if let Err(error) = self.teardown(descriptor, context).await {
            tracing::warn!(error = %error, "Stop failed while discarding plugin");
        }
    }

    /// Stop (if it was started), dispose, then release the context.
    ///
    /// Always runs to completion; returns the stop failure, if any.
    async fn teardown(
        &self,
        mut descriptor: PluginDescriptor,
        context: LoadContext,
    ) -> Result<(), PluginHostError> {
        let needs_stop = matches!(
            descriptor.state(),
            LifecycleState::Started | LifecycleState::Running | LifecycleState::MigrationFailed { .. }
        );
        let stopped = if needs_stop {
            descriptor.stop().await
        } else {
            Ok(())
        };
        if let Err(error) = &stopped {
            tracing::warn!(plugin = %descriptor.name(), error = %error, "Plugin stop failed, continuing teardown");
        }

        if let Err(error) = descriptor.dispose().await {
            tracing::warn!(plugin = %descriptor.name(), error = %error, "Plugin dispose failed");
        }

        // The instance must be gone before its code is unloaded.
        drop(descriptor);
        self.release(context);
        stopped
    }

    fn release(&self, context: LoadContext) {
        let name = context.name().to_string();
        context.release();
        self.inspector.release(&name);
    }
}

/// Run `work` on its own task, turning a panic into `PluginPanicked`
async fn isolate<T, F>(name: String, work: F) -> Result<T, PluginHostError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, PluginHostError>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result,
        Err(e) => {
            // Never aborted, so this is a panic.
            tracing::error!(plugin = %name, error = %e, "Plugin panicked");
            Err(PluginHostError::PluginPanicked { name })
        }
    }
}

fn name_of(path: &Path) -> Result<String, PluginHostError> {
    plugin_name(path).ok_or_else(|| PluginHostError::InvalidModulePath {
        path: path.to_path_buf(),
    })
}

fn failure(
    operation: Operation,
    error: PluginHostError,
    name: Option<&str>,
    path: Option<&Path>,
) -> PluginFailure {
    let mut failure = PluginFailure::new(operation, error);
    if failure.name.is_none() {
        failure.name = name.map(str::to_string).or_else(|| path.and_then(plugin_name));
    }
    if let Some(path) = path {
        failure = failure.with_path(path);
    }
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::inspector::BuiltinInspector;
    use crate::plugins::mock::{Journal, MockPlugin};
    use crate::plugins::reporter::ChannelReporter;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        inspector: Arc<BuiltinInspector>,
        journal: Journal,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                inspector: Arc::new(BuiltinInspector::new()),
                journal: Journal::new(),
            }
        }

        fn module(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(format!("{name}.mod"));
            std::fs::write(&path, b"").unwrap();
            path
        }

        fn register(&self, name: &str, plugin: MockPlugin) {
            self.inspector.register(name, plugin.factory());
        }

        fn plugin(&self, label: &str) -> MockPlugin {
            MockPlugin::new(label, &self.journal)
        }

        fn config(&self) -> PluginHostConfig {
            let mut config = PluginHostConfig::with_roots([self.dir.path()]).extension("mod");
            config.data_dir = self.dir.path().join("data");
            config
        }

        fn host(&self) -> PluginHost {
            PluginHost::new(self.config(), self.inspector.clone())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Greeting(&'static str);

    #[tokio::test]
    async fn test_load_runs_start_then_migrate() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a"));
        let host = fx.host();

        let outcome = host.load(fx.module("a")).await.unwrap();

        assert_eq!(outcome, LoadOutcome::Loaded { name: "a".into() });
        assert_eq!(fx.journal.entries(), vec!["a:start", "a:migrate"]);
        let info = host.plugin_info("a").await.unwrap();
        assert_eq!(info.state, LifecycleState::Running);
        assert!(!info.dynamic);
        assert_eq!(info.manifest.name, "a");
    }

    #[tokio::test]
    async fn test_module_without_plugin_is_skipped() {
        let fx = Fixture::new();
        let host = fx.host();
        let mut changes = host.subscribe();

        let path = fx.module("stray");
        let outcome = host.load(&path).await.unwrap();

        assert_eq!(outcome, LoadOutcome::Skipped { path });
        assert_eq!(host.plugin_count().await, 0);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_factory_yielding_nothing_is_skipped() {
        let fx = Fixture::new();
        fx.inspector.register("empty", || None);
        let host = fx.host();

        let outcome = host.load(fx.module("empty")).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Skipped { .. }));
        assert!(!host.is_loaded("empty").await);
    }

    #[tokio::test]
    async fn test_start_failure_releases_everything() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a").fail_start("no port"));
        let host = fx.host();

        let err = host.load(fx.module("a")).await.unwrap_err();

        assert!(matches!(err, PluginHostError::InitializationFailed { ref name, .. } if name == "a"));
        assert!(!host.is_loaded("a").await);
        assert_eq!(fx.journal.entries(), vec!["a:start", "a:dispose"]);
    }

    #[tokio::test]
    async fn test_migration_failure_leaves_plugin_absent() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a").fail_migrate("bad schema"));
        let host = fx.host();

        let err = host.load(fx.module("a")).await.unwrap_err();

        assert!(matches!(err, PluginHostError::MigrationFailed { .. }));
        assert!(!host.is_loaded("a").await);
        assert_eq!(
            fx.journal.entries(),
            vec!["a:start", "a:migrate", "a:stop", "a:dispose"]
        );
    }

    #[tokio::test]
    async fn test_invalid_plugin_config_fails_migration() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a"));
        std::fs::write(fx.dir.path().join("a.toml"), "not = [valid").unwrap();
        let host = fx.host();

        let err = host.load(fx.module("a")).await.unwrap_err();

        assert!(matches!(err, PluginHostError::MigrationFailed { .. }));
        assert_eq!(fx.journal.entries(), vec!["a:start", "a:stop", "a:dispose"]);
    }

    #[tokio::test]
    async fn test_unload_tears_down_in_order() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a").with_service(Greeting("hi")));
        let host = fx.host();
        host.load(fx.module("a")).await.unwrap();
        let services = host.services("a").await.unwrap();

        let outcome = host.unload("a").await.unwrap();

        assert_eq!(outcome, UnloadOutcome::Unloaded);
        assert!(!host.is_loaded("a").await);
        assert!(services.is_disposed());
        assert!(services.resolve::<Greeting>().is_none());
        assert_eq!(
            fx.journal.entries(),
            vec!["a:start", "a:migrate", "a:stop", "a:dispose"]
        );
    }

    #[tokio::test]
    async fn test_unload_absent_is_noop() {
        let fx = Fixture::new();
        let host = fx.host();
        assert_eq!(host.unload("ghost").await.unwrap(), UnloadOutcome::NotLoaded);
    }

    #[tokio::test]
    async fn test_stop_failure_still_unloads() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a").fail_stop("stuck"));
        let host = fx.host();
        host.load(fx.module("a")).await.unwrap();

        let err = host.unload("a").await.unwrap_err();

        assert!(matches!(err, PluginHostError::StopFailed { .. }));
        assert!(!host.is_loaded("a").await);
        assert_eq!(fx.journal.count("a:dispose"), 1);
    }

    #[tokio::test]
    async fn test_loading_a_loaded_name_replaces_it() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a"));
        let host = fx.host();
        let path = fx.module("a");

        host.load(&path).await.unwrap();
        let first = host.plugin_info("a").await.unwrap().generation;
        host.load(&path).await.unwrap();
        let second = host.plugin_info("a").await.unwrap().generation;

        assert_ne!(first, second);
        assert_eq!(host.plugin_count().await, 1);
        assert_eq!(
            fx.journal.entries(),
            vec![
                "a:start", "a:migrate", "a:stop", "a:dispose", "a:start", "a:migrate"
            ]
        );
    }

    #[tokio::test]
    async fn test_services_resolve_own_then_host() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a").with_service(Greeting("plugin")));
        fx.register("b", fx.plugin("b"));
        let host = PluginHost::builder(fx.config(), fx.inspector.clone())
            .host_services(ServiceCollection::new().with(Greeting("host")).with(42u32))
            .build();

        host.load(fx.module("a")).await.unwrap();
        host.load(fx.module("b")).await.unwrap();

        assert_eq!(*host.resolve::<Greeting>("a").await.unwrap(), Greeting("plugin"));
        assert_eq!(*host.resolve::<Greeting>("b").await.unwrap(), Greeting("host"));
        assert_eq!(*host.resolve::<u32>("a").await.unwrap(), 42);
        assert!(host.resolve::<Greeting>("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_load_plugins_collects_failures() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a"));
        fx.register("b", fx.plugin("b").fail_start("nope"));
        fx.module("a");
        fx.module("b");
        fx.module("c");
        let host = fx.host();

        let report = host.load_plugins().await;

        assert_eq!(report.loaded, vec!["a"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name.as_deref(), Some("b"));
        assert!(!report.is_clean());
        assert_eq!(host.plugin_names().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_dispatch_ignores_other_extensions() {
        let fx = Fixture::new();
        let host = fx.host();
        assert!(host.dispatch(ChangeEvent::created(fx.dir.path().join("notes.txt"))).is_none());
    }

    #[tokio::test]
    async fn test_event_failures_go_to_reporter() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a").fail_start("boom"));
        let (reporter, mut failures) = ChannelReporter::channel();
        let host = PluginHost::builder(fx.config(), fx.inspector.clone())
            .error_reporter(reporter)
            .build();

        host.handle_event(ChangeEvent::created(fx.module("a"))).await;

        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.operation, Operation::Load);
        assert_eq!(failure.name.as_deref(), Some("a"));
        assert!(matches!(failure.error, PluginHostError::InitializationFailed { .. }));
        assert!(!host.is_loaded("a").await);
    }

    #[tokio::test]
    async fn test_panicking_hook_is_reported() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a").panic_on_start());
        fx.register("b", fx.plugin("b"));
        let (reporter, mut failures) = ChannelReporter::channel();
        let host = PluginHost::builder(fx.config(), fx.inspector.clone())
            .error_reporter(reporter)
            .build();

        host.handle_event(ChangeEvent::created(fx.module("a"))).await;
        let failure = failures.recv().await.unwrap();
        assert!(matches!(failure.error, PluginHostError::PluginPanicked { ref name } if name == "a"));

        // The name's turn was released despite the panic.
        fx.register("a", fx.plugin("a"));
        host.handle_event(ChangeEvent::created(fx.module("a"))).await;
        host.handle_event(ChangeEvent::created(fx.module("b"))).await;
        assert_eq!(host.plugin_names().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_reload_replaces_instance() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a"));
        let host = fx.host();
        let path = fx.module("a");
        host.load(&path).await.unwrap();

        host.reload(&path).await.unwrap();

        assert!(host.is_loaded("a").await);
        assert_eq!(
            fx.journal.entries(),
            vec![
                "a:start", "a:migrate", "a:stop", "a:dispose", "a:start", "a:migrate"
            ]
        );
    }

    #[tokio::test]
    async fn test_unload_all() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a"));
        fx.register("b", fx.plugin("b").fail_stop("stuck"));
        let (reporter, mut failures) = ChannelReporter::channel();
        let host = PluginHost::builder(fx.config(), fx.inspector.clone())
            .error_reporter(reporter)
            .build();
        host.load(fx.module("a")).await.unwrap();
        host.load(fx.module("b")).await.unwrap();

        assert_eq!(host.unload_all().await, 2);
        assert_eq!(host.plugin_count().await, 0);
        let failure = failures.recv().await.unwrap();
        assert!(matches!(failure.error, PluginHostError::StopFailed { .. }));
    }

    #[tokio::test]
    async fn test_invalid_module_path() {
        let fx = Fixture::new();
        let host = fx.host();
        assert!(matches!(
            host.load("/").await,
            Err(PluginHostError::InvalidModulePath { .. })
        ));
    }

    #[tokio::test]
    async fn test_skipped_reload_keeps_running_plugin() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a"));
        let host = fx.host();
        let path = fx.module("a");
        host.load(&path).await.unwrap();
        let mut changes = host.subscribe();

        fx.inspector.unregister("a");
        let outcome = host.load(&path).await.unwrap();

        assert_eq!(outcome, LoadOutcome::Skipped { path });
        assert!(host.is_loaded("a").await);
        assert!(changes.try_recv().is_err());
        assert_eq!(fx.journal.entries(), vec!["a:start", "a:migrate"]);
    }

    /// Wraps a builtin inspector, reporting a chosen API version
    struct VersionedInspector {
        builtin: BuiltinInspector,
        api_version: AtomicU32,
        released: Journal,
    }

    impl ModuleInspector for VersionedInspector {
        fn inspect(&self, path: &Path) -> Result<Option<InspectedModule>, PluginHostError> {
            let version = self.api_version.load(Ordering::SeqCst);
            Ok(self.builtin.inspect(path)?.map(|mut module| {
                module.descriptor = module.descriptor.with_api_version(version);
                module
            }))
        }

        fn release(&self, name: &str) {
            self.released.record(name);
        }
    }

    #[tokio::test]
    async fn test_api_version_mismatch_leaves_table_alone() {
        let fx = Fixture::new();
        let inspector = Arc::new(VersionedInspector {
            builtin: BuiltinInspector::new(),
            api_version: AtomicU32::new(API_VERSION),
            released: Journal::new(),
        });
        inspector.builtin.register("a", fx.plugin("a").factory());
        let host = PluginHost::new(fx.config(), inspector.clone());
        let path = fx.module("a");
        host.load(&path).await.unwrap();

        inspector.api_version.store(API_VERSION + 1, Ordering::SeqCst);
        let err = host.load(&path).await.unwrap_err();

        assert!(matches!(
            err,
            PluginHostError::ApiVersionMismatch { expected, found }
                if expected == API_VERSION && found == API_VERSION + 1
        ));
        assert!(host.is_loaded("a").await);
        assert_eq!(fx.journal.entries(), vec!["a:start", "a:migrate"]);
        // The rejected module's context was released; the running one was not.
        assert_eq!(inspector.released.entries(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_load_plugins_survives_panicking_plugin() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a").panic_on_start());
        fx.register("b", fx.plugin("b"));
        fx.module("a");
        fx.module("b");
        let host = fx.host();

        let report = host.load_plugins().await;

        assert_eq!(report.loaded, vec!["b"]);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            PluginHostError::PluginPanicked { ref name } if name == "a"
        ));
        assert_eq!(host.plugin_names().await, vec!["b"]);
    }

    #[tokio::test]
    async fn test_direct_load_returns_panic_as_error() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a").panic_on_start());
        let host = fx.host();
        let path = fx.module("a");

        let err = host.load(&path).await.unwrap_err();
        assert!(matches!(err, PluginHostError::PluginPanicked { ref name } if name == "a"));

        // The name is usable again afterwards.
        fx.register("a", fx.plugin("a"));
        host.load(&path).await.unwrap();
        assert!(host.is_loaded("a").await);
    }

    #[tokio::test]
    async fn test_panic_while_unloading_rename_source_names_old_plugin() {
        let fx = Fixture::new();
        fx.register("a", fx.plugin("a").panic_on_stop());
        fx.register("c", fx.plugin("c"));
        let (reporter, mut failures) = ChannelReporter::channel();
        let host = PluginHost::builder(fx.config(), fx.inspector.clone())
            .error_reporter(reporter)
            .build();
        let old = fx.module("a");
        host.load(&old).await.unwrap();

        let new = fx.dir.path().join("c.mod");
        std::fs::rename(&old, &new).unwrap();
        host.handle_event(ChangeEvent::renamed(&old, &new)).await;

        let failure = failures.recv().await.unwrap();
        assert!(matches!(failure.error, PluginHostError::PluginPanicked { ref name } if name == "a"));
        assert_eq!(failure.name.as_deref(), Some("a"));
        assert_eq!(host.plugin_names().await, vec!["c"]);
    }
}
