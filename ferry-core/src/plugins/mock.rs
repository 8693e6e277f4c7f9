//! Mock plugin for testing
//!
//! [`MockPlugin`] records every lifecycle hook into a shared [`Journal`] and
//! can be told to fail, panic or stall in specific hooks.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ferry_plugin_api::{
    MigrationContext, Plugin, PluginError, PluginManifest, ServiceCollection, async_trait,
};

/// Shared, ordered record of lifecycle calls across plugins
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Snapshot of all entries in order
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Position of the first entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .position(|e| e == entry)
    }

    /// Number of entries equal to `entry`
    pub fn count(&self, entry: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| *e == entry)
            .count()
    }
}

type ServiceFn = Arc<dyn Fn(&mut ServiceCollection) + Send + Sync>;

/// A plugin whose behaviour is scripted by the test
#[derive(Clone)]
pub struct MockPlugin {
    label: String,
    journal: Journal,
    fail_start: Option<String>,
    fail_migrate: Option<String>,
    fail_stop: Option<String>,
    panic_on_start: bool,
    panic_on_stop: bool,
    start_delay: Duration,
    stop_delay: Duration,
    services: Vec<ServiceFn>,
}

impl MockPlugin {
    /// A well-behaved plugin journaling as `label`
    pub fn new(label: impl Into<String>, journal: &Journal) -> Self {
        Self {
            label: label.into(),
            journal: journal.clone(),
            fail_start: None,
            fail_migrate: None,
            fail_stop: None,
            panic_on_start: false,
            panic_on_stop: false,
            start_delay: Duration::ZERO,
            stop_delay: Duration::ZERO,
            services: Vec::new(),
        }
    }

    /// Make `start` fail with `message`
    pub fn fail_start(mut self, message: impl Into<String>) -> Self {
        self.fail_start = Some(message.into());
        self
    }

    /// Make `migrate` fail with `message`
    pub fn fail_migrate(mut self, message: impl Into<String>) -> Self {
        self.fail_migrate = Some(message.into());
        self
    }

    /// Make `stop` fail with `message`
    pub fn fail_stop(mut self, message: impl Into<String>) -> Self {
        self.fail_stop = Some(message.into());
        self
    }

    /// Make `start` panic
    pub fn panic_on_start(mut self) -> Self {
        self.panic_on_start = true;
        self
    }

    /// Make `stop` panic
    pub fn panic_on_stop(mut self) -> Self {
        self.panic_on_stop = true;
        self
    }

    /// Sleep in `start` before returning
    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Sleep in `stop` before returning
    pub fn stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    /// Expose `value` as a service
    pub fn with_service<T: Any + Send + Sync + Clone>(mut self, value: T) -> Self {
        self.services
            .push(Arc::new(move |services: &mut ServiceCollection| {
                services.insert(value.clone())
            }));
        self
    }

    /// Factory producing a fresh copy of this plugin per load
    pub fn factory(self) -> impl Fn() -> Option<Box<dyn Plugin>> + Send + Sync + 'static {
        move || Some(Box::new(self.clone()) as Box<dyn Plugin>)
    }

    fn record(&self, hook: &str) {
        self.journal.record(format!("{}:{}", self.label, hook));
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            name: self.label.clone(),
            version: "0.1.0".to_string(),
            description: "Scripted test plugin".to_string(),
            ..Default::default()
        }
    }

    fn services(&self) -> ServiceCollection {
        let mut services = ServiceCollection::new();
        for add in &self.services {
            add(&mut services);
        }
        services
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        self.record("start");
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if self.panic_on_start {
            panic!("{} panicked in start", self.label);
        }
        match &self.fail_start {
            Some(message) => Err(PluginError::custom(message.clone())),
            None => Ok(()),
        }
    }

    async fn migrate(&mut self, _ctx: &MigrationContext) -> Result<(), PluginError> {
        self.record("migrate");
        match &self.fail_migrate {
            Some(message) => Err(PluginError::migration(message.clone())),
            None => Ok(()),
        }
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        self.record("stop");
        if !self.stop_delay.is_zero() {
            tokio::time::sleep(self.stop_delay).await;
        }
        if self.panic_on_stop {
            panic!("{} panicked in stop", self.label);
        }
        match &self.fail_stop {
            Some(message) => Err(PluginError::custom(message.clone())),
            None => Ok(()),
        }
    }

    async fn dispose(&mut self) {
        self.record("dispose");
    }
}
