//! Filesystem change events and how they reduce to unload/load steps

use std::path::{Path, PathBuf};

use notify::event::{EventKind, MetadataKind, ModifyKind, RenameMode};

use super::config::PluginHostConfig;
use super::discovery::plugin_name;

/// A change to a module file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created { path: PathBuf },
    Changed { path: PathBuf },
    Deleted { path: PathBuf },
    Renamed { from: PathBuf, to: PathBuf },
}

/// The work an event reduces to: unload first, then load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    /// Plugin name to unload
    pub unload: Option<String>,
    /// Module path to load once the unload has completed
    pub load: Option<PathBuf>,
}

impl ChangeEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::Created { path: path.into() }
    }

    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self::Changed { path: path.into() }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::Deleted { path: path.into() }
    }

    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::Renamed {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Short name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Changed { .. } => "changed",
            Self::Deleted { .. } => "deleted",
            Self::Renamed { .. } => "renamed",
        }
    }

    /// The path the event ends up at (the new path for renames)
    pub fn path(&self) -> &Path {
        match self {
            Self::Created { path } | Self::Changed { path } | Self::Deleted { path } => path,
            Self::Renamed { to, .. } => to,
        }
    }

    /// Reduce the event to an unload and/or a load
    ///
    /// | Event   | Unload        | Load     |
    /// |---------|---------------|----------|
    /// | Created |               | path     |
    /// | Deleted | name(path)    |          |
    /// | Changed | name(path)    | path     |
    /// | Renamed | name(from)    | to       |
    pub fn reduce(&self) -> Reduction {
        match self {
            Self::Created { path } => Reduction {
                unload: None,
                load: Some(path.clone()),
            },
            Self::Deleted { path } => Reduction {
                unload: plugin_name(path),
                load: None,
            },
            Self::Changed { path } => Reduction {
                unload: plugin_name(path),
                load: Some(path.clone()),
            },
            Self::Renamed { from, to } => Reduction {
                unload: plugin_name(from),
                load: Some(to.clone()),
            },
        }
    }

    /// Drop events for files that are not modules.
    ///
    /// A rename only half inside the filter becomes a create or a delete.
    pub fn filter(self, config: &PluginHostConfig) -> Option<Self> {
        match self {
            Self::Renamed { from, to } => {
                match (config.matches_extension(&from), config.matches_extension(&to)) {
                    (true, true) => Some(Self::Renamed { from, to }),
                    (true, false) => Some(Self::Deleted { path: from }),
                    (false, true) => Some(Self::Created { path: to }),
                    (false, false) => None,
                }
            }
            other => config.matches_extension(other.path()).then_some(other),
        }
    }

    /// Translate a raw notify event into change events
    pub fn from_notify(event: &notify::Event) -> Vec<Self> {
        let each = |make: fn(PathBuf) -> Self| -> Vec<Self> {
            event.paths.iter().cloned().map(make).collect()
        };

        match &event.kind {
            EventKind::Create(_) => each(|path| Self::Created { path }),
            EventKind::Remove(_) => each(|path| Self::Deleted { path }),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                vec![Self::renamed(event.paths[0].clone(), event.paths[1].clone())]
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                each(|path| Self::Deleted { path })
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                each(|path| Self::Created { path })
            }
            // Backends that cannot tell which side of a rename they saw
            EventKind::Modify(ModifyKind::Name(_)) => each(|path| {
                if path.exists() {
                    Self::Created { path }
                } else {
                    Self::Deleted { path }
                }
            }),
            EventKind::Modify(ModifyKind::Metadata(kind)) => match kind {
                MetadataKind::WriteTime | MetadataKind::Any => each(|path| Self::Changed { path }),
                _ => Vec::new(),
            },
            EventKind::Modify(_) => each(|path| Self::Changed { path }),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }
}

/// Collapse redundant events in a burst.
///
/// A `Changed` directly following a `Created` or `Changed` of the same path
/// adds nothing; everything else keeps its order.
pub fn coalesce(events: Vec<ChangeEvent>) -> Vec<ChangeEvent> {
    let mut events = events;
    events.dedup_by(|next, previous| match (next, previous) {
        (
            ChangeEvent::Changed { path },
            ChangeEvent::Created { path: prior } | ChangeEvent::Changed { path: prior },
        ) => path == prior,
        _ => false,
    });
    events
}
