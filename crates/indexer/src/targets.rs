//! Versioned task catalog.
//!
//! ```json
//! {
//!   "shared_tasks": ["HeightMetaRetriever", "MainSyncer", "SyncerPersistor"],
//!   "available_targets": [
//!     { "id": 1, "name": "blocks", "desc": "block sequences", "tasks": ["BlockFetcher", "..."] }
//!   ],
//!   "versions": [
//!     { "id": 1, "targets": [1], "parallel": true, "last_in_session": false, "last_in_era": false }
//!   ]
//! }
//! ```

use crate::config::ConfigError;
use crate::payload::TaskId;
use crate::source::BoundaryFilter;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub tasks: Vec<TaskId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Version {
    pub id: i64,
    pub targets: Vec<i64>,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default)]
    pub last_in_session: bool,
    #[serde(default)]
    pub last_in_era: bool,
}

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct Catalog {
    shared_tasks: Vec<TaskId>,
    available_targets: Vec<Target>,
    versions: Vec<Version>,
}

/// Read-only view over a loaded catalog.
#[derive(Debug, Clone)]
pub struct TargetsReader {
    shared_tasks: Vec<TaskId>,
    targets: BTreeMap<i64, Target>,
    versions: BTreeMap<i64, Version>,
}

impl TargetsReader {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadCatalog {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let catalog: Catalog = serde_json::from_str(raw)?;
        if catalog.versions.is_empty() {
            return Err(ConfigError::InvalidCatalog("no versions defined".into()));
        }

        let mut targets = BTreeMap::new();
        for target in catalog.available_targets {
            let id = target.id;
            if targets.insert(id, target).is_some() {
                return Err(ConfigError::InvalidCatalog(format!("target {id} defined twice")));
            }
        }

        let mut versions = BTreeMap::new();
        for version in catalog.versions {
            if let Some(missing) = version.targets.iter().find(|t| !targets.contains_key(t)) {
                return Err(ConfigError::InvalidCatalog(format!(
                    "version {} references undefined target {missing}",
                    version.id
                )));
            }
            let id = version.id;
            if versions.insert(id, version).is_some() {
                return Err(ConfigError::InvalidCatalog(format!("version {id} defined twice")));
            }
        }

        Ok(Self {
            shared_tasks: catalog.shared_tasks,
            targets,
            versions,
        })
    }

    /// Highest version id.
    pub fn current_version_id(&self) -> i64 {
        self.versions.keys().next_back().copied().unwrap_or_default()
    }

    pub fn shared_tasks(&self) -> &[TaskId] {
        &self.shared_tasks
    }

    fn with_shared(&self, tasks: impl IntoIterator<Item = TaskId>) -> HashSet<TaskId> {
        self.shared_tasks.iter().copied().chain(tasks).collect()
    }

    /// Shared tasks plus every target's tasks.
    pub fn all_tasks(&self) -> HashSet<TaskId> {
        self.with_shared(self.targets.values().flat_map(|t| t.tasks.iter().copied()))
    }

    fn version(&self, id: i64) -> Result<&Version, ConfigError> {
        self.versions.get(&id).ok_or(ConfigError::UnknownVersion(id))
    }

    pub fn tasks_for_target_ids(&self, ids: &[i64]) -> Result<HashSet<TaskId>, ConfigError> {
        let mut tasks = Vec::new();
        for id in ids {
            let target = self.targets.get(id).ok_or(ConfigError::UnknownTarget(*id))?;
            tasks.extend(target.tasks.iter().copied());
        }
        Ok(self.with_shared(tasks))
    }

    pub fn tasks_for_version_ids(&self, ids: &[i64]) -> Result<HashSet<TaskId>, ConfigError> {
        let mut target_ids = Vec::new();
        for id in ids {
            target_ids.extend(self.version(*id)?.targets.iter().copied());
        }
        self.tasks_for_target_ids(&target_ids)
    }

    pub fn is_last_in_session_only(&self, id: i64) -> Result<bool, ConfigError> {
        Ok(self.version(id)?.last_in_session)
    }

    pub fn is_last_in_era_only(&self, id: i64) -> Result<bool, ConfigError> {
        Ok(self.version(id)?.last_in_era)
    }

    /// True if any of `ids` is flagged non-parallel.
    pub fn is_any_version_sequential(&self, ids: &[i64]) -> Result<bool, ConfigError> {
        for id in ids {
            if !self.version(*id)?.parallel {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Version ids newer than `version`, ascending.
    pub fn versions_after(&self, version: i64) -> Vec<i64> {
        self.versions.range(version.saturating_add(1)..).map(|(id, _)| *id).collect()
    }

    /// Boundary filter implied by a set of versions: era-only when every version is era-only,
    /// session-only when every version is restricted to session (or era) boundaries.
    pub fn boundary_filter(&self, ids: &[i64]) -> Result<Option<BoundaryFilter>, ConfigError> {
        if ids.is_empty() {
            return Ok(None);
        }
        let mut all_era = true;
        let mut all_boundary = true;
        for id in ids {
            let v = self.version(*id)?;
            all_era &= v.last_in_era && !v.last_in_session;
            all_boundary &= v.last_in_era || v.last_in_session;
        }
        Ok(if all_era {
            Some(BoundaryFilter::LastInEra)
        } else if all_boundary {
            Some(BoundaryFilter::LastInSession)
        } else {
            None
        })
    }
}
