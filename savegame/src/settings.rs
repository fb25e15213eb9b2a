use std::{num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};

use crate::version::{EngineVersion, PackageVersion};

/// Configuration of save and load operations.
///
/// ```
/// use savegame::SaveGameSettings;
///
/// let settings = SaveGameSettings::new()
///     .slot_name("Slot1")
///     .json_mirror(true)
///     .max_concurrency(Some(4));
/// assert_eq!("Slot1.json", settings.json_slot_name());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveGameSettings {
    pub slot_name: String,
    /// Also write the pretty printed JSON mirror of every save.
    pub json_mirror: bool,
    /// Worker threads of the parallel phases. `None` uses the available parallelism.
    pub max_concurrency: Option<usize>,
    /// Bounded wait used while pumping the main thread queue and waiting for a map.
    pub poll_interval: Duration,
    pub engine_version: EngineVersion,
    pub package_version: PackageVersion,
}

impl Default for SaveGameSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveGameSettings {
    pub fn new() -> Self {
        Self {
            slot_name: "SaveGame".into(),
            json_mirror: cfg!(debug_assertions),
            max_concurrency: None,
            poll_interval: Duration::from_millis(1),
            engine_version: EngineVersion::default(),
            package_version: PackageVersion::default(),
        }
    }
    pub fn slot_name(mut self, slot_name: impl Into<String>) -> Self {
        self.slot_name = slot_name.into();
        self
    }
    pub fn json_mirror(mut self, json_mirror: bool) -> Self {
        self.json_mirror = json_mirror;
        self
    }
    pub fn max_concurrency(mut self, max_concurrency: Option<usize>) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
    pub fn engine_version(mut self, engine_version: EngineVersion) -> Self {
        self.engine_version = engine_version;
        self
    }
    pub fn package_version(mut self, package_version: PackageVersion) -> Self {
        self.package_version = package_version;
        self
    }

    pub fn json_slot_name(&self) -> String {
        format!("{}.json", self.slot_name)
    }

    /// Number of workers to run with, at least one.
    pub fn worker_count(&self) -> usize {
        self.max_concurrency
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
    }
}
