//! The host object model, seen from the save system.
//!
//! Nothing here is implemented by this crate: a game implements [`World`] and
//! [`SaveGameActor`] for its own types and hands the world to a serializer.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{context::SaveArchive, version::FGuid, Result};

/// Full path of a live object, the form object references are stored in.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl From<String> for ObjectPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}
impl From<&str> for ObjectPath {
    fn from(path: &str) -> Self {
        Self(path.to_owned())
    }
}
impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of an actor class, recorded for actors that were spawned at runtime.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassPath(String);

impl ClassPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl From<String> for ClassPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}
impl From<&str> for ClassPath {
    fn from(path: &str) -> Self {
        Self(path.to_owned())
    }
}
impl fmt::Display for ClassPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live object that takes part in saving and loading.
///
/// Methods take `&self`: actors are shared between the world and the serializer's workers, so
/// mutable state lives behind the host's own interior mutability.
pub trait SaveGameActor: Send + Sync {
    /// Name of the actor inside its level. Unique within the world.
    fn name(&self) -> String;
    /// Full object path, the form other actors reference it by.
    fn path(&self) -> ObjectPath;
    fn class(&self) -> ClassPath;
    /// True for actors placed in the level, false for actors spawned at runtime.
    fn was_loaded(&self) -> bool;

    /// Stable identity for spawned actors that may come back under a different name.
    fn spawn_id(&self) -> Option<FGuid> {
        None
    }
    fn set_spawn_id(&self, _id: FGuid) {}

    /// Whether [`SaveGameActor::on_serialize`] may run on a worker thread.
    fn is_thread_safe(&self) -> bool {
        false
    }

    /// Writes or reads the reflected properties of the actor into the current slot.
    fn serialize_properties(&self, ar: &mut SaveArchive) -> Result<()>;

    /// Custom payload. Called inside the actor's `Data` record.
    fn on_serialize(&self, _ar: &mut SaveArchive) -> Result<()> {
        Ok(())
    }
}

pub type ActorRef = Arc<dyn SaveGameActor>;

/// Fired once by the host when a map requested through [`World::travel`] is ready.
#[derive(Debug)]
pub struct MapReady(crossbeam_channel::Sender<()>);

impl MapReady {
    pub(crate) fn new() -> (Self, crossbeam_channel::Receiver<()>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (Self(tx), rx)
    }
    /// Signals the waiting serializer. Consumes the handle, so it can fire only once.
    pub fn fire(self) {
        // the serializer may have given up waiting
        let _ = self.0.send(());
    }
}

/// The game world. Only ever touched from the thread that started the operation.
pub trait World {
    /// Package name of the loaded map.
    fn map_name(&self) -> String;
    /// Every live actor that participates in saving, in a stable order.
    fn save_game_actors(&self) -> Vec<ActorRef>;
    fn find_actor(&self, name: &str) -> Option<ActorRef>;
    /// Spawns an actor of `class` named `name`, tracking it as a save game actor.
    fn spawn_actor(&mut self, class: &ClassPath, name: &str) -> Result<ActorRef>;
    fn destroy_actor(&mut self, actor: &ActorRef);
    /// Path an actor called `name` has when it lives in the current level.
    fn actor_path(&self, name: &str) -> ObjectPath;

    /// Loads `map` and fires `ready` once it is usable. Hosts that finish synchronously fire
    /// it before returning.
    fn travel(&mut self, map: &str, ready: MapReady);
    /// Called repeatedly while a travel is in progress.
    fn poll_travel(&mut self) {}
}
