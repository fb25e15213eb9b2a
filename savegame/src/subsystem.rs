use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use indexmap::IndexSet;
use tracing::debug;

use crate::{
    compression::{Compressor, Lz4Compressor},
    serializer::{Operation, SaveGameSerializer},
    settings::SaveGameSettings,
    storage::Storage,
    world::{SaveGameActor, World},
    Result,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decrements the in-flight counter when an operation ends, however it ends.
struct Busy<'a>(&'a AtomicUsize);
impl<'a> Busy<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}
impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Entry point a game holds on to for the lifetime of its world.
///
/// Remembers which level actors were destroyed so a load can destroy them again, and runs
/// save and load operations one at a time: a call made while another operation is running
/// waits for it to finish.
pub struct SaveGameSubsystem {
    settings: SaveGameSettings,
    storage: Arc<dyn Storage>,
    compressor: Arc<dyn Compressor>,
    destroyed_level_actors: Mutex<IndexSet<String>>,
    pipe: Mutex<()>,
    in_flight: AtomicUsize,
}

impl SaveGameSubsystem {
    pub fn new(settings: SaveGameSettings, storage: Arc<dyn Storage>) -> Self {
        Self {
            settings,
            storage,
            compressor: Arc::new(Lz4Compressor),
            destroyed_level_actors: Mutex::new(IndexSet::new()),
            pipe: Mutex::new(()),
            in_flight: AtomicUsize::new(0),
        }
    }
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }
    pub fn settings(&self) -> &SaveGameSettings {
        &self.settings
    }
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Host hook for every destroyed actor. Only actors that came with the level are tracked;
    /// runtime spawned actors simply are not saved anymore.
    pub fn on_actor_destroyed(&self, actor: &dyn SaveGameActor) {
        if actor.was_loaded() {
            let name = actor.name();
            debug!("tracking destroyed level actor {name}");
            lock(&self.destroyed_level_actors).insert(name);
        }
    }

    /// Host hook for when the world goes away.
    pub fn on_world_cleanup(&self) {
        lock(&self.destroyed_level_actors).clear();
    }

    pub fn destroyed_level_actors(&self) -> Vec<String> {
        lock(&self.destroyed_level_actors).iter().cloned().collect()
    }

    /// Whether a save or load is queued or running.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn save<W: World + Send>(&self, world: &mut W) -> Result<()> {
        self.run(Operation::Save, world)
    }

    pub fn load<W: World + Send>(&self, world: &mut W) -> Result<()> {
        self.run(Operation::Load, world)
    }

    fn run<W: World + Send>(&self, operation: Operation, world: &mut W) -> Result<()> {
        let _busy = Busy::new(&self.in_flight);
        let _pipe = lock(&self.pipe);

        // not held while running: destroying actors calls back into on_actor_destroyed
        let mut destroyed = lock(&self.destroyed_level_actors).clone();
        SaveGameSerializer::new(operation, &self.settings, self.storage.as_ref())
            .compressor(self.compressor.as_ref())
            .run(world, &mut destroyed)?;

        if operation == Operation::Load {
            *lock(&self.destroyed_level_actors) = destroyed;
        }
        Ok(())
    }
}
