//! The save and load pipelines.
//!
//! Both directions walk the same document:
//!
//! ```text
//! VersionsOffset   u64, rewritten once the version table is written
//! EngineVersion    record
//! PackageVersion   record
//! Map              string
//! DestroyedActors  array of names
//! ActorOffsets     array of u64, rewritten after the merge
//! Actors           stream of actor records {Name, Class?, GUID?, Properties, Data}
//! Versions         array of {Key, Version, Name}
//! ```
//!
//! Every actor record is serialized into its own [`SaveGameArchive`] on a worker thread and
//! merged into the top level archive in actor order afterwards. `ActorOffsets[i]` is the
//! absolute position of actor `i` in the uncompressed buffer, which is what lets the loader
//! read actors independently of each other.

use std::{collections::HashMap, sync::Arc};

use crossbeam_channel::RecvTimeoutError;
use indexmap::IndexSet;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use crate::{
    archive::RedirectTable,
    compression::{compress_blob, decompress_blob, Compressor, Lz4Compressor},
    context::{SaveArchive, SaveGameArchive},
    settings::SaveGameSettings,
    storage::Storage,
    threading::ThreadScope,
    version::{
        EngineVersion, FGuid, PackageVersion, SaveGameVersion, VersionTable, SAVE_GAME_VERSION_ID,
    },
    world::{ActorRef, ClassPath, MapReady, ObjectPath, World},
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Save,
    Load,
}

/// Pipeline phases in execution order. A save skips the load only phases and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Idle,
    ReadBlob,
    Decompress,
    VersionOffset,
    Header,
    Versions,
    Travel,
    DestroyedActors,
    ActorOffsets,
    InitializeActors,
    SerializeActors,
    MergeActors,
    WriteVersions,
    RewriteOffsets,
    Compress,
    Persist,
    Done,
}

/// Engine and package stamps plus the map the save was made on.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct SaveHeader {
    pub engine_version: EngineVersion,
    pub package_version: PackageVersion,
    pub map: String,
}
impl SaveHeader {
    pub(crate) fn serialize(&mut self, ar: &mut SaveArchive) -> Result<()> {
        ar.field("EngineVersion", |ar| self.engine_version.serialize_archive(ar))?;
        ar.field("PackageVersion", |ar| self.package_version.serialize_archive(ar))?;
        ar.serialize_field("Map", &mut self.map)
    }
}

pub(crate) fn serialize_versions_offset(ar: &mut SaveArchive, offset: &mut u64) -> Result<()> {
    ar.serialize_field("VersionsOffset", offset)
}

pub(crate) fn serialize_names(ar: &mut SaveArchive, field: &str, names: &mut Vec<String>) -> Result<()> {
    let mut len = names.len() as u32;
    ar.field(field, |ar| {
        ar.array(&mut len, |ar, len| {
            if ar.is_loading() {
                names.clear();
                names.resize_with(len, String::new);
            }
            for name in names.iter_mut() {
                ar.array_element(|ar| ar.value(name))?;
            }
            Ok(())
        })
    })
}

pub(crate) fn serialize_offsets(ar: &mut SaveArchive, offsets: &mut Vec<u64>) -> Result<()> {
    let mut len = offsets.len() as u32;
    ar.field("ActorOffsets", |ar| {
        ar.array(&mut len, |ar, len| {
            if ar.is_loading() {
                offsets.clear();
                offsets.resize(len, 0);
            }
            for offset in offsets.iter_mut() {
                ar.array_element(|ar| ar.value(offset))?;
            }
            Ok(())
        })
    })
}

/// Reads the version table stored at `offset` and returns to the current position.
pub(crate) fn read_versions(archive: &mut SaveGameArchive, offset: u64) -> Result<VersionTable> {
    let resume = archive.versioned().tell();
    archive.versioned_mut().seek_to(offset);
    let mut versions = VersionTable::new();
    archive
        .record()
        .field("Versions", |ar| versions.serialize_archive(ar))?;
    archive.versioned_mut().seek_to(resume);
    Ok(versions)
}

/// `Name`, then `Class` for runtime spawned actors and `GUID` for actors with a spawn id.
pub(crate) fn serialize_identity(
    ar: &mut SaveArchive,
    name: &mut String,
    class: &mut Option<ClassPath>,
    spawn_id: &mut Option<FGuid>,
) -> Result<()> {
    ar.serialize_field("Name", name)?;

    let mut class_path = class
        .as_ref()
        .map(|c| c.as_str().to_owned())
        .unwrap_or_default();
    let has_class = ar.try_field("Class", class.is_some(), |ar| ar.value(&mut class_path))?;
    if ar.is_loading() {
        *class = has_class.map(|()| ClassPath::from(class_path));
    }

    let mut guid = spawn_id.unwrap_or_default();
    let has_guid = ar.try_field("GUID", spawn_id.is_some(), |ar| ar.value(&mut guid))?;
    if ar.is_loading() {
        *spawn_id = has_guid.map(|()| guid);
    }
    Ok(())
}

fn serialize_data(actor: &ActorRef, archive: &mut SaveGameArchive) -> Result<()> {
    archive
        .record()
        .field("Data", |ar| ar.record(|ar| actor.on_serialize(ar)))
}

/// One actor in flight: its identity, live counterpart and private archive.
struct ActorUnit {
    name: String,
    class: Option<ClassPath>,
    spawn_id: Option<FGuid>,
    actor: Option<ActorRef>,
    archive: Option<SaveGameArchive>,
    redirect: Option<(ObjectPath, ObjectPath)>,
}

impl ActorUnit {
    fn new(actor: Option<ActorRef>, archive: SaveGameArchive) -> Self {
        Self {
            name: String::new(),
            class: None,
            spawn_id: None,
            actor,
            archive: Some(archive),
            redirect: None,
        }
    }

    fn archive(&mut self) -> Result<&mut SaveGameArchive> {
        self.archive
            .as_mut()
            .ok_or_else(|| Error::Other(format!("archive of actor {:?} is in use", self.name)))
    }

    fn serialize_identity(&mut self) -> Result<()> {
        let mut name = std::mem::take(&mut self.name);
        let mut class = self.class.take();
        let mut spawn_id = self.spawn_id.take();
        serialize_identity(self.archive()?.record(), &mut name, &mut class, &mut spawn_id)?;
        self.name = name;
        self.class = class;
        self.spawn_id = spawn_id;
        Ok(())
    }

    fn initialize_save(&mut self) -> Result<()> {
        let actor = self
            .actor
            .clone()
            .ok_or_else(|| Error::Other("save unit without an actor".into()))?;
        self.name = actor.name();
        assert!(!self.name.is_empty(), "save game actor without a name");
        if !actor.was_loaded() {
            self.class = Some(actor.class());
        }
        self.spawn_id = actor.spawn_id().filter(FGuid::is_valid);
        self.serialize_identity()
    }

    fn initialize_load<W: World + Send>(
        &mut self,
        scope: &ThreadScope<'_, W>,
        spawn_ids: &HashMap<FGuid, ActorRef>,
    ) -> Result<()> {
        self.serialize_identity()?;

        let name = self.name.clone();
        let class = self.class.clone();
        let spawn_id = self.spawn_id;
        let reuse = spawn_id.and_then(|id| spawn_ids.get(&id).cloned());

        let (actor, saved_path) = scope.call(move |world: &mut W| -> Result<_> {
            let saved_path = world.actor_path(&name);
            let actor = match class {
                None => world.find_actor(&name),
                Some(_) if reuse.is_some() => reuse,
                Some(class) => {
                    let actor = world.spawn_actor(&class, &name)?;
                    debug!("spawned {name} ({class})");
                    if let Some(id) = spawn_id {
                        actor.set_spawn_id(id);
                    }
                    Some(actor)
                }
            };
            Ok((actor, saved_path))
        })??;

        match &actor {
            // Spawned or reused actors may have resolved to a different name.
            Some(actor) if self.class.is_some() => {
                let path = actor.path();
                if path != saved_path {
                    self.redirect = Some((saved_path, path));
                }
            }
            Some(_) => {}
            None => warn!("saved actor {} not found in the world, skipping", self.name),
        }
        self.actor = actor;
        Ok(())
    }

    /// Properties on the worker, then the custom payload on whichever thread the actor allows.
    fn serialize_body<W: Send>(&mut self, scope: &ThreadScope<'_, W>) -> Result<()> {
        let Some(actor) = self.actor.clone() else {
            return Ok(());
        };
        let archive = self.archive()?;
        archive
            .record()
            .field("Properties", |ar| actor.serialize_properties(ar))?;

        if actor.is_thread_safe() {
            return serialize_data(&actor, archive);
        }

        let mut archive = self
            .archive
            .take()
            .ok_or_else(|| Error::Other(format!("archive of actor {:?} is in use", self.name)))?;
        let archive = scope.call(move |_: &mut W| {
            serialize_data(&actor, &mut archive).map(|()| archive)
        })??;
        self.archive = Some(archive);
        Ok(())
    }
}

/// Runs one save or load against a world.
///
/// ```no_run
/// # fn run<W: savegame::World + Send>(world: &mut W) -> savegame::Result<()> {
/// use indexmap::IndexSet;
/// use savegame::{FileStorage, Operation, SaveGameSerializer, SaveGameSettings};
///
/// let settings = SaveGameSettings::new().slot_name("Autosave");
/// let storage = FileStorage::new("saves");
/// let mut destroyed = IndexSet::new();
///
/// SaveGameSerializer::new(Operation::Save, &settings, &storage).run(world, &mut destroyed)?;
/// # Ok(())
/// # }
/// ```
pub struct SaveGameSerializer<'a> {
    operation: Operation,
    settings: &'a SaveGameSettings,
    storage: &'a dyn Storage,
    compressor: &'a dyn Compressor,
    phase: Phase,
}

impl<'a> SaveGameSerializer<'a> {
    pub fn new(operation: Operation, settings: &'a SaveGameSettings, storage: &'a dyn Storage) -> Self {
        Self {
            operation,
            settings,
            storage,
            compressor: &Lz4Compressor,
            phase: Phase::Idle,
        }
    }
    pub fn compressor(mut self, compressor: &'a dyn Compressor) -> Self {
        self.compressor = compressor;
        self
    }
    pub fn operation(&self) -> Operation {
        self.operation
    }
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, phase: Phase) {
        assert!(
            phase > self.phase,
            "phase {phase:?} cannot follow {:?}",
            self.phase
        );
        debug!("SaveGame[{:?}]: {:?} -> {:?}", self.operation, self.phase, phase);
        self.phase = phase;
    }

    fn thread_pool(&self) -> Result<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.settings.worker_count())
            .thread_name(|i| format!("savegame-worker-{i}"))
            .build()
            .map_err(|e| Error::Other(e.to_string()))
    }

    /// Runs the operation to completion. `destroyed` is the set of level actors destroyed so
    /// far: written by a save, replaced by a load.
    #[instrument(skip_all, fields(operation = ?self.operation, slot = %self.settings.slot_name))]
    pub fn run<W: World + Send>(&mut self, world: &mut W, destroyed: &mut IndexSet<String>) -> Result<()> {
        assert_eq!(self.phase, Phase::Idle, "serializer can only run once");
        info!("SaveGame[{:?}]: Begin", self.operation);
        match self.operation {
            Operation::Save => self.save(world, destroyed)?,
            Operation::Load => self.load(world, destroyed)?,
        }
        self.advance(Phase::Done);
        info!("SaveGame[{:?}]: End", self.operation);
        Ok(())
    }

    #[instrument(name = "save", skip_all)]
    fn save<W: World + Send>(&mut self, world: &mut W, destroyed: &IndexSet<String>) -> Result<()> {
        let json = self.settings.json_mirror;
        let mut top = SaveGameArchive::writer(json)?;
        top.versioned_mut()
            .set_engine_version(self.settings.engine_version.clone());
        top.versioned_mut()
            .set_package_version(self.settings.package_version);
        top.record().use_custom_version(
            SAVE_GAME_VERSION_ID,
            SaveGameVersion::LATEST as i32,
            "SaveGameVersion",
        );

        self.advance(Phase::VersionOffset);
        let versions_offset_position = top.versioned().tell();
        let mut versions_offset = 0;
        serialize_versions_offset(top.record(), &mut versions_offset)?;

        self.advance(Phase::Header);
        let mut header = SaveHeader {
            engine_version: self.settings.engine_version.clone(),
            package_version: self.settings.package_version,
            map: world.map_name(),
        };
        header.serialize(top.record())?;

        self.advance(Phase::DestroyedActors);
        let mut destroyed: Vec<String> = destroyed.iter().cloned().collect();
        serialize_names(top.record(), "DestroyedActors", &mut destroyed)?;

        self.advance(Phase::ActorOffsets);
        let actors = world.save_game_actors();
        let offsets_position = top.versioned().tell();
        let mut offsets = vec![0; actors.len()];
        serialize_offsets(top.record(), &mut offsets)?;

        let mut units = actors
            .into_iter()
            .map(|actor| Ok(ActorUnit::new(Some(actor), SaveGameArchive::writer(json)?)))
            .collect::<Result<Vec<_>>>()?;
        let pool = self.thread_pool()?;

        self.advance(Phase::InitializeActors);
        {
            let scope = ThreadScope::new(&mut *world, self.settings.poll_interval);
            scope.run_parallel(&pool, &mut units, |unit| unit.initialize_save())?;
        }

        self.advance(Phase::SerializeActors);
        {
            let scope = ThreadScope::new(&mut *world, self.settings.poll_interval);
            scope.run_parallel(&pool, &mut units, |unit| unit.serialize_body(&scope))?;
        }

        self.advance(Phase::MergeActors);
        top.record().field("Actors", |ar| {
            ar.stream(|ar| {
                for (index, unit) in units.into_iter().enumerate() {
                    let archive = unit
                        .archive
                        .ok_or_else(|| Error::Other(format!("archive of actor {:?} is in use", unit.name)))?;
                    let (mut archive, json) = archive.close()?;
                    archive.consolidate_versions(ar.versioned_mut());

                    ar.stream_element(|ar| {
                        ar.record(|ar| {
                            if let Some(json) = json {
                                ar.graft_json(json);
                            }
                            let parent = ar.versioned_mut();
                            offsets[index] = parent.len();
                            parent.append(&archive.into_bytes())
                        })
                    })?;
                    debug!("merged {} at {}", unit.name, offsets[index]);
                }
                Ok(())
            })
        })?;

        self.advance(Phase::WriteVersions);
        versions_offset = top.versioned().tell();
        let mut versions = top.versioned().custom_versions().clone();
        top.record().field("Versions", |ar| versions.serialize_archive(ar))?;

        self.advance(Phase::RewriteOffsets);
        let end = top.versioned().tell();
        top.record().rewrite(|ar| {
            ar.versioned_mut().seek_to(versions_offset_position);
            serialize_versions_offset(ar, &mut versions_offset)?;
            ar.versioned_mut().seek_to(offsets_position);
            serialize_offsets(ar, &mut offsets)
        })?;
        top.versioned_mut().seek_to(end);

        let (archive, json) = top.close()?;
        let data = archive.into_bytes();

        self.advance(Phase::Compress);
        let blob = compress_blob(self.compressor, &data)?;
        debug!("compressed {} bytes to {}", data.len(), blob.len());

        self.advance(Phase::Persist);
        if let Some(json) = json {
            let slot = self.settings.json_slot_name();
            let text = serde_json::to_vec_pretty(&JsonValue::Object(json))?;
            if !self.storage.put(&slot, &text) {
                return Err(Error::StorageWrite(slot));
            }
        }
        if !self.storage.put(&self.settings.slot_name, &blob) {
            return Err(Error::StorageWrite(self.settings.slot_name.clone()));
        }
        Ok(())
    }

    #[instrument(name = "load", skip_all)]
    fn load<W: World + Send>(&mut self, world: &mut W, destroyed: &mut IndexSet<String>) -> Result<()> {
        self.advance(Phase::ReadBlob);
        let slot = &self.settings.slot_name;
        let blob = self
            .storage
            .get(slot)
            .ok_or_else(|| Error::SlotNotFound(slot.clone()))?;

        self.advance(Phase::Decompress);
        let data: Arc<[u8]> = decompress_blob(self.compressor, &blob)?.into();
        let mut top = SaveGameArchive::reader(data.clone(), 0)?;

        self.advance(Phase::VersionOffset);
        let mut versions_offset = 0;
        serialize_versions_offset(top.record(), &mut versions_offset)?;

        self.advance(Phase::Header);
        let mut header = SaveHeader::default();
        header.serialize(top.record())?;
        top.versioned_mut()
            .set_engine_version(header.engine_version.clone());
        top.versioned_mut()
            .set_package_version(header.package_version);

        self.advance(Phase::Versions);
        let versions = read_versions(&mut top, versions_offset)?;
        top.versioned_mut().set_custom_versions(versions);
        match top.record().use_custom_version(
            SAVE_GAME_VERSION_ID,
            SaveGameVersion::LATEST as i32,
            "SaveGameVersion",
        ) {
            Some(version) if version <= SaveGameVersion::LATEST as i32 => {
                debug!("save game version {version}")
            }
            version => {
                return Err(Error::Other(format!(
                    "unsupported save game version {version:?}"
                )))
            }
        }

        self.advance(Phase::Travel);
        self.travel(world, &header.map)?;

        self.advance(Phase::DestroyedActors);
        let mut names = vec![];
        serialize_names(top.record(), "DestroyedActors", &mut names)?;
        destroyed.clear();
        for name in names {
            if let Some(actor) = world.find_actor(&name) {
                debug!("destroying {name}");
                world.destroy_actor(&actor);
                destroyed.insert(name);
            }
        }

        self.advance(Phase::ActorOffsets);
        let mut offsets = vec![];
        serialize_offsets(top.record(), &mut offsets)?;

        self.advance(Phase::InitializeActors);
        let spawn_ids: HashMap<FGuid, ActorRef> = world
            .save_game_actors()
            .into_iter()
            .filter_map(|actor| {
                let id = actor.spawn_id().filter(FGuid::is_valid)?;
                Some((id, actor))
            })
            .collect();
        let mut units = offsets
            .iter()
            .map(|&offset| {
                let mut archive = SaveGameArchive::reader(data.clone(), offset)?;
                archive.consolidate_versions(&mut top);
                Ok(ActorUnit::new(None, archive))
            })
            .collect::<Result<Vec<_>>>()?;
        let pool = self.thread_pool()?;
        {
            let scope = ThreadScope::new(&mut *world, self.settings.poll_interval);
            scope.run_parallel(&pool, &mut units, |unit| {
                unit.initialize_load(&scope, &spawn_ids)
            })?;
        }

        let mut redirects = RedirectTable::new();
        for (from, to) in units.iter().filter_map(|unit| unit.redirect.clone()) {
            redirects.add(from, to);
        }
        let redirects = Arc::new(redirects);
        top.versioned_mut().set_redirects(redirects.clone());
        for unit in &mut units {
            unit.archive()?.versioned_mut().set_redirects(redirects.clone());
        }

        self.advance(Phase::SerializeActors);
        {
            let scope = ThreadScope::new(&mut *world, self.settings.poll_interval);
            scope.run_parallel(&pool, &mut units, |unit| unit.serialize_body(&scope))?;
        }

        for unit in units {
            if let Some(archive) = unit.archive {
                archive.close()?;
            }
        }
        top.close()?;
        Ok(())
    }

    /// Requests the saved map and waits for the host to report it ready.
    #[instrument(skip(self, world))]
    fn travel<W: World>(&self, world: &mut W, map: &str) -> Result<()> {
        let (ready, rx) = MapReady::new();
        debug!("travelling to {map}");
        world.travel(map, ready);
        loop {
            match rx.recv_timeout(self.settings.poll_interval) {
                Ok(()) => return Ok(()),
                Err(RecvTimeoutError::Timeout) => world.poll_travel(),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Other(format!("travel to {map} was abandoned")))
                }
            }
        }
    }
}
