mod archive;
mod formatter;

use std::{
    sync::{Arc, Mutex, MutexGuard},
    thread::ThreadId,
};

use indexmap::IndexMap;

use crate::{
    formatter::{Formatter, Value},
    property::{Properties, Property},
    world::{ActorRef, ClassPath, MapReady, ObjectPath, SaveGameActor, World},
    Error, FGuid, Result, SaveArchive,
};

pub(crate) const LEVEL: &str = "/Game/Maps/Arena";
pub(crate) const CRATE_CLASS: &str = "/Game/Blueprints/BP_Crate.BP_Crate_C";
pub(crate) const G1: FGuid = FGuid::new(0x1111_2222, 0x3333_4444, 0x5555_6666, 0x7777_8888);
pub(crate) const PAYLOAD_VERSION_ID: FGuid = FGuid::new(0xAB, 0xCD, 0xEF, 0x01);
pub(crate) const PAYLOAD_VERSION: i32 = 2;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// Custom payload written from `on_serialize`.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Payload {
    pub counter: i32,
    pub note: String,
}

pub(crate) struct TestActor {
    name: String,
    path: ObjectPath,
    class: ClassPath,
    was_loaded: bool,
    thread_safe: bool,
    spawn_id: Mutex<Option<FGuid>>,
    pub properties: Mutex<Properties>,
    pub payload: Mutex<Payload>,
    pub serialized_on: Mutex<Option<ThreadId>>,
}

impl TestActor {
    pub fn properties(&self) -> Properties {
        lock(&self.properties).clone()
    }
    pub fn payload(&self) -> Payload {
        lock(&self.payload).clone()
    }
    pub fn set_payload(&self, counter: i32, note: &str) {
        *lock(&self.payload) = Payload {
            counter,
            note: note.into(),
        };
    }
    pub fn serialized_on(&self) -> Option<ThreadId> {
        *lock(&self.serialized_on)
    }
}

impl SaveGameActor for TestActor {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn path(&self) -> ObjectPath {
        self.path.clone()
    }
    fn class(&self) -> ClassPath {
        self.class.clone()
    }
    fn was_loaded(&self) -> bool {
        self.was_loaded
    }
    fn spawn_id(&self) -> Option<FGuid> {
        *lock(&self.spawn_id)
    }
    fn set_spawn_id(&self, id: FGuid) {
        *lock(&self.spawn_id) = Some(id);
    }
    fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }
    fn serialize_properties(&self, ar: &mut SaveArchive) -> Result<()> {
        lock(&self.properties).serialize_archive(ar)
    }
    fn on_serialize(&self, ar: &mut SaveArchive) -> Result<()> {
        *lock(&self.serialized_on) = Some(std::thread::current().id());
        let mut payload = lock(&self.payload);
        let Payload { counter, note } = &mut *payload;
        let version = ar
            .use_custom_version(PAYLOAD_VERSION_ID, PAYLOAD_VERSION, "TestPayloadVersion")
            .unwrap_or(0);
        ar.serialize_field("Counter", counter)?;
        if version >= 2 {
            let has_note = !note.is_empty();
            ar.try_field("Note", has_note, |ar| ar.value(note))?;
        }
        Ok(())
    }
}

/// In-memory level with a handful of actors.
pub(crate) struct TestWorld {
    pub map: String,
    pub actors: IndexMap<String, Arc<TestActor>>,
    pub classes: Vec<ClassPath>,
    pub destroyed: Vec<String>,
    pub travelled_to: Vec<String>,
    /// Give every spawned actor a fresh name, the way an engine resolves name clashes.
    pub rename_spawned: bool,
    /// Report the map ready from `poll_travel` rather than from `travel`.
    pub deferred_travel: bool,
    pending_travel: Option<MapReady>,
    spawned: usize,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            map: LEVEL.into(),
            actors: IndexMap::new(),
            classes: vec![CRATE_CLASS.into()],
            destroyed: vec![],
            travelled_to: vec![],
            rename_spawned: false,
            deferred_travel: false,
            pending_travel: None,
            spawned: 0,
        }
    }

    fn path_of(name: &str) -> ObjectPath {
        let level = LEVEL.rsplit('/').next().unwrap_or(LEVEL);
        ObjectPath::new(format!("{LEVEL}.{level}:PersistentLevel.{name}"))
    }

    fn insert(&mut self, name: &str, class: &str, was_loaded: bool, thread_safe: bool) -> Arc<TestActor> {
        let actor = Arc::new(TestActor {
            name: name.into(),
            path: Self::path_of(name),
            class: class.into(),
            was_loaded,
            thread_safe,
            spawn_id: Mutex::new(None),
            properties: Mutex::new(Properties::new()),
            payload: Mutex::new(Payload::default()),
            serialized_on: Mutex::new(None),
        });
        self.actors.insert(name.into(), actor.clone());
        actor
    }

    /// An actor placed in the level.
    pub fn level_actor(&mut self, name: &str) -> Arc<TestActor> {
        self.insert(name, "/Script/Engine.StaticMeshActor", true, true)
    }

    /// An actor placed in the level whose payload must be serialized on the main thread.
    pub fn unsafe_level_actor(&mut self, name: &str) -> Arc<TestActor> {
        self.insert(name, "/Script/Engine.StaticMeshActor", true, false)
    }

    /// An actor spawned at runtime without a spawn id.
    pub fn runtime_actor(&mut self, name: &str) -> Arc<TestActor> {
        self.insert(name, CRATE_CLASS, false, true)
    }

    /// An actor spawned at runtime with a spawn id.
    pub fn spawned_actor(&mut self, name: &str, id: FGuid) -> Arc<TestActor> {
        let actor = self.insert(name, CRATE_CLASS, false, true);
        actor.set_spawn_id(id);
        actor
    }

    pub fn actor(&self, name: &str) -> Arc<TestActor> {
        self.actors[name].clone()
    }
}

impl World for TestWorld {
    fn map_name(&self) -> String {
        self.map.clone()
    }
    fn save_game_actors(&self) -> Vec<ActorRef> {
        self.actors
            .values()
            .map(|actor| actor.clone() as ActorRef)
            .collect()
    }
    fn find_actor(&self, name: &str) -> Option<ActorRef> {
        self.actors.get(name).map(|actor| actor.clone() as ActorRef)
    }
    fn spawn_actor(&mut self, class: &ClassPath, name: &str) -> Result<ActorRef> {
        if !self.classes.contains(class) {
            return Err(Error::ClassNotFound(class.clone()));
        }
        self.spawned += 1;
        let name = if self.rename_spawned || self.actors.contains_key(name) {
            format!("{name}_{}", self.spawned)
        } else {
            name.to_owned()
        };
        Ok(self.insert(&name, class.as_str(), false, true))
    }
    fn destroy_actor(&mut self, actor: &ActorRef) {
        let name = actor.name();
        self.actors.shift_remove(&name);
        self.destroyed.push(name);
    }
    fn actor_path(&self, name: &str) -> ObjectPath {
        Self::path_of(name)
    }
    fn travel(&mut self, map: &str, ready: MapReady) {
        self.map = map.into();
        self.travelled_to.push(map.into());
        if self.deferred_travel {
            self.pending_travel = Some(ready);
        } else {
            ready.fire();
        }
    }
    fn poll_travel(&mut self) {
        if let Some(ready) = self.pending_travel.take() {
            ready.fire();
        }
    }
}

/// Records every call it receives, answering `try_*` with a fixed value.
#[derive(Debug, Default)]
pub(crate) struct RecordingFormatter {
    pub calls: Vec<String>,
    pub present: bool,
}

impl RecordingFormatter {
    pub fn new(present: bool) -> Self {
        Self {
            calls: vec![],
            present,
        }
    }
    fn log(&mut self, call: impl Into<String>) -> Result<()> {
        self.calls.push(call.into());
        Ok(())
    }
}

impl Formatter for RecordingFormatter {
    fn is_loading(&self) -> bool {
        false
    }
    fn has_document_tree(&self) -> bool {
        false
    }
    fn enter_record(&mut self) -> Result<()> {
        self.log("enter_record")
    }
    fn leave_record(&mut self) -> Result<()> {
        self.log("leave_record")
    }
    fn enter_field(&mut self, name: &str) -> Result<()> {
        self.log(format!("enter_field {name}"))
    }
    fn leave_field(&mut self) -> Result<()> {
        self.log("leave_field")
    }
    fn try_enter_field(&mut self, name: &str, enter_when_writing: bool) -> Result<bool> {
        self.log(format!("try_enter_field {name} {enter_when_writing}"))?;
        Ok(self.present)
    }
    fn enter_array(&mut self, len: &mut u32) -> Result<()> {
        self.log(format!("enter_array {len}"))
    }
    fn leave_array(&mut self) -> Result<()> {
        self.log("leave_array")
    }
    fn enter_array_element(&mut self) -> Result<()> {
        self.log("enter_array_element")
    }
    fn leave_array_element(&mut self) -> Result<()> {
        self.log("leave_array_element")
    }
    fn enter_stream(&mut self) -> Result<()> {
        self.log("enter_stream")
    }
    fn leave_stream(&mut self) -> Result<()> {
        self.log("leave_stream")
    }
    fn enter_stream_element(&mut self) -> Result<()> {
        self.log("enter_stream_element")
    }
    fn leave_stream_element(&mut self) -> Result<()> {
        self.log("leave_stream_element")
    }
    fn enter_map(&mut self, len: &mut u32) -> Result<()> {
        self.log(format!("enter_map {len}"))
    }
    fn leave_map(&mut self) -> Result<()> {
        self.log("leave_map")
    }
    fn enter_map_element(&mut self, name: &mut String) -> Result<()> {
        self.log(format!("enter_map_element {name}"))
    }
    fn leave_map_element(&mut self) -> Result<()> {
        self.log("leave_map_element")
    }
    fn enter_attributed_value(&mut self) -> Result<()> {
        self.log("enter_attributed_value")
    }
    fn leave_attributed_value(&mut self) -> Result<()> {
        self.log("leave_attributed_value")
    }
    fn enter_attribute(&mut self, name: &str) -> Result<()> {
        self.log(format!("enter_attribute {name}"))
    }
    fn leave_attribute(&mut self) -> Result<()> {
        self.log("leave_attribute")
    }
    fn try_enter_attribute(&mut self, name: &str, enter_when_writing: bool) -> Result<bool> {
        self.log(format!("try_enter_attribute {name} {enter_when_writing}"))?;
        Ok(self.present)
    }
    fn enter_attributed_value_value(&mut self) -> Result<()> {
        self.log("enter_attributed_value_value")
    }
    fn leave_attributed_value_value(&mut self) -> Result<()> {
        self.log("leave_attributed_value_value")
    }
    fn try_enter_attributed_value_value(&mut self) -> Result<bool> {
        self.log("try_enter_attributed_value_value")?;
        Ok(self.present)
    }
    fn serialize(&mut self, value: Value<'_>) -> Result<()> {
        self.log(format!("serialize {value:?}"))
    }
}

/// A property bag exercising most value kinds.
pub(crate) fn sample_properties() -> Properties {
    let mut inner = Properties::new();
    inner.insert("X", Property::Float(1.5));
    inner.insert("Y", Property::Float(-2.0));

    let mut properties = Properties::new();
    properties.insert("Health", Property::Int(100));
    properties.insert("Name", Property::Str("Wall".into()));
    properties.insert("Visible", Property::Bool(true));
    properties.insert("Offset", Property::Struct(inner));
    properties.insert(
        "Tags",
        Property::Array(vec![Property::Name("Solid".into()), Property::Name("Static".into())]),
    );
    properties.insert("Blob", Property::Bytes(vec![1, 2, 3]));
    properties
}
