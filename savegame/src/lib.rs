/*!
Structured, versioned save games for live actor graphs.

A save walks every save game actor of a [`World`] once and produces a compressed binary blob
plus, optionally, a JSON mirror of the same traversal for debugging. Actors are serialized in
parallel into their own archives and merged in order, with a table of per-actor offsets so a
load can read them independently again. Loading travels to the saved map, destroys level
actors that had been destroyed, finds or respawns every saved actor and redirects references
to actors that came back under a new name.

Actors describe their data through a [`StructuredArchive`], the same code serving both
directions:

```
use savegame::{Formatter, StructuredArchive};

struct Inventory {
    gold: u32,
    items: Vec<String>,
}

impl Inventory {
    fn serialize<F: Formatter>(&mut self, ar: &mut StructuredArchive<F>) -> savegame::Result<()> {
        ar.record(|ar| {
            ar.serialize_field("Gold", &mut self.gold)?;
            let mut len = self.items.len() as u32;
            ar.field("Items", |ar| {
                ar.array(&mut len, |ar, len| {
                    if ar.is_loading() {
                        self.items.resize_with(len, String::new);
                    }
                    for item in &mut self.items {
                        ar.array_element(|ar| ar.value(item))?;
                    }
                    Ok(())
                })
            })
        })
    }
}

let mut ar = StructuredArchive::new(savegame::JsonOutputFormatter::new());
let mut inventory = Inventory { gold: 25, items: vec!["Sword".into()] };
inventory.serialize(&mut ar)?;

let json = ar.into_formatter().into_root().unwrap();
assert_eq!(json["Gold"], 25);
assert_eq!(json["Items"][0], "Sword");
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

mod archive;
mod compression;
mod context;
mod error;
pub mod formatter;
mod property;
mod serializer;
mod settings;
mod storage;
mod structured;
mod subsystem;
mod summary;
mod threading;
mod version;
mod world;

#[cfg(test)]
mod tests;

pub use archive::{RedirectTable, VersionedArchive};
pub use compression::{compress_blob, decompress_blob, Compressor, Lz4Compressor};
pub use context::{SaveArchive, SaveGameArchive, SaveGameFormatter, TextFormatter};
pub use error::{Error, ParseError};
pub use formatter::{
    ArchiveValue, BinaryFormatter, Formatter, JsonOutputFormatter, NullFormatter, ProxyFormatter,
    Value, ATTRIBUTED_VALUE_FIELD,
};
pub use property::{Properties, Property, PropertyType};
pub use serializer::{Operation, Phase, SaveGameSerializer};
pub use settings::SaveGameSettings;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use structured::{FormatterStack, Scope, StructuredArchive};
pub use subsystem::SaveGameSubsystem;
pub use summary::{ActorSummary, SaveSummary};
pub use threading::ThreadScope;
pub use version::{
    CustomVersion, EngineVersion, FGuid, PackageVersion, SaveGameVersion, VersionTable,
    SAVE_GAME_VERSION_ID,
};
pub use world::{ActorRef, ClassPath, MapReady, ObjectPath, SaveGameActor, World};

pub type Result<T, E = Error> = std::result::Result<T, E>;
