use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::warn;

/// Opaque save slot storage.
///
/// Failures are reported as `false`/`None`; the serializer turns them into errors at the
/// edges of an operation.
pub trait Storage: Send + Sync {
    fn put(&self, slot: &str, data: &[u8]) -> bool;
    fn get(&self, slot: &str) -> Option<Vec<u8>>;
}

/// Slots kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn contains(&self, slot: &str) -> bool {
        self.slots
            .lock()
            .map(|slots| slots.contains_key(slot))
            .unwrap_or(false)
    }
}

impl Storage for MemoryStorage {
    fn put(&self, slot: &str, data: &[u8]) -> bool {
        match self.slots.lock() {
            Ok(mut slots) => {
                slots.insert(slot.to_owned(), data.to_vec());
                true
            }
            Err(_) => false,
        }
    }
    fn get(&self, slot: &str) -> Option<Vec<u8>> {
        self.slots.lock().ok()?.get(slot).cloned()
    }
}

/// One `<slot>.sav` file per slot inside a directory.
///
/// Writes go to a temporary file that is renamed over the slot, so a reader never sees a
/// partially written save.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
    pub fn dir(&self) -> &Path {
        &self.dir
    }
    pub fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.sav"))
    }

    fn write(&self, slot: &str, data: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.slot_path(slot);
        let tmp = self.dir.join(format!("{slot}.sav.tmp"));
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)
    }
}

impl Storage for FileStorage {
    fn put(&self, slot: &str, data: &[u8]) -> bool {
        match self.write(slot, data) {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to write slot {slot:?}: {e}");
                false
            }
        }
    }
    fn get(&self, slot: &str) -> Option<Vec<u8>> {
        fs::read(self.slot_path(slot)).ok()
    }
}
