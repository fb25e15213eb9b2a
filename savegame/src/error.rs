use crate::world::ClassPath;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("save slot {0:?} does not exist")]
    SlotNotFound(String),
    #[error("failed to write save slot {0:?}")]
    StorageWrite(String),
    #[error("failed to decompress save data: {0}")]
    Decompress(String),
    #[error("class {0} could not be resolved")]
    ClassNotFound(ClassPath),
    #[error("failed to spawn actor {name:?}: {reason}")]
    Spawn { name: String, reason: String },
    #[error("unknown property type {0}")]
    UnknownPropertyType(String),
    #[error("main thread queue closed before the task completed")]
    ThreadQueueClosed,
    #[error("{0}")]
    Other(String),
}

/// An [`Error`] annotated with the position in the uncompressed save data where it occurred.
#[derive(thiserror::Error, Debug)]
#[error("at offset {offset}: {error}")]
pub struct ParseError {
    pub offset: usize,
    pub error: Error,
}
