use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::{
    archive::VersionedArchive,
    formatter::{
        BinaryFormatter, Formatter, JsonOutputFormatter, NullFormatter, ProxyFormatter, Value,
    },
    structured::StructuredArchive,
    Result,
};

/// The text side of a save archive: a JSON mirror, or nothing.
#[derive(Debug)]
pub enum TextFormatter {
    Json(JsonOutputFormatter),
    Null(NullFormatter),
}

impl TextFormatter {
    pub fn new(json: bool) -> Self {
        if json {
            TextFormatter::Json(JsonOutputFormatter::new())
        } else {
            TextFormatter::Null(NullFormatter)
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $f:ident => $body:expr) => {
        match $self {
            TextFormatter::Json($f) => $body,
            TextFormatter::Null($f) => $body,
        }
    };
}

impl Formatter for TextFormatter {
    fn is_loading(&self) -> bool {
        dispatch!(self, f => f.is_loading())
    }
    fn has_document_tree(&self) -> bool {
        dispatch!(self, f => f.has_document_tree())
    }
    fn enter_record(&mut self) -> Result<()> {
        dispatch!(self, f => f.enter_record())
    }
    fn leave_record(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_record())
    }
    fn enter_field(&mut self, name: &str) -> Result<()> {
        dispatch!(self, f => f.enter_field(name))
    }
    fn leave_field(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_field())
    }
    fn try_enter_field(&mut self, name: &str, enter_when_writing: bool) -> Result<bool> {
        dispatch!(self, f => f.try_enter_field(name, enter_when_writing))
    }
    fn enter_array(&mut self, len: &mut u32) -> Result<()> {
        dispatch!(self, f => f.enter_array(len))
    }
    fn leave_array(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_array())
    }
    fn enter_array_element(&mut self) -> Result<()> {
        dispatch!(self, f => f.enter_array_element())
    }
    fn leave_array_element(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_array_element())
    }
    fn enter_stream(&mut self) -> Result<()> {
        dispatch!(self, f => f.enter_stream())
    }
    fn leave_stream(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_stream())
    }
    fn enter_stream_element(&mut self) -> Result<()> {
        dispatch!(self, f => f.enter_stream_element())
    }
    fn leave_stream_element(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_stream_element())
    }
    fn enter_map(&mut self, len: &mut u32) -> Result<()> {
        dispatch!(self, f => f.enter_map(len))
    }
    fn leave_map(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_map())
    }
    fn enter_map_element(&mut self, name: &mut String) -> Result<()> {
        dispatch!(self, f => f.enter_map_element(name))
    }
    fn leave_map_element(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_map_element())
    }
    fn enter_attributed_value(&mut self) -> Result<()> {
        dispatch!(self, f => f.enter_attributed_value())
    }
    fn leave_attributed_value(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_attributed_value())
    }
    fn enter_attribute(&mut self, name: &str) -> Result<()> {
        dispatch!(self, f => f.enter_attribute(name))
    }
    fn leave_attribute(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_attribute())
    }
    fn try_enter_attribute(&mut self, name: &str, enter_when_writing: bool) -> Result<bool> {
        dispatch!(self, f => f.try_enter_attribute(name, enter_when_writing))
    }
    fn enter_attributed_value_value(&mut self) -> Result<()> {
        dispatch!(self, f => f.enter_attributed_value_value())
    }
    fn leave_attributed_value_value(&mut self) -> Result<()> {
        dispatch!(self, f => f.leave_attributed_value_value())
    }
    fn try_enter_attributed_value_value(&mut self) -> Result<bool> {
        dispatch!(self, f => f.try_enter_attributed_value_value())
    }
    fn serialize(&mut self, value: Value<'_>) -> Result<()> {
        dispatch!(self, f => f.serialize(value))
    }
}

/// Binary output with an optional JSON mirror, driven by one traversal.
pub type SaveGameFormatter = ProxyFormatter<BinaryFormatter, TextFormatter>;

/// The session actors serialize themselves into.
pub type SaveArchive = StructuredArchive<SaveGameFormatter>;

impl SaveArchive {
    pub fn versioned(&self) -> &VersionedArchive {
        self.formatter().primary().archive()
    }
    pub fn versioned_mut(&mut self) -> &mut VersionedArchive {
        self.formatter_mut().primary_mut().archive_mut()
    }

    /// Replaces the current, empty, JSON record with `subtree`. No-op without a mirror.
    pub fn graft_json(&mut self, subtree: Map<String, JsonValue>) {
        if let TextFormatter::Json(json) = self.formatter_mut().secondary_mut() {
            json.graft(subtree);
        }
    }
}

/// One independently serialized archive: its own buffer, formatter pair and session, with a
/// root record that stays open until [`SaveGameArchive::close`].
///
/// The serializer uses one for the whole save and one per actor, so actors can be written on
/// different threads and merged afterwards.
#[derive(Debug)]
pub struct SaveGameArchive {
    archive: SaveArchive,
}

impl SaveGameArchive {
    fn open(archive: VersionedArchive, text: TextFormatter) -> Result<Self> {
        let formatter = ProxyFormatter::new(BinaryFormatter::new(archive), text);
        let mut archive = StructuredArchive::new(formatter);
        archive.enter_record()?;
        Ok(Self { archive })
    }

    /// A saving archive over a fresh buffer, mirrored to JSON when `json` is set.
    pub fn writer(json: bool) -> Result<Self> {
        Self::open(VersionedArchive::writer(), TextFormatter::new(json))
    }

    /// A loading archive over `data`, starting at `position`.
    pub fn reader(data: Arc<[u8]>, position: u64) -> Result<Self> {
        let mut archive = VersionedArchive::reader(data);
        archive.seek_to(position);
        Self::open(archive, TextFormatter::new(false))
    }

    /// The session, positioned inside the root record.
    pub fn record(&mut self) -> &mut SaveArchive {
        &mut self.archive
    }

    pub fn versioned(&self) -> &VersionedArchive {
        self.archive.versioned()
    }
    pub fn versioned_mut(&mut self) -> &mut VersionedArchive {
        self.archive.versioned_mut()
    }

    pub fn is_loading(&self) -> bool {
        self.archive.is_loading()
    }

    /// See [`VersionedArchive::consolidate_versions`].
    pub fn consolidate_versions(&mut self, other: &mut SaveGameArchive) {
        self.versioned_mut()
            .consolidate_versions(other.versioned_mut());
    }

    pub fn graft_json(&mut self, subtree: Map<String, JsonValue>) {
        self.archive.graft_json(subtree);
    }

    /// Closes the root record and hands back the byte archive and the JSON mirror, if any.
    pub fn close(mut self) -> Result<(VersionedArchive, Option<Map<String, JsonValue>>)> {
        self.archive.leave_record()?;
        let (binary, text) = self.archive.into_formatter().into_inner();
        let json = match text {
            TextFormatter::Json(json) => json.into_root(),
            TextFormatter::Null(_) => None,
        };
        Ok((binary.into_archive(), json))
    }
}
