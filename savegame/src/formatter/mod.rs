//! The visitor contract every save sink implements.
//!
//! A traversal is a nested sequence of `enter_*`/`leave_*` calls mirroring the document
//! grammar (records of named fields, arrays, maps, streams and attributed values) with
//! [`Formatter::serialize`] at the leaves. Counts and names are passed by mutable reference so
//! the same traversal code writes them when saving and receives them when loading.

use crate::{archive::VersionedArchive, version::FGuid, world::ObjectPath, Result};

pub mod binary;
pub mod json;
pub mod null;
pub mod proxy;

pub use binary::BinaryFormatter;
pub use json::JsonOutputFormatter;
pub use null::NullFormatter;
pub use proxy::ProxyFormatter;

/// Reserved field name holding the primary value of an attributed value in tree formats.
pub const ATTRIBUTED_VALUE_FIELD: &str = "_Value";

/// A scalar leaf, borrowed mutably so it can be written from or read into.
#[derive(Debug)]
pub enum Value<'a> {
    U8(&'a mut u8),
    U16(&'a mut u16),
    U32(&'a mut u32),
    U64(&'a mut u64),
    I8(&'a mut i8),
    I16(&'a mut i16),
    I32(&'a mut i32),
    I64(&'a mut i64),
    F32(&'a mut f32),
    F64(&'a mut f64),
    Bool(&'a mut bool),
    String(&'a mut String),
    Bytes(&'a mut Vec<u8>),
    Guid(&'a mut FGuid),
    Object(&'a mut Option<ObjectPath>),
}

impl Value<'_> {
    pub fn reborrow(&mut self) -> Value<'_> {
        match self {
            Value::U8(v) => Value::U8(&mut **v),
            Value::U16(v) => Value::U16(&mut **v),
            Value::U32(v) => Value::U32(&mut **v),
            Value::U64(v) => Value::U64(&mut **v),
            Value::I8(v) => Value::I8(&mut **v),
            Value::I16(v) => Value::I16(&mut **v),
            Value::I32(v) => Value::I32(&mut **v),
            Value::I64(v) => Value::I64(&mut **v),
            Value::F32(v) => Value::F32(&mut **v),
            Value::F64(v) => Value::F64(&mut **v),
            Value::Bool(v) => Value::Bool(&mut **v),
            Value::String(v) => Value::String(&mut **v),
            Value::Bytes(v) => Value::Bytes(&mut **v),
            Value::Guid(v) => Value::Guid(&mut **v),
            Value::Object(v) => Value::Object(&mut **v),
        }
    }
}

/// Types that can be passed straight to a formatter as a scalar leaf.
pub trait ArchiveValue {
    fn as_value(&mut self) -> Value<'_>;
}

macro_rules! archive_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ArchiveValue for $ty {
                fn as_value(&mut self) -> Value<'_> {
                    Value::$variant(self)
                }
            }
        )*
    };
}

archive_value! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
    String => String,
    Vec<u8> => Bytes,
    FGuid => Guid,
    Option<ObjectPath> => Object,
}

pub trait Formatter {
    /// Whether this sink reads values rather than writes them.
    fn is_loading(&self) -> bool;
    /// True for sinks that build a full document tree rather than a flat stream.
    fn has_document_tree(&self) -> bool;
    /// The byte archive backing this sink, if any.
    fn underlying_archive(&mut self) -> Option<&mut VersionedArchive> {
        None
    }

    fn enter_record(&mut self) -> Result<()>;
    fn leave_record(&mut self) -> Result<()>;
    fn enter_field(&mut self, name: &str) -> Result<()>;
    fn leave_field(&mut self) -> Result<()>;
    /// Returns whether the field is visited. When it returns false nothing was entered.
    fn try_enter_field(&mut self, name: &str, enter_when_writing: bool) -> Result<bool>;

    fn enter_array(&mut self, len: &mut u32) -> Result<()>;
    fn leave_array(&mut self) -> Result<()>;
    fn enter_array_element(&mut self) -> Result<()>;
    fn leave_array_element(&mut self) -> Result<()>;

    fn enter_stream(&mut self) -> Result<()>;
    fn leave_stream(&mut self) -> Result<()>;
    fn enter_stream_element(&mut self) -> Result<()>;
    fn leave_stream_element(&mut self) -> Result<()>;

    fn enter_map(&mut self, len: &mut u32) -> Result<()>;
    fn leave_map(&mut self) -> Result<()>;
    fn enter_map_element(&mut self, name: &mut String) -> Result<()>;
    fn leave_map_element(&mut self) -> Result<()>;

    fn enter_attributed_value(&mut self) -> Result<()>;
    fn leave_attributed_value(&mut self) -> Result<()>;
    fn enter_attribute(&mut self, name: &str) -> Result<()>;
    fn leave_attribute(&mut self) -> Result<()>;
    fn try_enter_attribute(&mut self, name: &str, enter_when_writing: bool) -> Result<bool>;
    /// Enters the primary value slot of the current attributed value.
    fn enter_attributed_value_value(&mut self) -> Result<()>;
    fn leave_attributed_value_value(&mut self) -> Result<()>;
    fn try_enter_attributed_value_value(&mut self) -> Result<bool>;

    fn serialize(&mut self, value: Value<'_>) -> Result<()>;
}
