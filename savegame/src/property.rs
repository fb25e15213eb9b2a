//! A small reflected property bag hosts can use to implement
//! [`SaveGameActor::serialize_properties`](crate::SaveGameActor::serialize_properties).
//!
//! Properties are written as a map of attributed values. Each value carries a `Type`
//! attribute naming its [`PropertyType`], followed by the value itself:
//!
//! ```json
//! { "Health": { "Type": "FloatProperty", "_Value": 100.0 } }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    formatter::Formatter, structured::StructuredArchive, version::FGuid, world::ObjectPath,
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Int8Property,
    Int16Property,
    IntProperty,
    Int64Property,
    UInt8Property,
    UInt16Property,
    UInt32Property,
    UInt64Property,
    FloatProperty,
    DoubleProperty,
    BoolProperty,
    StrProperty,
    NameProperty,
    ObjectProperty,
    BytesProperty,
    GuidProperty,
    ArrayProperty,
    StructProperty,
}
impl PropertyType {
    pub fn get_name(&self) -> &'static str {
        match self {
            PropertyType::Int8Property => "Int8Property",
            PropertyType::Int16Property => "Int16Property",
            PropertyType::IntProperty => "IntProperty",
            PropertyType::Int64Property => "Int64Property",
            PropertyType::UInt8Property => "UInt8Property",
            PropertyType::UInt16Property => "UInt16Property",
            PropertyType::UInt32Property => "UInt32Property",
            PropertyType::UInt64Property => "UInt64Property",
            PropertyType::FloatProperty => "FloatProperty",
            PropertyType::DoubleProperty => "DoubleProperty",
            PropertyType::BoolProperty => "BoolProperty",
            PropertyType::StrProperty => "StrProperty",
            PropertyType::NameProperty => "NameProperty",
            PropertyType::ObjectProperty => "ObjectProperty",
            PropertyType::BytesProperty => "BytesProperty",
            PropertyType::GuidProperty => "GuidProperty",
            PropertyType::ArrayProperty => "ArrayProperty",
            PropertyType::StructProperty => "StructProperty",
        }
    }
    pub fn try_from(name: &str) -> Result<Self> {
        match name {
            "Int8Property" => Ok(PropertyType::Int8Property),
            "Int16Property" => Ok(PropertyType::Int16Property),
            "IntProperty" => Ok(PropertyType::IntProperty),
            "Int64Property" => Ok(PropertyType::Int64Property),
            "UInt8Property" => Ok(PropertyType::UInt8Property),
            "UInt16Property" => Ok(PropertyType::UInt16Property),
            "UInt32Property" => Ok(PropertyType::UInt32Property),
            "UInt64Property" => Ok(PropertyType::UInt64Property),
            "FloatProperty" => Ok(PropertyType::FloatProperty),
            "DoubleProperty" => Ok(PropertyType::DoubleProperty),
            "BoolProperty" => Ok(PropertyType::BoolProperty),
            "StrProperty" => Ok(PropertyType::StrProperty),
            "NameProperty" => Ok(PropertyType::NameProperty),
            "ObjectProperty" => Ok(PropertyType::ObjectProperty),
            "BytesProperty" => Ok(PropertyType::BytesProperty),
            "GuidProperty" => Ok(PropertyType::GuidProperty),
            "ArrayProperty" => Ok(PropertyType::ArrayProperty),
            "StructProperty" => Ok(PropertyType::StructProperty),
            _ => Err(Error::UnknownPropertyType(format!("{name:?}"))),
        }
    }
}

/// A single typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Property {
    Int8(i8),
    Int16(i16),
    Int(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
    Name(String),
    /// Reference to another object by path. Resolved through the redirect table.
    Object(Option<ObjectPath>),
    Bytes(Vec<u8>),
    Guid(FGuid),
    /// Elements carry their own type.
    Array(Vec<Property>),
    Struct(Properties),
}

impl Default for Property {
    fn default() -> Self {
        Property::Int(0)
    }
}

impl Property {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Property::Int8(_) => PropertyType::Int8Property,
            Property::Int16(_) => PropertyType::Int16Property,
            Property::Int(_) => PropertyType::IntProperty,
            Property::Int64(_) => PropertyType::Int64Property,
            Property::UInt8(_) => PropertyType::UInt8Property,
            Property::UInt16(_) => PropertyType::UInt16Property,
            Property::UInt32(_) => PropertyType::UInt32Property,
            Property::UInt64(_) => PropertyType::UInt64Property,
            Property::Float(_) => PropertyType::FloatProperty,
            Property::Double(_) => PropertyType::DoubleProperty,
            Property::Bool(_) => PropertyType::BoolProperty,
            Property::Str(_) => PropertyType::StrProperty,
            Property::Name(_) => PropertyType::NameProperty,
            Property::Object(_) => PropertyType::ObjectProperty,
            Property::Bytes(_) => PropertyType::BytesProperty,
            Property::Guid(_) => PropertyType::GuidProperty,
            Property::Array(_) => PropertyType::ArrayProperty,
            Property::Struct(_) => PropertyType::StructProperty,
        }
    }

    fn empty(t: PropertyType) -> Self {
        match t {
            PropertyType::Int8Property => Property::Int8(0),
            PropertyType::Int16Property => Property::Int16(0),
            PropertyType::IntProperty => Property::Int(0),
            PropertyType::Int64Property => Property::Int64(0),
            PropertyType::UInt8Property => Property::UInt8(0),
            PropertyType::UInt16Property => Property::UInt16(0),
            PropertyType::UInt32Property => Property::UInt32(0),
            PropertyType::UInt64Property => Property::UInt64(0),
            PropertyType::FloatProperty => Property::Float(0.0),
            PropertyType::DoubleProperty => Property::Double(0.0),
            PropertyType::BoolProperty => Property::Bool(false),
            PropertyType::StrProperty => Property::Str(String::new()),
            PropertyType::NameProperty => Property::Name(String::new()),
            PropertyType::ObjectProperty => Property::Object(None),
            PropertyType::BytesProperty => Property::Bytes(vec![]),
            PropertyType::GuidProperty => Property::Guid(FGuid::nil()),
            PropertyType::ArrayProperty => Property::Array(vec![]),
            PropertyType::StructProperty => Property::Struct(Properties::default()),
        }
    }

    /// Writes or reads this property as an attributed value. When loading, the stored type
    /// replaces whatever variant `self` held.
    pub fn serialize_archive<F: Formatter>(&mut self, ar: &mut StructuredArchive<F>) -> Result<()> {
        ar.attributed_value(|ar| {
            let mut type_name = self.property_type().get_name().to_owned();
            ar.attribute("Type", |ar| ar.value(&mut type_name))?;
            if ar.is_loading() {
                *self = Property::empty(PropertyType::try_from(&type_name)?);
            }
            ar.attributed_value_value(|ar| self.serialize_value(ar))
        })
    }

    fn serialize_value<F: Formatter>(&mut self, ar: &mut StructuredArchive<F>) -> Result<()> {
        match self {
            Property::Int8(v) => ar.value(v),
            Property::Int16(v) => ar.value(v),
            Property::Int(v) => ar.value(v),
            Property::Int64(v) => ar.value(v),
            Property::UInt8(v) => ar.value(v),
            Property::UInt16(v) => ar.value(v),
            Property::UInt32(v) => ar.value(v),
            Property::UInt64(v) => ar.value(v),
            Property::Float(v) => ar.value(v),
            Property::Double(v) => ar.value(v),
            Property::Bool(v) => ar.value(v),
            Property::Str(v) => ar.value(v),
            Property::Name(v) => ar.value(v),
            Property::Object(v) => ar.value(v),
            Property::Bytes(v) => ar.value(v),
            Property::Guid(v) => ar.value(v),
            Property::Array(items) => {
                let mut len = items.len() as u32;
                ar.array(&mut len, |ar, len| {
                    if ar.is_loading() {
                        items.clear();
                        items.resize_with(len, Property::default);
                    }
                    for item in items.iter_mut() {
                        ar.array_element(|ar| item.serialize_archive(ar))?;
                    }
                    Ok(())
                })
            }
            Property::Struct(properties) => properties.serialize_archive(ar),
        }
    }

    /// Overwrites `self` with a loaded value, merging nested structs field by field.
    fn merge(&mut self, loaded: Property) {
        match (self, loaded) {
            (Property::Struct(existing), Property::Struct(loaded)) => existing.merge(loaded),
            (this, loaded) => *this = loaded,
        }
    }
}

/// Named properties in declaration order.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties(pub IndexMap<String, Property>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, name: impl Into<String>, value: Property) -> Option<Property> {
        self.0.insert(name.into(), value)
    }
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.get(name)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn merge(&mut self, loaded: Properties) {
        for (name, value) in loaded.0 {
            match self.0.get_mut(&name) {
                Some(existing) => existing.merge(value),
                None => {
                    self.0.insert(name, value);
                }
            }
        }
    }

    /// Writes the bag as a map, or reads one and merges it in: loaded values overwrite
    /// existing ones, properties missing from the data are left untouched.
    #[instrument(name = "Properties_serialize", skip_all)]
    pub fn serialize_archive<F: Formatter>(&mut self, ar: &mut StructuredArchive<F>) -> Result<()> {
        let mut len = self.0.len() as u32;
        ar.map(&mut len, |ar, len| {
            if ar.is_loading() {
                let mut loaded = Properties::default();
                for _ in 0..len {
                    let mut name = String::new();
                    let mut value = Property::default();
                    ar.map_element(&mut name, |ar| value.serialize_archive(ar))?;
                    loaded.0.insert(name, value);
                }
                self.merge(loaded);
            } else {
                for (name, value) in self.0.iter_mut() {
                    let mut name = name.clone();
                    ar.map_element(&mut name, |ar| value.serialize_archive(ar))?;
                }
            }
            Ok(())
        })
    }
}

impl<K: AsRef<str>> std::ops::Index<K> for Properties {
    type Output = Property;
    fn index(&self, index: K) -> &Self::Output {
        &self.0[index.as_ref()]
    }
}
