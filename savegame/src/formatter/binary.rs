use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use super::{Formatter, Value};
use crate::{
    archive::{read_string, write_string, VersionedArchive},
    version::FGuid,
    world::ObjectPath,
    Error, Result,
};

/// The canonical format: raw little-endian values in traversal order.
///
/// Structure carries no bytes of its own except array/map counts, map element names and the
/// presence flag of optional fields and attributes.
#[derive(Debug)]
pub struct BinaryFormatter {
    archive: VersionedArchive,
}

impl BinaryFormatter {
    pub fn new(archive: VersionedArchive) -> Self {
        Self { archive }
    }
    pub fn archive(&self) -> &VersionedArchive {
        &self.archive
    }
    pub fn archive_mut(&mut self) -> &mut VersionedArchive {
        &mut self.archive
    }
    pub fn into_archive(self) -> VersionedArchive {
        self.archive
    }

    fn serialize_presence(&mut self, enter_when_writing: bool) -> Result<bool> {
        if self.archive.is_loading() {
            Ok(self.archive.read_u8()? != 0)
        } else {
            self.archive.write_u8(enter_when_writing as u8)?;
            Ok(enter_when_writing)
        }
    }

    /// Element count of an array or map. Every element occupies at least `min_element_size`
    /// bytes, so a loaded count larger than the rest of the data is corrupt.
    fn serialize_count(&mut self, len: &mut u32, min_element_size: u64) -> Result<()> {
        if self.archive.is_loading() {
            *len = self.archive.read_u32::<LE>()?;
            let remaining = self.archive.remaining();
            if u64::from(*len) * min_element_size > remaining {
                return Err(Error::Other(format!(
                    "count {len} exceeds the {remaining} bytes left at {}",
                    self.archive.tell()
                )));
            }
        } else {
            self.archive.write_u32::<LE>(*len)?;
        }
        Ok(())
    }
}

impl Formatter for BinaryFormatter {
    fn is_loading(&self) -> bool {
        self.archive.is_loading()
    }
    fn has_document_tree(&self) -> bool {
        false
    }
    fn underlying_archive(&mut self) -> Option<&mut VersionedArchive> {
        Some(&mut self.archive)
    }

    fn enter_record(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_record(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_field(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }
    fn leave_field(&mut self) -> Result<()> {
        Ok(())
    }
    fn try_enter_field(&mut self, _name: &str, enter_when_writing: bool) -> Result<bool> {
        self.serialize_presence(enter_when_writing)
    }

    fn enter_array(&mut self, len: &mut u32) -> Result<()> {
        self.serialize_count(len, 1)
    }
    fn leave_array(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_array_element(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_array_element(&mut self) -> Result<()> {
        Ok(())
    }

    fn enter_stream(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_stream(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_stream_element(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_stream_element(&mut self) -> Result<()> {
        Ok(())
    }

    fn enter_map(&mut self, len: &mut u32) -> Result<()> {
        // the element name alone is an i32 length
        self.serialize_count(len, 4)
    }
    fn leave_map(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_map_element(&mut self, name: &mut String) -> Result<()> {
        if self.archive.is_loading() {
            *name = read_string(&mut self.archive)?;
        } else {
            write_string(&mut self.archive, name)?;
        }
        Ok(())
    }
    fn leave_map_element(&mut self) -> Result<()> {
        Ok(())
    }

    fn enter_attributed_value(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_attributed_value(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_attribute(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }
    fn leave_attribute(&mut self) -> Result<()> {
        Ok(())
    }
    fn try_enter_attribute(&mut self, _name: &str, enter_when_writing: bool) -> Result<bool> {
        self.serialize_presence(enter_when_writing)
    }
    fn enter_attributed_value_value(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_attributed_value_value(&mut self) -> Result<()> {
        Ok(())
    }
    fn try_enter_attributed_value_value(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn serialize(&mut self, value: Value<'_>) -> Result<()> {
        let loading = self.archive.is_loading();
        let ar = &mut self.archive;

        macro_rules! number {
            ($v:expr, $read:ident, $write:ident) => {
                if loading {
                    *$v = ar.$read::<LE>()?;
                } else {
                    ar.$write::<LE>(*$v)?;
                }
            };
        }

        match value {
            Value::U8(v) => {
                if loading {
                    *v = ar.read_u8()?;
                } else {
                    ar.write_u8(*v)?;
                }
            }
            Value::I8(v) => {
                if loading {
                    *v = ar.read_i8()?;
                } else {
                    ar.write_i8(*v)?;
                }
            }
            Value::U16(v) => number!(v, read_u16, write_u16),
            Value::U32(v) => number!(v, read_u32, write_u32),
            Value::U64(v) => number!(v, read_u64, write_u64),
            Value::I16(v) => number!(v, read_i16, write_i16),
            Value::I32(v) => number!(v, read_i32, write_i32),
            Value::I64(v) => number!(v, read_i64, write_i64),
            Value::F32(v) => number!(v, read_f32, write_f32),
            Value::F64(v) => number!(v, read_f64, write_f64),
            Value::Bool(v) => {
                if loading {
                    *v = match ar.read_u32::<LE>()? {
                        0 => false,
                        1 => true,
                        other => return Err(Error::Other(format!("invalid bool value {other}"))),
                    };
                } else {
                    ar.write_u32::<LE>(*v as u32)?;
                }
            }
            Value::String(v) => {
                if loading {
                    *v = read_string(ar)?;
                } else {
                    write_string(ar, v)?;
                }
            }
            Value::Bytes(v) => {
                if loading {
                    let len = ar.read_u32::<LE>()? as u64;
                    v.clear();
                    ar.take(len).read_to_end(v)?;
                    if v.len() as u64 != len {
                        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
                    }
                } else {
                    ar.write_u32::<LE>(v.len() as u32)?;
                    ar.write_all(v)?;
                }
            }
            Value::Guid(v) => {
                if loading {
                    *v = FGuid::read(ar)?;
                } else {
                    v.write(ar)?;
                }
            }
            Value::Object(v) => {
                if loading {
                    let path = read_string(ar)?;
                    *v = if path.is_empty() {
                        None
                    } else {
                        Some(ar.resolve_redirect(&ObjectPath::from(path)))
                    };
                } else {
                    let path = v.as_ref().map(|p| ar.resolve_redirect(p));
                    write_string(ar, path.as_ref().map(ObjectPath::as_str).unwrap_or(""))?;
                }
            }
        }
        Ok(())
    }
}
