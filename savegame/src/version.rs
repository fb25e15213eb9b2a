use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use indexmap::IndexMap;
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};

use crate::{formatter::Formatter, structured::StructuredArchive, Error, Result};

/// Version id of the save format itself. Always registered on the top level archive.
pub const SAVE_GAME_VERSION_ID: FGuid = FGuid::new(0x5A8B_6C1E, 0x4F0D_9B27, 0x8E33_41C2, 0x90AB_7D15);

/// Known revisions of the save format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum SaveGameVersion {
    InitialVersion = 0,
    /// Per-actor offsets table, actor bodies serialized independently
    ActorOffsets = 1,
}
impl SaveGameVersion {
    pub const LATEST: SaveGameVersion = SaveGameVersion::ActorOffsets;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FGuid {
    a: u32,
    b: u32,
    c: u32,
    d: u32,
}

impl FGuid {
    pub const fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }

    pub const fn nil() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn is_nil(&self) -> bool {
        self.a == 0 && self.b == 0 && self.c == 0 && self.d == 0
    }

    pub fn is_valid(&self) -> bool {
        !self.is_nil()
    }

    pub fn parse_str(s: &str) -> Result<Self, Error> {
        let s = s.replace('-', "");
        if s.len() != 32 || !s.is_ascii() {
            return Err(Error::Other("Invalid GUID string length".into()));
        }

        let parse_hex_u32 = |start: usize| -> Result<u32, Error> {
            u32::from_str_radix(&s[start..start + 8], 16)
                .map_err(|_| Error::Other("Invalid hex in GUID".into()))
        };

        Ok(Self {
            a: parse_hex_u32(0)?,
            b: parse_hex_u32(8)?,
            c: parse_hex_u32(16)?,
            d: parse_hex_u32(24)?,
        })
    }

    pub(crate) fn read<R: Read>(r: &mut R) -> Result<FGuid> {
        Ok(Self {
            a: r.read_u32::<LE>()?,
            b: r.read_u32::<LE>()?,
            c: r.read_u32::<LE>()?,
            d: r.read_u32::<LE>()?,
        })
    }

    pub(crate) fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LE>(self.a)?;
        w.write_u32::<LE>(self.b)?;
        w.write_u32::<LE>(self.c)?;
        w.write_u32::<LE>(self.d)?;
        Ok(())
    }
}

impl std::fmt::Display for FGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.b.to_be_bytes();
        let c = self.c.to_be_bytes();

        write!(
            f,
            "{:08x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:08x}",
            self.a, b[0], b[1], b[2], b[3], c[0], c[1], c[2], c[3], self.d,
        )
    }
}

impl Serialize for FGuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FGuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FGuidVisitor;

        impl Visitor<'_> for FGuidVisitor {
            type Value = FGuid;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a GUID string in format xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                FGuid::parse_str(value).map_err(|e| E::custom(format!("Invalid GUID: {}", e)))
            }
        }

        deserializer.deserialize_str(FGuidVisitor)
    }
}

/// Opaque engine version stamp written into the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub changelist: u32,
    pub branch: String,
}
impl Default for EngineVersion {
    fn default() -> Self {
        Self {
            major: 5,
            minor: 3,
            patch: 2,
            changelist: 0,
            branch: "++UE5+Release-5.3".into(),
        }
    }
}
impl EngineVersion {
    pub(crate) fn serialize_archive<F: Formatter>(&mut self, ar: &mut StructuredArchive<F>) -> Result<()> {
        ar.record(|ar| {
            ar.serialize_field("Major", &mut self.major)?;
            ar.serialize_field("Minor", &mut self.minor)?;
            ar.serialize_field("Patch", &mut self.patch)?;
            ar.serialize_field("Changelist", &mut self.changelist)?;
            ar.serialize_field("Branch", &mut self.branch)
        })
    }
}

/// Opaque package file version stamp written into the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub ue4: i32,
    pub ue5: i32,
}
impl Default for PackageVersion {
    fn default() -> Self {
        Self { ue4: 522, ue5: 1009 }
    }
}
impl PackageVersion {
    pub(crate) fn serialize_archive<F: Formatter>(&mut self, ar: &mut StructuredArchive<F>) -> Result<()> {
        ar.record(|ar| {
            ar.serialize_field("FileVersionUE4", &mut self.ue4)?;
            ar.serialize_field("FileVersionUE5", &mut self.ue5)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomVersion {
    pub version: i32,
    pub name: String,
}

/// Custom version per subsystem, keyed by a stable id.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTable {
    versions: IndexMap<FGuid, CustomVersion>,
}
impl VersionTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get(&self, id: &FGuid) -> Option<&CustomVersion> {
        self.versions.get(id)
    }
    pub fn set(&mut self, id: FGuid, version: i32, name: impl Into<String>) {
        self.versions.insert(
            id,
            CustomVersion {
                version,
                name: name.into(),
            },
        );
    }
    pub fn len(&self) -> usize {
        self.versions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&FGuid, &CustomVersion)> {
        self.versions.iter()
    }

    /// `{count, (Key, Version, Name)*}`
    pub(crate) fn serialize_archive<F: Formatter>(&mut self, ar: &mut StructuredArchive<F>) -> Result<()> {
        let mut entries: Vec<VersionEntry> = self
            .versions
            .iter()
            .map(|(key, v)| VersionEntry {
                key: *key,
                version: v.version,
                name: v.name.clone(),
            })
            .collect();
        let mut len = entries.len() as u32;

        ar.array(&mut len, |ar, len| {
            if ar.is_loading() {
                entries.resize_with(len, VersionEntry::default);
            }
            for entry in &mut entries {
                ar.array_element(|ar| entry.serialize_archive(ar))?;
            }
            Ok(())
        })?;

        if ar.is_loading() {
            self.versions = entries
                .into_iter()
                .map(|e| {
                    (
                        e.key,
                        CustomVersion {
                            version: e.version,
                            name: e.name,
                        },
                    )
                })
                .collect();
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct VersionEntry {
    key: FGuid,
    version: i32,
    name: String,
}
impl VersionEntry {
    fn serialize_archive<F: Formatter>(&mut self, ar: &mut StructuredArchive<F>) -> Result<()> {
        ar.record(|ar| {
            ar.serialize_field("Key", &mut self.key)?;
            ar.serialize_field("Version", &mut self.version)?;
            ar.serialize_field("Name", &mut self.name)
        })
    }
}
