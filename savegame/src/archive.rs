use std::{
    io::{Cursor, Read, Seek, SeekFrom, Write},
    sync::Arc,
};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::{
    version::{EngineVersion, FGuid, PackageVersion, VersionTable},
    world::ObjectPath,
    Error, Result,
};

/// Old path to new path, for objects that came back under a different identity.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RedirectTable {
    redirects: IndexMap<ObjectPath, ObjectPath>,
}
impl RedirectTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(&mut self, from: ObjectPath, to: ObjectPath) {
        debug!("redirect {from} -> {to}");
        self.redirects.insert(from, to);
    }
    /// Exact match only; redirects are not chained.
    pub fn resolve<'a>(&'a self, path: &'a ObjectPath) -> &'a ObjectPath {
        self.redirects.get(path).unwrap_or(path)
    }
    pub fn len(&self) -> usize {
        self.redirects.len()
    }
    pub fn is_empty(&self) -> bool {
        self.redirects.is_empty()
    }
}

/// Growable buffer when saving, shared immutable buffer when loading.
#[derive(Debug)]
enum ArchiveStream {
    Writer(Cursor<Vec<u8>>),
    Reader(Cursor<Arc<[u8]>>),
}
impl Read for ArchiveStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ArchiveStream::Reader(r) => r.read(buf),
            ArchiveStream::Writer(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "cannot read from a saving archive",
            )),
        }
    }
}
impl Write for ArchiveStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            ArchiveStream::Writer(w) => w.write(buf),
            ArchiveStream::Reader(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "cannot write to a loading archive",
            )),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
impl Seek for ArchiveStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            ArchiveStream::Writer(w) => w.seek(pos),
            ArchiveStream::Reader(r) => r.seek(pos),
        }
    }
}

/// In-memory byte archive carrying the version metadata and redirects of one save operation.
#[derive(Debug)]
pub struct VersionedArchive {
    stream: ArchiveStream,
    engine_version: EngineVersion,
    package_version: PackageVersion,
    custom_versions: VersionTable,
    redirects: Arc<RedirectTable>,
}
impl Read for VersionedArchive {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}
impl Write for VersionedArchive {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}
impl Seek for VersionedArchive {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.stream.seek(pos)
    }
}

impl VersionedArchive {
    fn with_stream(stream: ArchiveStream) -> Self {
        Self {
            stream,
            engine_version: EngineVersion::default(),
            package_version: PackageVersion::default(),
            custom_versions: VersionTable::new(),
            redirects: Arc::new(RedirectTable::new()),
        }
    }
    pub fn writer() -> Self {
        Self::with_stream(ArchiveStream::Writer(Cursor::new(vec![])))
    }
    pub fn reader(data: Arc<[u8]>) -> Self {
        Self::with_stream(ArchiveStream::Reader(Cursor::new(data)))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.stream, ArchiveStream::Reader(_))
    }
    pub fn tell(&self) -> u64 {
        match &self.stream {
            ArchiveStream::Writer(w) => w.position(),
            ArchiveStream::Reader(r) => r.position(),
        }
    }
    pub fn seek_to(&mut self, position: u64) {
        match &mut self.stream {
            ArchiveStream::Writer(w) => w.set_position(position),
            ArchiveStream::Reader(r) => r.set_position(position),
        }
    }
    pub fn len(&self) -> u64 {
        match &self.stream {
            ArchiveStream::Writer(w) => w.get_ref().len() as u64,
            ArchiveStream::Reader(r) => r.get_ref().len() as u64,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Bytes between the position and the end of the data.
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.tell())
    }
    /// Appends raw bytes at the end of a saving archive and leaves the position there.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.len();
        self.seek_to(end);
        self.write_all(bytes)?;
        Ok(())
    }
    /// The written bytes of a saving archive, or a copy of the loaded ones.
    pub fn into_bytes(self) -> Vec<u8> {
        match self.stream {
            ArchiveStream::Writer(w) => w.into_inner(),
            ArchiveStream::Reader(r) => r.into_inner().to_vec(),
        }
    }

    pub fn engine_version(&self) -> &EngineVersion {
        &self.engine_version
    }
    pub fn set_engine_version(&mut self, version: EngineVersion) {
        self.engine_version = version;
    }
    pub fn package_version(&self) -> PackageVersion {
        self.package_version
    }
    pub fn set_package_version(&mut self, version: PackageVersion) {
        self.package_version = version;
    }

    pub fn custom_versions(&self) -> &VersionTable {
        &self.custom_versions
    }
    pub fn set_custom_versions(&mut self, versions: VersionTable) {
        self.custom_versions = versions;
    }
    pub fn custom_version(&self, id: &FGuid) -> Option<i32> {
        self.custom_versions.get(id).map(|v| v.version)
    }
    pub fn set_custom_version(&mut self, id: FGuid, version: i32, name: impl Into<String>) {
        self.custom_versions.set(id, version, name);
    }
    /// Registers `latest` when saving. Returns the version the data is (or will be) written with.
    pub fn using_custom_version(&mut self, id: FGuid, latest: i32, name: &str) -> Option<i32> {
        if !self.is_loading() {
            self.set_custom_version(id, latest, name);
        }
        self.custom_version(&id)
    }

    /// Reconciles custom versions between two archives of the same operation.
    ///
    /// A loading archive adopts everything from `other`. A saving archive pushes each of its
    /// versions into `other`, which must not already hold a different number for the same id.
    #[instrument(skip_all)]
    pub fn consolidate_versions(&mut self, other: &mut VersionedArchive) {
        if self.is_loading() {
            self.engine_version = other.engine_version.clone();
            self.package_version = other.package_version;
            self.custom_versions = other.custom_versions.clone();
        } else {
            for (id, version) in self.custom_versions.iter() {
                if let Some(existing) = other.custom_versions.get(id) {
                    assert_eq!(
                        existing.version, version.version,
                        "conflicting versions for custom version {} ({})",
                        id, version.name
                    );
                }
                other
                    .custom_versions
                    .set(*id, version.version, version.name.clone());
            }
        }
    }

    pub fn redirects(&self) -> &RedirectTable {
        &self.redirects
    }
    pub fn set_redirects(&mut self, redirects: Arc<RedirectTable>) {
        self.redirects = redirects;
    }
    pub fn resolve_redirect(&self, path: &ObjectPath) -> ObjectPath {
        self.redirects.resolve(path).clone()
    }
}

/// Unreal FString layout: i32 length including the terminator, negative for UTF-16.
pub(crate) fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_i32::<LE>()?;
    if len < 0 {
        let chars = (0..len.unsigned_abs())
            .map(|_| r.read_u16::<LE>())
            .collect::<std::io::Result<Vec<u16>>>()?;
        let length = chars.iter().position(|&c| c == 0).unwrap_or(chars.len());
        String::from_utf16(&chars[..length]).map_err(|e| Error::Other(e.to_string()))
    } else {
        let mut chars = vec![];
        r.take(len as u64).read_to_end(&mut chars)?;
        if chars.len() != len as usize {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        let length = chars.iter().position(|&c| c == 0).unwrap_or(chars.len());
        Ok(String::from_utf8_lossy(&chars[..length]).into_owned())
    }
}
pub(crate) fn write_string<W: Write>(w: &mut W, string: &str) -> Result<()> {
    if string.is_empty() {
        w.write_u32::<LE>(0)?;
    } else if string.is_ascii() {
        w.write_i32::<LE>(string.len() as i32 + 1)?;
        w.write_all(string.as_bytes())?;
        w.write_u8(0)?;
    } else {
        let chars: Vec<u16> = string.encode_utf16().collect();
        w.write_i32::<LE>(-(chars.len() as i32 + 1))?;
        for c in chars {
            w.write_u16::<LE>(c)?;
        }
        w.write_u16::<LE>(0)?;
    }
    Ok(())
}
