use std::sync::Arc;

use serde::Serialize;

use crate::{
    compression::{decompress_blob, Compressor},
    context::SaveGameArchive,
    error::ParseError,
    serializer::{
        read_versions, serialize_identity, serialize_names, serialize_offsets,
        serialize_versions_offset, SaveHeader,
    },
    version::{EngineVersion, FGuid, PackageVersion, SaveGameVersion, VersionTable, SAVE_GAME_VERSION_ID},
    world::ClassPath,
    Result,
};

/// Identity of one saved actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorSummary {
    /// Absolute position of the actor record in the uncompressed data.
    pub offset: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<ClassPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_id: Option<FGuid>,
}

/// What a save contains, read without a world.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveSummary {
    pub engine_version: EngineVersion,
    pub package_version: PackageVersion,
    pub map: String,
    pub save_version: Option<i32>,
    pub destroyed_actors: Vec<String>,
    pub actors: Vec<ActorSummary>,
    pub versions: VersionTable,
}

impl SaveSummary {
    /// Inspects a compressed save blob as produced by a save operation.
    pub fn read(blob: &[u8], compressor: &dyn Compressor) -> Result<Self, ParseError> {
        let data = decompress_blob(compressor, blob).map_err(|error| ParseError { offset: 0, error })?;
        Self::from_data(data.into())
    }

    /// Inspects uncompressed save data.
    pub fn from_data(data: Arc<[u8]>) -> Result<Self, ParseError> {
        let mut top = SaveGameArchive::reader(data.clone(), 0)
            .map_err(|error| ParseError { offset: 0, error })?;

        let (mut summary, offsets) = (|| -> Result<(SaveSummary, Vec<u64>)> {
            let mut versions_offset = 0;
            serialize_versions_offset(top.record(), &mut versions_offset)?;
            let mut header = SaveHeader::default();
            header.serialize(top.record())?;

            let versions = read_versions(&mut top, versions_offset)?;
            top.versioned_mut().set_custom_versions(versions.clone());
            let save_version = top.record().use_custom_version(
                SAVE_GAME_VERSION_ID,
                SaveGameVersion::LATEST as i32,
                "SaveGameVersion",
            );

            let mut destroyed_actors = vec![];
            serialize_names(top.record(), "DestroyedActors", &mut destroyed_actors)?;
            let mut offsets = vec![];
            serialize_offsets(top.record(), &mut offsets)?;

            let summary = SaveSummary {
                engine_version: header.engine_version,
                package_version: header.package_version,
                map: header.map,
                save_version,
                destroyed_actors,
                actors: vec![],
                versions,
            };
            Ok((summary, offsets))
        })()
        .map_err(|error| ParseError {
            offset: top.versioned().tell() as usize,
            error,
        })?;

        for offset in offsets {
            let mut actor = SaveGameArchive::reader(data.clone(), offset)
                .map_err(|error| ParseError { offset: offset as usize, error })?;
            let mut name = String::new();
            let mut class = None;
            let mut spawn_id = None;
            serialize_identity(actor.record(), &mut name, &mut class, &mut spawn_id).map_err(
                |error| ParseError {
                    offset: actor.versioned().tell() as usize,
                    error,
                },
            )?;
            summary.actors.push(ActorSummary {
                offset,
                name,
                class,
                spawn_id,
            });
        }
        Ok(summary)
    }
}
