//! Source assets and their typed records

use bytes::Bytes;
use serde::Serialize;

use iwbridge_core::{AssetId, AssetKind, ContentHash};

use crate::audio::{AudioRecord, AudioSummary};
use crate::container::{Container, ContainerHeader, ContainerMeta};
use crate::mesh::{MeshSummary, RawMesh};
use crate::physics::PhysicsRecord;
use crate::registry::GLOBAL_CHUNKS;
use crate::texture::{TextureRecord, TextureSummary};
use crate::traits::{ParseOptions, ParseResult};

/// A source container read from disk or a pack, immutable once read
#[derive(Debug, Clone)]
pub struct SourceAsset {
    pub id: AssetId,
    pub kind: AssetKind,
    /// SHA-256 of the raw container bytes
    pub hash: ContentHash,
    pub container: Container,
}

impl SourceAsset {
    /// Hash and parse `data` as the container for `id`
    pub fn read(id: AssetId, data: Bytes, options: &ParseOptions) -> ParseResult<Self> {
        let hash = ContentHash::of(&data);
        let container = Container::parse_with(data, options, &GLOBAL_CHUNKS)?;
        Ok(Self {
            id,
            kind: container.kind(),
            hash,
            container,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        self.container.header()
    }

    /// Display name: the `NAME` chunk, else the identifier's last segment
    pub fn display_name(&self) -> ParseResult<String> {
        Ok(self
            .container
            .name()?
            .unwrap_or_else(|| self.id.file_stem().to_string()))
    }

    /// Decode the typed record for this asset's kind
    pub fn parse_record(&self) -> ParseResult<AssetRecord> {
        let name = self.display_name()?;
        let record = match self.kind {
            AssetKind::Texture => {
                AssetRecord::Texture(TextureRecord::from_container(&self.container, &name)?)
            }
            AssetKind::Mesh => AssetRecord::Mesh(RawMesh::from_container(&self.container, &name)?),
            AssetKind::Audio => {
                AssetRecord::Audio(AudioRecord::from_container(&self.container, &name)?)
            }
            AssetKind::Physics => {
                AssetRecord::Physics(PhysicsRecord::from_container(&self.container, &name)?)
            }
        };
        Ok(record)
    }

    /// Structural description for `inspect`
    pub fn describe(&self) -> ParseResult<AssetDescription> {
        let record = self.parse_record()?;
        Ok(AssetDescription {
            id: self.id.to_string(),
            kind: self.kind,
            hash: self.hash.to_string(),
            version: self.container.version(),
            bytes: self.container.len(),
            meta: self.container.meta()?,
            chunks: self
                .container
                .entries()
                .iter()
                .map(|e| ChunkDescription {
                    tag: e.tag.to_string(),
                    index: e.index,
                    offset: e.offset,
                    length: e.length,
                    decoded_length: e.decoded_length,
                    compression: e.codec.name(),
                })
                .collect(),
            record: record.summary(),
        })
    }
}

/// Typed record owned by the conversion stage that consumes it
#[derive(Debug, Clone)]
pub enum AssetRecord {
    Texture(TextureRecord),
    Mesh(RawMesh),
    Audio(AudioRecord),
    Physics(PhysicsRecord),
}

impl AssetRecord {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetRecord::Texture(_) => AssetKind::Texture,
            AssetRecord::Mesh(_) => AssetKind::Mesh,
            AssetRecord::Audio(_) => AssetKind::Audio,
            AssetRecord::Physics(_) => AssetKind::Physics,
        }
    }

    pub fn summary(&self) -> RecordSummary {
        match self {
            AssetRecord::Texture(t) => RecordSummary::Texture(t.summary()),
            AssetRecord::Mesh(m) => RecordSummary::Mesh(m.summary()),
            AssetRecord::Audio(a) => RecordSummary::Audio(a.summary()),
            AssetRecord::Physics(p) => RecordSummary::Physics {
                shapes: p.shapes.iter().map(|s| s.geometry.type_name()).collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSummary {
    Texture(TextureSummary),
    Mesh(MeshSummary),
    Audio(AudioSummary),
    Physics { shapes: Vec<&'static str> },
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkDescription {
    pub tag: String,
    pub index: u16,
    pub offset: u32,
    pub length: u32,
    pub decoded_length: u32,
    pub compression: &'static str,
}

/// Everything `inspect` prints about one container
#[derive(Debug, Clone, Serialize)]
pub struct AssetDescription {
    pub id: String,
    pub kind: AssetKind,
    pub hash: String,
    pub version: u32,
    pub bytes: usize,
    pub meta: ContainerMeta,
    pub chunks: Vec<ChunkDescription>,
    pub record: RecordSummary,
}
