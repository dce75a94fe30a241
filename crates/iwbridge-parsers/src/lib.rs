//! iwbridge-parsers
//!
//! Readers for foreign engine asset containers and the pack archives that
//! bundle them.
//!
//! # Supported Formats
//!
//! | Format    | Extension        | Description |
//! |-----------|------------------|-------------|
//! | Container | `.iwa`, `.iwac`  | Chunked asset container (texture, mesh, audio, physics) |
//! | Pack      | `.iwpak`, `.zip` | ZIP-layout archive of containers |
//! | DDS       | (embedded)       | DirectDraw Surface carried in a `DDSF` chunk |
//!
//! # Example
//!
//! ```rust,ignore
//! use iwbridge_parsers::{ContainerParser, Parser, SourceAsset};
//!
//! let container = ContainerParser::new().parse_file(Path::new("rock.iwa"))?;
//! for entry in container.entries() {
//!     println!("{} @ {} ({} bytes)", entry.tag, entry.offset, entry.length);
//! }
//! ```

pub mod archive;
pub mod asset;
pub mod audio;
pub mod compression;
pub mod container;
pub mod logging;
pub mod mesh;
pub mod physics;
pub mod registry;
pub mod texture;
pub mod traits;

// Re-export main types
pub use traits::{load_file, ParseError, ParseOptions, ParseResult, Parser};

pub use registry::{
    tags, ChunkDescriptor, ChunkDescriptorBuilder, ChunkRegistry, ChunkTag, RegistryError,
    GLOBAL_CHUNKS,
};

pub use archive::{ArchiveStatistics, PackArchive, PackEntry, PackEntryInfo, PackParser, PackWriter};
pub use asset::{AssetDescription, AssetRecord, RecordSummary, SourceAsset};
pub use audio::{AudioEncoding, AudioRecord};
pub use compression::Codec;
pub use container::{
    ChunkEntry, ChunkReader, Container, ContainerBuilder, ContainerHeader, ContainerMeta,
    ContainerParser, PayloadWriter, UpAxis,
};
pub use mesh::{
    AnimationClip, BoneInfluence, BoneTrack, Keyframe, MeshHeader, MorphTarget, RawBone,
    RawMaterial, RawMesh, Submesh, TextureSemantic, TextureSlot, UvChannel,
};
pub use physics::{CollisionShape, PhysicalMaterial, PhysicsRecord, ShapeGeometry};
pub use texture::{PixelFormat, TextureRecord};
