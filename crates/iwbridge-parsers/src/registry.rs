//! Chunk descriptor table.
//!
//! The table tells the container reader which chunk tags exist, which asset
//! kinds may carry them, which are mandatory and which may repeat. New tags
//! can be registered at runtime without touching the reader.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use iwbridge_core::AssetKind;

/// Four-character chunk tag
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkTag(pub [u8; 4]);

impl ChunkTag {
    /// Create a tag from its four ASCII bytes
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    /// Tag as a printable string (non-ASCII bytes escaped)
    pub fn as_string(&self) -> String {
        self.0
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() {
                    (b as char).to_string()
                } else {
                    format!("\\x{b:02X}")
                }
            })
            .collect()
    }
}

impl std::fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl std::fmt::Debug for ChunkTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChunkTag({})", self.as_string())
    }
}

/// Built-in chunk tags
pub mod tags {
    use super::ChunkTag;

    pub const NAME: ChunkTag = ChunkTag::new(b"NAME");
    pub const META: ChunkTag = ChunkTag::new(b"META");

    pub const TEXTURE_HEADER: ChunkTag = ChunkTag::new(b"TXHD");
    pub const TEXTURE_MIP: ChunkTag = ChunkTag::new(b"TXMP");
    pub const TEXTURE_DDS: ChunkTag = ChunkTag::new(b"DDSF");

    pub const MESH_HEADER: ChunkTag = ChunkTag::new(b"MSHD");
    pub const POSITIONS: ChunkTag = ChunkTag::new(b"VPOS");
    pub const NORMALS: ChunkTag = ChunkTag::new(b"VNRM");
    pub const UVS: ChunkTag = ChunkTag::new(b"VTUV");
    pub const COLORS: ChunkTag = ChunkTag::new(b"VCOL");
    pub const WEIGHTS: ChunkTag = ChunkTag::new(b"VWGT");
    pub const INDICES: ChunkTag = ChunkTag::new(b"INDX");
    pub const BONES: ChunkTag = ChunkTag::new(b"BONE");
    pub const MATERIALS: ChunkTag = ChunkTag::new(b"MATL");
    pub const SUBMESHES: ChunkTag = ChunkTag::new(b"SUBM");
    pub const MORPHS: ChunkTag = ChunkTag::new(b"MRPH");
    pub const ANIMATION: ChunkTag = ChunkTag::new(b"ANIM");

    pub const AUDIO_HEADER: ChunkTag = ChunkTag::new(b"AUHD");
    pub const AUDIO_DATA: ChunkTag = ChunkTag::new(b"AUDT");

    pub const PHYSICS_SHAPES: ChunkTag = ChunkTag::new(b"PHSH");
}

/// Description of one chunk tag
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    /// Tag as stored in the directory
    pub tag: ChunkTag,
    /// Human-readable name
    pub name: String,
    /// Description of the payload
    pub description: String,
    /// Asset kinds that may carry this chunk (empty = any)
    pub kinds: Vec<AssetKind>,
    /// Whether a container of a listed kind must carry this chunk
    pub required: bool,
    /// Whether several chunks with this tag may appear
    pub repeatable: bool,
}

impl ChunkDescriptor {
    /// Check if the chunk may appear in a container of `kind`
    pub fn allowed_in(&self, kind: AssetKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

/// Registry of chunk descriptors keyed by tag
pub struct ChunkRegistry {
    descriptors: RwLock<HashMap<ChunkTag, Arc<ChunkDescriptor>>>,
}

impl ChunkRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry holding the built-in tags
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        register_builtin_chunks(&registry);
        registry
    }

    /// Register a new descriptor
    pub fn register(&self, descriptor: ChunkDescriptor) -> Result<(), RegistryError> {
        let mut descriptors = self.descriptors.write();
        if descriptors.contains_key(&descriptor.tag) {
            return Err(RegistryError::DuplicateTag(descriptor.tag.to_string()));
        }
        descriptors.insert(descriptor.tag, Arc::new(descriptor));
        Ok(())
    }

    /// Unregister a descriptor by tag
    pub fn unregister(&self, tag: ChunkTag) -> Result<(), RegistryError> {
        self.descriptors
            .write()
            .remove(&tag)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(tag.to_string()))
    }

    /// Look up a descriptor
    pub fn get(&self, tag: ChunkTag) -> Option<Arc<ChunkDescriptor>> {
        self.descriptors.read().get(&tag).cloned()
    }

    /// Tags a container of `kind` must carry, sorted
    pub fn required_for(&self, kind: AssetKind) -> Vec<ChunkTag> {
        let mut required: Vec<ChunkTag> = self
            .descriptors
            .read()
            .values()
            .filter(|d| d.required && d.kinds.contains(&kind))
            .map(|d| d.tag)
            .collect();
        required.sort();
        required
    }

    /// List all registered descriptors, sorted by tag
    pub fn list(&self) -> Vec<Arc<ChunkDescriptor>> {
        let mut all: Vec<_> = self.descriptors.read().values().cloned().collect();
        all.sort_by_key(|d| d.tag);
        all
    }
}

impl Default for ChunkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Chunk tag '{0}' already registered")]
    DuplicateTag(String),

    #[error("Chunk tag '{0}' not found")]
    NotFound(String),

    #[error("Descriptor is missing a tag")]
    MissingTag,
}

/// Global registry instance
pub static GLOBAL_CHUNKS: Lazy<ChunkRegistry> = Lazy::new(ChunkRegistry::with_builtin);

/// Register all built-in chunk tags
fn register_builtin_chunks(registry: &ChunkRegistry) {
    use AssetKind::{Audio, Mesh, Physics, Texture};

    let builtin = [
        (tags::NAME, "Name", "Display name", &[][..], false, false),
        (tags::META, "Metadata", "Up axis and author", &[][..], false, false),
        (tags::TEXTURE_HEADER, "Texture header", "Dimensions, mip count, DXGI format", &[Texture][..], false, false),
        (tags::TEXTURE_MIP, "Mip level", "Block data of one mip level", &[Texture][..], false, true),
        (tags::TEXTURE_DDS, "Embedded DDS", "Complete DDS surface", &[Texture][..], false, false),
        (tags::MESH_HEADER, "Mesh header", "Element counts", &[Mesh][..], true, false),
        (tags::POSITIONS, "Positions", "Vertex positions", &[Mesh][..], true, false),
        (tags::NORMALS, "Normals", "Vertex normals", &[Mesh][..], false, false),
        (tags::UVS, "UV channel", "Texture coordinates of one channel", &[Mesh][..], false, true),
        (tags::COLORS, "Colors", "RGBA8 vertex colors", &[Mesh][..], false, false),
        (tags::WEIGHTS, "Weights", "Four bone influences per vertex", &[Mesh][..], false, false),
        (tags::INDICES, "Indices", "Triangle list", &[Mesh][..], true, false),
        (tags::BONES, "Bones", "Bone hierarchy", &[Mesh][..], false, false),
        (tags::MATERIALS, "Materials", "Material slots", &[Mesh][..], false, false),
        (tags::SUBMESHES, "Submeshes", "Index ranges per material", &[Mesh][..], false, false),
        (tags::MORPHS, "Morph targets", "Sparse vertex deltas", &[Mesh][..], false, false),
        (tags::ANIMATION, "Animation", "One skeletal clip of keyed bone curves", &[Mesh][..], false, true),
        (tags::AUDIO_HEADER, "Audio header", "Rate, channels, encoding", &[Audio][..], true, false),
        (tags::AUDIO_DATA, "Audio stream", "Encoded frame stream segment", &[Audio][..], true, true),
        (tags::PHYSICS_SHAPES, "Collision shapes", "Collision primitive list", &[Physics][..], true, false),
    ];

    for (tag, name, description, kinds, required, repeatable) in builtin {
        let descriptor = ChunkDescriptorBuilder::new()
            .tag(tag)
            .name(name)
            .description(description)
            .kinds(kinds)
            .required(required)
            .repeatable(repeatable)
            .build();

        if let Ok(descriptor) = descriptor {
            if let Err(e) = registry.register(descriptor) {
                tracing::warn!(error = %e, "Skipping built-in chunk descriptor");
            }
        }
    }
}

/// Builder for chunk descriptors
pub struct ChunkDescriptorBuilder {
    tag: Option<ChunkTag>,
    name: Option<String>,
    description: String,
    kinds: Vec<AssetKind>,
    required: bool,
    repeatable: bool,
}

impl ChunkDescriptorBuilder {
    pub fn new() -> Self {
        Self {
            tag: None,
            name: None,
            description: String::new(),
            kinds: Vec::new(),
            required: false,
            repeatable: false,
        }
    }

    pub fn tag(mut self, tag: ChunkTag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn kinds(mut self, kinds: &[AssetKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn repeatable(mut self, repeatable: bool) -> Self {
        self.repeatable = repeatable;
        self
    }

    pub fn build(self) -> Result<ChunkDescriptor, RegistryError> {
        let tag = self.tag.ok_or(RegistryError::MissingTag)?;

        Ok(ChunkDescriptor {
            tag,
            name: self.name.unwrap_or_else(|| tag.to_string()),
            description: self.description,
            kinds: self.kinds,
            required: self.required,
            repeatable: self.repeatable,
        })
    }
}

impl Default for ChunkDescriptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_required_tags() {
        let registry = ChunkRegistry::with_builtin();

        assert_eq!(
            registry.required_for(AssetKind::Mesh),
            vec![tags::INDICES, tags::MESH_HEADER, tags::POSITIONS]
        );
        assert_eq!(
            registry.required_for(AssetKind::Audio),
            vec![tags::AUDIO_DATA, tags::AUDIO_HEADER]
        );
        assert!(registry.required_for(AssetKind::Texture).is_empty());
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = ChunkRegistry::with_builtin();
        let descriptor = ChunkDescriptorBuilder::new().tag(tags::NAME).build().unwrap();

        assert!(matches!(
            registry.register(descriptor),
            Err(RegistryError::DuplicateTag(_))
        ));
    }

    #[test]
    fn test_custom_tag() {
        let registry = ChunkRegistry::new();
        let tag = ChunkTag::new(b"LODS");
        let descriptor = ChunkDescriptorBuilder::new()
            .tag(tag)
            .kinds(&[AssetKind::Mesh])
            .repeatable(true)
            .build()
            .unwrap();
        registry.register(descriptor).unwrap();

        let found = registry.get(tag).unwrap();
        assert_eq!(found.name, "LODS");
        assert!(found.allowed_in(AssetKind::Mesh));
        assert!(!found.allowed_in(AssetKind::Audio));

        registry.unregister(tag).unwrap();
        assert!(registry.get(tag).is_none());
    }

    #[test]
    fn test_builder_requires_tag() {
        assert!(matches!(
            ChunkDescriptorBuilder::new().name("x").build(),
            Err(RegistryError::MissingTag)
        ));
    }

    #[test]
    fn test_tag_display_escapes() {
        assert_eq!(ChunkTag::new(b"VPOS").to_string(), "VPOS");
        assert_eq!(ChunkTag([0x00, b'A', b'B', b'C']).to_string(), "\\x00ABC");
    }
}
