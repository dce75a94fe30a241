// iwbridge-parsers/src/mesh/records.rs
//! Raw mesh data structures, exactly as stored in the container

use serde::{Deserialize, Serialize};

/// Per-vertex skinning data (up to four influences)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoneInfluence {
    pub bones: [u16; 4],
    pub weights: [f32; 4],
}

/// A bone as authored: local transform relative to its parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBone {
    pub name: String,
    /// Parent bone index (-1 for roots)
    pub parent: i32,
    pub position: [f32; 3],
    /// Rotation quaternion `[x, y, z, w]`
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl RawBone {
    pub fn parent_index(&self) -> Option<usize> {
        usize::try_from(self.parent).ok()
    }
}

/// What a material texture slot feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureSemantic {
    Albedo,
    Normal,
    Specular,
    Roughness,
    Metallic,
    Emissive,
    Occlusion,
    Other(u8),
}

impl TextureSemantic {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => TextureSemantic::Albedo,
            1 => TextureSemantic::Normal,
            2 => TextureSemantic::Specular,
            3 => TextureSemantic::Roughness,
            4 => TextureSemantic::Metallic,
            5 => TextureSemantic::Emissive,
            6 => TextureSemantic::Occlusion,
            other => TextureSemantic::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            TextureSemantic::Albedo => 0,
            TextureSemantic::Normal => 1,
            TextureSemantic::Specular => 2,
            TextureSemantic::Roughness => 3,
            TextureSemantic::Metallic => 4,
            TextureSemantic::Emissive => 5,
            TextureSemantic::Occlusion => 6,
            TextureSemantic::Other(v) => v,
        }
    }
}

/// One texture reference of a material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSlot {
    pub semantic: TextureSemantic,
    /// Hash of the referenced texture asset (0 when unknown)
    pub texture_hash: u64,
    /// Texture asset identifier
    pub texture_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMaterial {
    pub name: String,
    pub slots: Vec<TextureSlot>,
}

/// Contiguous index range drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submesh {
    pub first_index: u32,
    pub index_count: u32,
    pub material: u32,
}

/// Sparse per-vertex position offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphTarget {
    pub name: String,
    pub deltas: Vec<(u32, [f32; 3])>,
}

/// UV set for one channel index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvChannel {
    pub channel: u16,
    pub coords: Vec<[f32; 2]>,
}

/// One key of a bone curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe<T> {
    pub frame: u32,
    pub value: T,
}

/// Local-space curves of one bone; any curve may be empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneTrack {
    /// Name of the animated bone in the mesh skeleton
    pub bone: String,
    pub translations: Vec<Keyframe<[f32; 3]>>,
    /// Quaternions `[x, y, z, w]`
    pub rotations: Vec<Keyframe<[f32; 4]>>,
    pub scales: Vec<Keyframe<[f32; 3]>>,
}

/// Skeletal animation clip stored alongside a mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    /// Frames per second
    pub framerate: f32,
    pub frame_count: u32,
    pub looping: bool,
    pub tracks: Vec<BoneTrack>,
}
