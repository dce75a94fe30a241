//! Mesh reconstruction
//!
//! Turns a [`RawMesh`](iwbridge_parsers::RawMesh) into a validated,
//! host-frame [`MeshRecord`]: indices checked, bones ordered parent-first
//! with bind matrices, weights normalised and names sanitised. Animation
//! clips are bound to the reordered bones and keyed in seconds.

pub mod math;
mod reconstruct;

pub use reconstruct::reconstruct;

use serde::{Deserialize, Serialize};

use iwbridge_core::Transform;
use iwbridge_parsers::{BoneInfluence, MorphTarget, Submesh, TextureSlot, UvChannel};

use math::Mat4;

/// Mesh conversion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    /// Multiplier applied to positions and translations
    pub unit_scale: f32,
    /// Rotate Y-up sources into the host's Z-up frame
    pub convert_up_axis: bool,
    /// UV channels kept; higher channel indices are dropped first
    pub max_uv_channels: usize,
    /// Generate area-weighted normals when the source has none
    pub generate_normals: bool,
    /// Pretty-print the glTF JSON
    pub pretty_json: bool,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            unit_scale: 1.0,
            convert_up_axis: true,
            max_uv_channels: 4,
            generate_normals: true,
            pretty_json: true,
        }
    }
}

/// A bone in parent-first order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub local: Transform,
    pub world: Mat4,
    pub inverse_bind: Mat4,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Material {
    pub name: String,
    pub slots: Vec<TextureSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    pub fn of(points: &[[f32; 3]]) -> Option<Self> {
        let first = *points.first()?;
        let mut bounds = Bounds {
            min: first,
            max: first,
        };
        for p in points {
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(p[axis]);
                bounds.max[axis] = bounds.max[axis].max(p[axis]);
            }
        }
        Some(bounds)
    }
}

/// Host-frame values of one animated bone property
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Curve {
    Translation(Vec<[f32; 3]>),
    Rotation(Vec<[f32; 4]>),
    Scale(Vec<[f32; 3]>),
}

impl Curve {
    pub fn len(&self) -> usize {
        match self {
            Curve::Translation(v) | Curve::Scale(v) => v.len(),
            Curve::Rotation(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationChannel {
    /// Index into [`MeshRecord::bones`]
    pub bone: usize,
    /// Key times in seconds, strictly increasing, one per curve value
    pub times: Vec<f32>,
    pub curve: Curve,
}

/// Validated clip; every channel targets a bone of the owning record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Animation {
    pub name: String,
    /// Clip length in seconds
    pub duration: f32,
    pub looping: bool,
    pub channels: Vec<AnimationChannel>,
}

/// Validated mesh in the host frame
///
/// Every index is below the vertex count and every bone's parent precedes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshRecord {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    /// Sorted by channel index
    pub uv_channels: Vec<UvChannel>,
    pub colors: Option<Vec<[u8; 4]>>,
    /// Remapped to the bone order of `bones`, weights summing to 1
    pub influences: Option<Vec<BoneInfluence>>,
    pub indices: Vec<u32>,
    pub bones: Vec<Bone>,
    pub materials: Vec<Material>,
    pub submeshes: Vec<Submesh>,
    pub morph_targets: Vec<MorphTarget>,
    pub animations: Vec<Animation>,
    pub bounds: Option<Bounds>,
}

impl MeshRecord {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}
