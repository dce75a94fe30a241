//! Common types used across iwbridge
//!
//! Identifiers, asset kinds, content hashes and small math types shared by
//! the parsers, converters, catalog and pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Normalised source identifier (relative path with `/` separators)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    /// Create an identifier, normalising separators and stripping leading `./` and `/`
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw.as_ref().replace('\\', "/");
        let mut parts: Vec<&str> = Vec::new();
        for part in normalized.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }
        Self(parts.join("/"))
    }

    /// Identifier for `path` relative to `root`, extension removed
    pub fn from_path(root: &Path, path: &Path) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let without_ext = relative.with_extension("");
        Self::new(without_ext.to_string_lossy())
    }

    /// Identifier nested under a prefix (e.g. an archive stem)
    pub fn join(&self, child: &str) -> Self {
        Self::new(format!("{}/{}", self.0, child))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component
    pub fn file_stem(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Category of a source asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Texture,
    Mesh,
    Audio,
    Physics,
}

impl AssetKind {
    /// All kinds in container tag order
    pub const ALL: [AssetKind; 4] = [
        AssetKind::Texture,
        AssetKind::Mesh,
        AssetKind::Audio,
        AssetKind::Physics,
    ];

    /// Create from the container kind byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AssetKind::Texture),
            1 => Some(AssetKind::Mesh),
            2 => Some(AssetKind::Audio),
            3 => Some(AssetKind::Physics),
            _ => None,
        }
    }

    /// Convert to the container kind byte
    pub fn to_u8(self) -> u8 {
        match self {
            AssetKind::Texture => 0,
            AssetKind::Mesh => 1,
            AssetKind::Audio => 2,
            AssetKind::Physics => 3,
        }
    }

    /// Output folder for artifacts of this kind
    pub fn folder(self) -> &'static str {
        match self {
            AssetKind::Texture => "Textures",
            AssetKind::Mesh => "Meshes",
            AssetKind::Audio => "Audio",
            AssetKind::Physics => "Physics",
        }
    }

    /// Primary artifact extension
    pub fn artifact_extension(self) -> &'static str {
        match self {
            AssetKind::Texture => "dds",
            AssetKind::Mesh => "gltf",
            AssetKind::Audio => "adpcm",
            AssetKind::Physics => "json",
        }
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Texture => "texture",
            AssetKind::Mesh => "mesh",
            AssetKind::Audio => "audio",
            AssetKind::Physics => "physics",
        }
    }

    /// Parse the lowercase name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 of a source asset's raw bytes, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a byte span
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(hex::encode(digest))
    }

    /// Wrap an already encoded digest (e.g. read back from storage)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Full hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` hex digits
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 3D vector (position, normal, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(a: [f32; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector, or zero for a zero-length input
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len > f32::EPSILON {
            self.scale(1.0 / len)
        } else {
            Vec3::ZERO
        }
    }

    pub fn scale(self, s: f32) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Translation, rotation (quaternion `[x, y, z, w]`) and scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0, 1.0, 1.0],
    };
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Replace every character that is not ASCII alphanumeric or `_` with `_`
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_normalisation() {
        assert_eq!(AssetId::new("./textures\\rock//albedo").as_str(), "textures/rock/albedo");
        assert_eq!(AssetId::new("/a/b/../c").as_str(), "a/c");
        assert_eq!(AssetId::new("a/b/c").file_stem(), "c");
    }

    #[test]
    fn test_asset_id_from_path() {
        let id = AssetId::from_path(Path::new("/src"), Path::new("/src/meshes/crate.iwa"));
        assert_eq!(id.as_str(), "meshes/crate");
    }

    #[test]
    fn test_content_hash() {
        let hash = ContentHash::of(b"abc");
        assert_eq!(
            hash.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash.short(8), "ba7816bf");
    }

    #[test]
    fn test_asset_kind_roundtrip_byte() {
        for kind in AssetKind::ALL {
            assert_eq!(AssetKind::from_u8(kind.to_u8()), Some(kind));
        }
        assert_eq!(AssetKind::from_u8(9), None);
        assert_eq!(AssetKind::parse("MESH"), Some(AssetKind::Mesh));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("mtl/metal-01 (copy)"), "mtl_metal_01__copy_");
        assert_eq!(sanitize_name("Bone_Spine01"), "Bone_Spine01");
    }

    #[test]
    fn test_vec3_cross() {
        let z = Vec3::new(1.0, 0.0, 0.0).cross(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(z, Vec3::new(0.0, 0.0, 1.0));
    }
}
