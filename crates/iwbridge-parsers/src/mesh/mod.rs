//! Mesh chunk parser
//!
//! Reads the `MSHD` header and the vertex, index, skeleton, material,
//! submesh, morph and animation chunks it describes. Only structural checks happen
//! here (every chunk holds exactly what the header promises); index bounds
//! and bone hierarchy validity are the reconstructor's job.

mod records;

pub use records::{
    AnimationClip, BoneInfluence, BoneTrack, Keyframe, MorphTarget, RawBone, RawMaterial, Submesh,
    TextureSemantic, TextureSlot, UvChannel,
};

use iwbridge_core::AssetKind;
use serde::Serialize;

use crate::compression::Codec;
use crate::container::{ChunkEntry, ChunkReader, Container, ContainerBuilder, PayloadWriter, UpAxis};
use crate::registry::tags;
use crate::traits::{ParseError, ParseResult};

/// Size of one `VWGT` record: 4 × u16 bone + 4 × f32 weight
const INFLUENCE_SIZE: usize = 24;

/// Smallest `ANIM` track: empty bone name and three empty curves
const MIN_TRACK_SIZE: usize = 14;

/// Counts declared by the `MSHD` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeshHeader {
    pub vertex_count: u32,
    pub index_count: u32,
    pub uv_channel_count: u32,
    pub bone_count: u32,
    pub material_count: u32,
    pub flags: u32,
}

impl MeshHeader {
    fn parse(container: &Container) -> ParseResult<Self> {
        let entry = container.require(tags::MESH_HEADER)?;
        let payload = container.decode(entry)?;
        let mut reader = ChunkReader::new(&payload, entry.offset as u64);

        let header = Self {
            vertex_count: reader.u32()?,
            index_count: reader.u32()?,
            uv_channel_count: reader.u32()?,
            bone_count: reader.u32()?,
            material_count: reader.u32()?,
            flags: reader.u32()?,
        };
        reader.finish("mesh header")?;
        Ok(header)
    }
}

/// Mesh as stored in the container
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawMesh {
    pub name: String,
    pub up_axis: UpAxis,
    pub flags: u32,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    /// UV sets ordered by channel index
    pub uv_channels: Vec<UvChannel>,
    pub colors: Option<Vec<[u8; 4]>>,
    pub influences: Option<Vec<BoneInfluence>>,
    pub indices: Vec<u32>,
    pub bones: Vec<RawBone>,
    pub materials: Vec<RawMaterial>,
    pub submeshes: Vec<Submesh>,
    pub morph_targets: Vec<MorphTarget>,
    /// One clip per `ANIM` chunk, in sequence order
    pub animations: Vec<AnimationClip>,
}

/// Summary used by `inspect`
#[derive(Debug, Clone, Serialize)]
pub struct MeshSummary {
    pub vertices: usize,
    pub triangles: usize,
    pub uv_channels: usize,
    pub bones: usize,
    pub materials: usize,
    pub submeshes: usize,
    pub morph_targets: usize,
    pub animations: usize,
    pub skinned: bool,
}

impl RawMesh {
    /// Read every mesh chunk out of `container`
    pub fn from_container(container: &Container, name: &str) -> ParseResult<Self> {
        let header = MeshHeader::parse(container)?;
        let vertex_count = header.vertex_count as usize;
        let meta = container.meta()?;

        let positions = read_vec3s(container, container.require(tags::POSITIONS)?, vertex_count)?;

        let normals = match container.find(tags::NORMALS) {
            Some(entry) => Some(read_vec3s(container, entry, vertex_count)?),
            None => None,
        };

        let uv_channels = read_uv_channels(container, &header)?;

        let colors = match container.find(tags::COLORS) {
            Some(entry) => {
                let payload = sized_payload(container, entry, vertex_count * 4, "vertex colors")?;
                Some(
                    payload
                        .chunks_exact(4)
                        .map(|c| [c[0], c[1], c[2], c[3]])
                        .collect(),
                )
            }
            None => None,
        };

        let influences = match container.find(tags::WEIGHTS) {
            Some(entry) => {
                let payload =
                    sized_payload(container, entry, vertex_count * INFLUENCE_SIZE, "bone weights")?;
                let mut reader = ChunkReader::new(&payload, entry.offset as u64);
                let mut out = Vec::with_capacity(vertex_count);
                for _ in 0..vertex_count {
                    let bones = [reader.u16()?, reader.u16()?, reader.u16()?, reader.u16()?];
                    let weights = reader.f32_array::<4>()?;
                    out.push(BoneInfluence { bones, weights });
                }
                Some(out)
            }
            None => None,
        };

        let indices = {
            let entry = container.require(tags::INDICES)?;
            let payload =
                sized_payload(container, entry, header.index_count as usize * 4, "index buffer")?;
            payload
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        };

        let bones = read_bones(container, header.bone_count)?;
        let materials = read_materials(container, header.material_count)?;
        let submeshes = read_submeshes(container)?;
        let morph_targets = read_morphs(container)?;
        let animations = read_animations(container)?;

        tracing::trace!(
            name,
            vertices = vertex_count,
            indices = header.index_count,
            bones = bones.len(),
            "Parsed mesh chunks"
        );

        Ok(Self {
            name: name.to_string(),
            up_axis: meta.up_axis,
            flags: header.flags,
            positions,
            normals,
            uv_channels,
            colors,
            influences,
            indices,
            bones,
            materials,
            submeshes,
            morph_targets,
            animations,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_skinned(&self) -> bool {
        self.influences.is_some() && !self.bones.is_empty()
    }

    pub fn summary(&self) -> MeshSummary {
        MeshSummary {
            vertices: self.vertex_count(),
            triangles: self.triangle_count(),
            uv_channels: self.uv_channels.len(),
            bones: self.bones.len(),
            materials: self.materials.len(),
            submeshes: self.submeshes.len(),
            morph_targets: self.morph_targets.len(),
            animations: self.animations.len(),
            skinned: self.is_skinned(),
        }
    }

    /// Serialise into a mesh container with every chunk compressed by `codec`
    pub fn to_container(&self, codec: Codec) -> ParseResult<Vec<u8>> {
        let mut header = PayloadWriter::new();
        header
            .u32(self.positions.len() as u32)
            .u32(self.indices.len() as u32)
            .u32(self.uv_channels.len() as u32)
            .u32(self.bones.len() as u32)
            .u32(self.materials.len() as u32)
            .u32(self.flags);

        let mut meta = PayloadWriter::new();
        meta.u8(match self.up_axis {
            UpAxis::Y => 0,
            UpAxis::Z => 1,
        })
        .string("");

        let mut builder = ContainerBuilder::new(AssetKind::Mesh)
            .chunk(tags::NAME, self.name.as_bytes().to_vec())
            .chunk(tags::META, meta.finish())
            .chunk(tags::MESH_HEADER, header.finish())
            .chunk_with(tags::POSITIONS, 0, codec, vec3_payload(&self.positions))
            .chunk_with(tags::INDICES, 0, codec, {
                let mut w = PayloadWriter::new();
                for &i in &self.indices {
                    w.u32(i);
                }
                w.finish()
            });

        if let Some(normals) = &self.normals {
            builder = builder.chunk_with(tags::NORMALS, 0, codec, vec3_payload(normals));
        }
        for uv in &self.uv_channels {
            let mut w = PayloadWriter::new();
            for c in &uv.coords {
                w.f32s(c);
            }
            builder = builder.chunk_with(tags::UVS, uv.channel, codec, w.finish());
        }
        if let Some(colors) = &self.colors {
            builder = builder.chunk_with(tags::COLORS, 0, codec, colors.concat());
        }
        if let Some(influences) = &self.influences {
            let mut w = PayloadWriter::new();
            for inf in influences {
                for &b in &inf.bones {
                    w.u16(b);
                }
                w.f32s(&inf.weights);
            }
            builder = builder.chunk_with(tags::WEIGHTS, 0, codec, w.finish());
        }
        if !self.bones.is_empty() {
            let mut w = PayloadWriter::new();
            for bone in &self.bones {
                w.string(&bone.name)
                    .i32(bone.parent)
                    .f32s(&bone.position)
                    .f32s(&bone.rotation)
                    .f32s(&bone.scale);
            }
            builder = builder.chunk(tags::BONES, w.finish());
        }
        if !self.materials.is_empty() {
            let mut w = PayloadWriter::new();
            for material in &self.materials {
                w.string(&material.name).u8(material.slots.len() as u8);
                for slot in material.slots.iter().take(u8::MAX as usize) {
                    w.u8(slot.semantic.to_u8())
                        .u64(slot.texture_hash)
                        .string(&slot.texture_name);
                }
            }
            builder = builder.chunk(tags::MATERIALS, w.finish());
        }
        if !self.submeshes.is_empty() {
            let mut w = PayloadWriter::new();
            w.u32(self.submeshes.len() as u32);
            for s in &self.submeshes {
                w.u32(s.first_index).u32(s.index_count).u32(s.material);
            }
            builder = builder.chunk(tags::SUBMESHES, w.finish());
        }
        if !self.morph_targets.is_empty() {
            let mut w = PayloadWriter::new();
            w.u32(self.morph_targets.len() as u32);
            for morph in &self.morph_targets {
                w.string(&morph.name).u32(morph.deltas.len() as u32);
                for (vertex, delta) in &morph.deltas {
                    w.u32(*vertex).f32s(delta);
                }
            }
            builder = builder.chunk_with(tags::MORPHS, 0, codec, w.finish());
        }
        for (sequence, clip) in self.animations.iter().enumerate() {
            let mut w = PayloadWriter::new();
            w.string(&clip.name)
                .f32(clip.framerate)
                .u32(clip.frame_count)
                .u8(u8::from(clip.looping))
                .u32(clip.tracks.len() as u32);
            for track in &clip.tracks {
                w.string(&track.bone);
                write_keys(&mut w, &track.translations);
                write_keys(&mut w, &track.rotations);
                write_keys(&mut w, &track.scales);
            }
            builder = builder.chunk_with(tags::ANIMATION, sequence as u16, codec, w.finish());
        }

        builder.build()
    }
}

/// Decode `entry` and require exactly `expected` bytes
fn sized_payload(
    container: &Container,
    entry: &ChunkEntry,
    expected: usize,
    what: &str,
) -> ParseResult<bytes::Bytes> {
    let payload = container.decode(entry)?;
    if payload.len() != expected {
        return Err(ParseError::corrupted(
            entry.offset as u64,
            format!(
                "{what} chunk '{}' holds {} bytes, header requires {expected}",
                entry.tag,
                payload.len()
            ),
        ));
    }
    Ok(payload)
}

fn read_vec3s(container: &Container, entry: &ChunkEntry, count: usize) -> ParseResult<Vec<[f32; 3]>> {
    let payload = sized_payload(container, entry, count * 12, "vector")?;
    let mut reader = ChunkReader::new(&payload, entry.offset as u64);
    (0..count).map(|_| reader.f32_array::<3>()).collect()
}

fn vec3_payload(values: &[[f32; 3]]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    for v in values {
        w.f32s(v);
    }
    w.finish()
}

fn read_uv_channels(container: &Container, header: &MeshHeader) -> ParseResult<Vec<UvChannel>> {
    let entries = container.find_all(tags::UVS);
    if entries.len() != header.uv_channel_count as usize {
        return Err(ParseError::corrupted(
            container.require(tags::MESH_HEADER)?.offset as u64 + 8,
            format!(
                "header declares {} UV channels but {} UV chunks are present",
                header.uv_channel_count,
                entries.len()
            ),
        ));
    }

    let vertex_count = header.vertex_count as usize;
    let mut channels: Vec<UvChannel> = Vec::with_capacity(entries.len());
    for entry in entries {
        if channels.last().is_some_and(|c| c.channel == entry.index) {
            return Err(ParseError::corrupted(
                entry.directory_position + 16,
                format!("UV channel {} appears twice", entry.index),
            ));
        }
        let payload = sized_payload(container, entry, vertex_count * 8, "UV")?;
        let mut reader = ChunkReader::new(&payload, entry.offset as u64);
        let coords = (0..vertex_count)
            .map(|_| reader.f32_array::<2>())
            .collect::<ParseResult<Vec<_>>>()?;
        channels.push(UvChannel {
            channel: entry.index,
            coords,
        });
    }
    Ok(channels)
}

fn read_bones(container: &Container, count: u32) -> ParseResult<Vec<RawBone>> {
    let Some(entry) = container.find(tags::BONES) else {
        if count > 0 {
            return Err(ParseError::MissingChunk {
                tag: tags::BONES.to_string(),
            });
        }
        return Ok(Vec::new());
    };

    let payload = container.decode(entry)?;
    let mut reader = ChunkReader::new(&payload, entry.offset as u64);
    let mut bones = Vec::with_capacity(count as usize);
    for _ in 0..count {
        bones.push(RawBone {
            name: reader.string()?,
            parent: reader.i32()?,
            position: reader.f32_array()?,
            rotation: reader.f32_array()?,
            scale: reader.f32_array()?,
        });
    }
    reader.finish("bone table")?;
    Ok(bones)
}

fn read_materials(container: &Container, count: u32) -> ParseResult<Vec<RawMaterial>> {
    let Some(entry) = container.find(tags::MATERIALS) else {
        if count > 0 {
            return Err(ParseError::MissingChunk {
                tag: tags::MATERIALS.to_string(),
            });
        }
        return Ok(Vec::new());
    };

    let payload = container.decode(entry)?;
    let mut reader = ChunkReader::new(&payload, entry.offset as u64);
    let mut materials = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = reader.string()?;
        let slot_count = reader.u8()?;
        let mut slots = Vec::with_capacity(slot_count as usize);
        for _ in 0..slot_count {
            slots.push(TextureSlot {
                semantic: TextureSemantic::from_u8(reader.u8()?),
                texture_hash: reader.u64()?,
                texture_name: reader.string()?,
            });
        }
        materials.push(RawMaterial { name, slots });
    }
    reader.finish("material table")?;
    Ok(materials)
}

fn read_submeshes(container: &Container) -> ParseResult<Vec<Submesh>> {
    let Some(entry) = container.find(tags::SUBMESHES) else {
        return Ok(Vec::new());
    };

    let payload = container.decode(entry)?;
    let mut reader = ChunkReader::new(&payload, entry.offset as u64);
    let count = reader.count(12)?;
    let submeshes = (0..count)
        .map(|_| {
            Ok(Submesh {
                first_index: reader.u32()?,
                index_count: reader.u32()?,
                material: reader.u32()?,
            })
        })
        .collect::<ParseResult<Vec<_>>>()?;
    reader.finish("submesh table")?;
    Ok(submeshes)
}

fn read_morphs(container: &Container) -> ParseResult<Vec<MorphTarget>> {
    let Some(entry) = container.find(tags::MORPHS) else {
        return Ok(Vec::new());
    };

    let payload = container.decode(entry)?;
    let mut reader = ChunkReader::new(&payload, entry.offset as u64);
    let count = reader.count(6)?;
    let mut morphs = Vec::with_capacity(count);
    for _ in 0..count {
        let name = reader.string()?;
        let delta_count = reader.count(16)?;
        let mut deltas = Vec::with_capacity(delta_count);
        for _ in 0..delta_count {
            deltas.push((reader.u32()?, reader.f32_array::<3>()?));
        }
        morphs.push(MorphTarget { name, deltas });
    }
    reader.finish("morph table")?;
    Ok(morphs)
}

fn read_animations(container: &Container) -> ParseResult<Vec<AnimationClip>> {
    let mut clips = Vec::new();
    for entry in container.find_all(tags::ANIMATION) {
        let payload = container.decode(entry)?;
        let mut reader = ChunkReader::new(&payload, entry.offset as u64);
        let name = reader.string()?;
        let framerate = reader.f32()?;
        let frame_count = reader.u32()?;
        let looping = reader.u8()? & 1 != 0;
        let track_count = reader.count(MIN_TRACK_SIZE)?;
        let mut tracks = Vec::with_capacity(track_count);
        for _ in 0..track_count {
            tracks.push(BoneTrack {
                bone: reader.string()?,
                translations: read_keys(&mut reader)?,
                rotations: read_keys(&mut reader)?,
                scales: read_keys(&mut reader)?,
            });
        }
        reader.finish("animation clip")?;
        clips.push(AnimationClip {
            name,
            framerate,
            frame_count,
            looping,
            tracks,
        });
    }
    Ok(clips)
}

/// Count-prefixed `(frame, [f32; N])` keys
fn read_keys<const N: usize>(reader: &mut ChunkReader<'_>) -> ParseResult<Vec<Keyframe<[f32; N]>>> {
    let count = reader.count(4 + N * 4)?;
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        keys.push(Keyframe {
            frame: reader.u32()?,
            value: reader.f32_array::<N>()?,
        });
    }
    Ok(keys)
}

fn write_keys<const N: usize>(w: &mut PayloadWriter, keys: &[Keyframe<[f32; N]>]) {
    w.u32(keys.len() as u32);
    for key in keys {
        w.u32(key.frame).f32s(&key.value);
    }
}
