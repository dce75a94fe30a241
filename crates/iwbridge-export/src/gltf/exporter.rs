//! Mesh record to glTF document and buffer

use serde_json::json;

use iwbridge_parsers::TextureSemantic;

use super::*;
use crate::error::ExportResult;
use crate::mesh::{math, Curve, MeshRecord};

/// Encoded `.gltf` document and its `.bin` buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GltfOutput {
    pub json: Vec<u8>,
    pub bin: Vec<u8>,
}

/// Layout of one accessor and the buffer view behind it
#[derive(Debug, Clone, Copy)]
struct Layout {
    component: ComponentType,
    dimension: Dimension,
    normalized: bool,
    target: Option<BufferTarget>,
}

impl Layout {
    const fn floats(dimension: Dimension) -> Self {
        Self {
            component: ComponentType::F32,
            dimension,
            normalized: false,
            target: Some(BufferTarget::Vertices),
        }
    }
}

/// Builds one glTF document plus its binary buffer per mesh
pub struct GltfExporter {
    pretty_json: bool,
    bin: Vec<u8>,
    accessors: Vec<Accessor>,
    buffer_views: Vec<BufferView>,
}

impl GltfExporter {
    pub fn new(pretty_json: bool) -> Self {
        Self {
            pretty_json,
            bin: Vec::new(),
            accessors: Vec::new(),
            buffer_views: Vec::new(),
        }
    }

    /// Encode `mesh`; the document references its buffer as `bin_uri`
    pub fn export(&mut self, mesh: &MeshRecord, bin_uri: &str) -> ExportResult<GltfOutput> {
        let document = self.build(mesh, bin_uri);
        let json = if self.pretty_json {
            serde_json::to_vec_pretty(&document)?
        } else {
            serde_json::to_vec(&document)?
        };
        Ok(GltfOutput {
            json,
            bin: std::mem::take(&mut self.bin),
        })
    }

    fn build(&mut self, mesh: &MeshRecord, bin_uri: &str) -> Document {
        self.bin.clear();
        self.accessors.clear();
        self.buffer_views.clear();

        let attributes = self.vertex_attributes(mesh);
        let targets = self.morph_targets(mesh);

        let ranges: Vec<(usize, usize, usize)> = if mesh.submeshes.is_empty() {
            vec![(0, mesh.indices.len(), 0)]
        } else {
            mesh.submeshes
                .iter()
                .map(|s| (s.first_index as usize, s.index_count as usize, s.material as usize))
                .collect()
        };
        let primitives = ranges
            .into_iter()
            .map(|(first, count, material)| Primitive {
                attributes: attributes.clone(),
                indices: self.push_indices(&mesh.indices[first..first + count]),
                material,
                targets: targets.clone(),
            })
            .collect();

        let gltf_mesh = Mesh {
            name: mesh.name.clone(),
            primitives,
            weights: vec![0.0; mesh.morph_targets.len()],
            extras: (!mesh.morph_targets.is_empty()).then(|| {
                json!({
                    "targetNames": mesh.morph_targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
                })
            }),
        };

        let skinned = !mesh.bones.is_empty();
        let mut nodes = vec![Node {
            name: mesh.name.clone(),
            mesh: Some(0),
            skin: skinned.then_some(0),
            ..Node::default()
        }];
        let mut roots = vec![0];
        let mut skins = Vec::new();
        let mut animations = Vec::new();
        if skinned {
            skins.push(self.skeleton(mesh, &mut nodes, &mut roots));
            animations = self.animations(mesh);
        }

        Document {
            asset: Asset::default(),
            scene: 0,
            scenes: vec![Scene { nodes: roots }],
            nodes,
            meshes: vec![gltf_mesh],
            materials: materials(mesh),
            accessors: std::mem::take(&mut self.accessors),
            buffer_views: std::mem::take(&mut self.buffer_views),
            buffers: vec![Buffer {
                uri: bin_uri.to_string(),
                byte_length: self.bin.len(),
            }],
            skins,
            animations,
        }
    }

    fn vertex_attributes(&mut self, mesh: &MeshRecord) -> Attributes {
        let mut attributes = Attributes::new();

        let bounds = mesh.bounds.map(|b| (b.min.to_vec(), b.max.to_vec()));
        attributes.insert("POSITION".into(), self.push_floats(&mesh.positions, Dimension::Vec3, bounds));
        if !mesh.normals.is_empty() {
            attributes.insert("NORMAL".into(), self.push_floats(&mesh.normals, Dimension::Vec3, None));
        }
        for (set, uv) in mesh.uv_channels.iter().enumerate() {
            attributes.insert(format!("TEXCOORD_{set}"), self.push_floats(&uv.coords, Dimension::Vec2, None));
        }

        if let Some(colors) = &mesh.colors {
            let offset = self.align();
            colors.iter().for_each(|c| self.bin.extend_from_slice(c));
            let layout = Layout {
                component: ComponentType::U8,
                dimension: Dimension::Vec4,
                normalized: true,
                target: Some(BufferTarget::Vertices),
            };
            attributes.insert("COLOR_0".into(), self.push_accessor(offset, colors.len(), layout, None));
        }

        if let Some(influences) = mesh.influences.as_ref().filter(|_| !mesh.bones.is_empty()) {
            let offset = self.align();
            for bone in influences.iter().flat_map(|i| i.bones) {
                self.bin.extend_from_slice(&bone.to_le_bytes());
            }
            let layout = Layout {
                component: ComponentType::U16,
                ..Layout::floats(Dimension::Vec4)
            };
            let joints = self.push_accessor(offset, influences.len(), layout, None);
            let weights: Vec<[f32; 4]> = influences.iter().map(|i| i.weights).collect();
            attributes.insert("JOINTS_0".into(), joints);
            attributes.insert("WEIGHTS_0".into(), self.push_floats(&weights, Dimension::Vec4, None));
        }

        attributes
    }

    /// Sparse morph deltas expanded to one dense position stream per target
    fn morph_targets(&mut self, mesh: &MeshRecord) -> Vec<Attributes> {
        mesh.morph_targets
            .iter()
            .map(|target| {
                let mut dense = vec![[0.0f32; 3]; mesh.vertex_count()];
                for &(vertex, delta) in &target.deltas {
                    dense[vertex as usize] = delta;
                }
                let bounds = component_bounds(&dense);
                Attributes::from([("POSITION".into(), self.push_floats(&dense, Dimension::Vec3, Some(bounds)))])
            })
            .collect()
    }

    /// Joint nodes follow the mesh node in skeleton order
    fn skeleton(&mut self, mesh: &MeshRecord, nodes: &mut Vec<Node>, roots: &mut Vec<usize>) -> Skin {
        for (i, bone) in mesh.bones.iter().enumerate() {
            nodes.push(Node {
                name: bone.name.clone(),
                translation: Some(bone.local.position),
                rotation: Some(math::normalize_quat(bone.local.rotation)),
                scale: Some(bone.local.scale),
                ..Node::default()
            });
            match bone.parent {
                Some(parent) => nodes[parent + 1].children.push(i + 1),
                None => roots.push(i + 1),
            }
        }

        let offset = self.align();
        for value in mesh.bones.iter().flat_map(|b| math::to_gltf_columns(&b.inverse_bind)) {
            self.bin.extend_from_slice(&value.to_le_bytes());
        }
        let layout = Layout {
            target: None,
            ..Layout::floats(Dimension::Mat4)
        };
        Skin {
            name: format!("{}_skin", mesh.name),
            inverse_bind_matrices: self.push_accessor(offset, mesh.bones.len(), layout, None),
            joints: (1..=mesh.bones.len()).collect(),
            skeleton: 1,
        }
    }

    /// One glTF animation per clip, one sampler per channel
    fn animations(&mut self, mesh: &MeshRecord) -> Vec<Animation> {
        let keys = |dimension| Layout {
            target: None,
            ..Layout::floats(dimension)
        };
        mesh.animations
            .iter()
            .map(|clip| {
                let mut channels = Vec::with_capacity(clip.channels.len());
                let mut samplers = Vec::with_capacity(clip.channels.len());
                for channel in &clip.channels {
                    let times: Vec<[f32; 1]> = channel.times.iter().map(|&t| [t]).collect();
                    let first = channel.times.first().copied().unwrap_or_default();
                    let last = channel.times.last().copied().unwrap_or_default();
                    let input = self.push_floats_as(&times, keys(Dimension::Scalar), Some((vec![first], vec![last])));
                    let (output, path) = match &channel.curve {
                        Curve::Translation(values) => {
                            (self.push_floats_as(values, keys(Dimension::Vec3), None), TargetPath::Translation)
                        }
                        Curve::Rotation(values) => {
                            (self.push_floats_as(values, keys(Dimension::Vec4), None), TargetPath::Rotation)
                        }
                        Curve::Scale(values) => {
                            (self.push_floats_as(values, keys(Dimension::Vec3), None), TargetPath::Scale)
                        }
                    };
                    samplers.push(Sampler {
                        input,
                        output,
                        interpolation: "LINEAR",
                    });
                    channels.push(Channel {
                        sampler: samplers.len() - 1,
                        // joint nodes start after the mesh node
                        target: ChannelTarget {
                            node: channel.bone + 1,
                            path,
                        },
                    });
                }
                Animation {
                    name: clip.name.clone(),
                    channels,
                    samplers,
                    extras: Some(json!({ "looping": clip.looping, "duration": clip.duration })),
                }
            })
            .collect()
    }

    /// Pad the buffer to a 4-byte boundary and return the next view offset
    fn align(&mut self) -> usize {
        let padded = self.bin.len().next_multiple_of(4);
        self.bin.resize(padded, 0);
        padded
    }

    fn push_floats<const N: usize>(
        &mut self,
        values: &[[f32; N]],
        dimension: Dimension,
        bounds: Option<(Vec<f32>, Vec<f32>)>,
    ) -> usize {
        self.push_floats_as(values, Layout::floats(dimension), bounds)
    }

    fn push_floats_as<const N: usize>(
        &mut self,
        values: &[[f32; N]],
        layout: Layout,
        bounds: Option<(Vec<f32>, Vec<f32>)>,
    ) -> usize {
        let offset = self.align();
        for component in values.iter().flatten() {
            self.bin.extend_from_slice(&component.to_le_bytes());
        }
        self.push_accessor(offset, values.len(), layout, bounds)
    }

    fn push_indices(&mut self, indices: &[u32]) -> usize {
        let offset = self.align();
        for index in indices {
            self.bin.extend_from_slice(&index.to_le_bytes());
        }
        let layout = Layout {
            component: ComponentType::U32,
            dimension: Dimension::Scalar,
            normalized: false,
            target: Some(BufferTarget::Indices),
        };
        self.push_accessor(offset, indices.len(), layout, None)
    }

    /// Close the view that started at `offset` and describe it
    fn push_accessor(
        &mut self,
        offset: usize,
        count: usize,
        layout: Layout,
        bounds: Option<(Vec<f32>, Vec<f32>)>,
    ) -> usize {
        self.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset: offset,
            byte_length: self.bin.len() - offset,
            target: layout.target,
        });
        let (min, max) = bounds.unzip();
        self.accessors.push(Accessor {
            buffer_view: self.buffer_views.len() - 1,
            component_type: layout.component,
            normalized: layout.normalized,
            count,
            dimension: layout.dimension,
            min,
            max,
        });
        self.accessors.len() - 1
    }
}

fn materials(mesh: &MeshRecord) -> Vec<Material> {
    if mesh.materials.is_empty() {
        return vec![Material {
            name: "DefaultMaterial".into(),
            pbr_metallic_roughness: Pbr::default(),
            extras: None,
        }];
    }
    mesh.materials
        .iter()
        .map(|m| {
            // Slot order is kept; a material may bind several textures per semantic
            let textures: Vec<serde_json::Value> = m
                .slots
                .iter()
                .map(|slot| {
                    let mut entry = json!({
                        "semantic": semantic_name(slot.semantic),
                        "texture": slot.texture_name,
                    });
                    if slot.texture_hash != 0 {
                        entry["hash"] = json!(format!("{:016x}", slot.texture_hash));
                    }
                    entry
                })
                .collect();
            Material {
                name: m.name.clone(),
                pbr_metallic_roughness: Pbr::default(),
                extras: (!textures.is_empty()).then(|| json!({ "textures": textures })),
            }
        })
        .collect()
}

fn semantic_name(semantic: TextureSemantic) -> String {
    match semantic {
        TextureSemantic::Albedo => "albedo".into(),
        TextureSemantic::Normal => "normal".into(),
        TextureSemantic::Specular => "specular".into(),
        TextureSemantic::Roughness => "roughness".into(),
        TextureSemantic::Metallic => "metallic".into(),
        TextureSemantic::Emissive => "emissive".into(),
        TextureSemantic::Occlusion => "occlusion".into(),
        TextureSemantic::Other(code) => format!("other_{code}"),
    }
}

fn component_bounds(values: &[[f32; 3]]) -> (Vec<f32>, Vec<f32>) {
    let first = values.first().copied().unwrap_or_default();
    let (min, max) = values.iter().fold((first, first), |(mut lo, mut hi), v| {
        for axis in 0..3 {
            lo[axis] = lo[axis].min(v[axis]);
            hi[axis] = hi[axis].max(v[axis]);
        }
        (lo, hi)
    });
    (min.to_vec(), max.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{reconstruct, MeshSettings};
    use iwbridge_parsers::{
        AnimationClip, BoneInfluence, BoneTrack, Keyframe, MorphTarget, RawBone, RawMaterial, RawMesh,
        TextureSlot, UpAxis,
    };

    fn skinned_quad() -> MeshRecord {
        let bone = |name: &str, parent: i32| RawBone {
            name: name.into(),
            parent,
            position: [0.0, 0.0, 1.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0, 1.0, 1.0],
        };
        let raw = RawMesh {
            name: "quad".into(),
            up_axis: UpAxis::Z,
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            indices: vec![0, 1, 2, 0, 2, 3],
            influences: Some(vec![
                BoneInfluence {
                    bones: [1, 0, 0, 0],
                    weights: [1.0, 0.0, 0.0, 0.0],
                };
                4
            ]),
            bones: vec![bone("root", -1), bone("tip", 0)],
            materials: vec![RawMaterial {
                name: "paint".into(),
                slots: vec![TextureSlot {
                    semantic: TextureSemantic::Albedo,
                    texture_hash: 0,
                    texture_name: "Textures/paint_albedo".into(),
                }],
            }],
            morph_targets: vec![MorphTarget {
                name: "bulge".into(),
                deltas: vec![(2, [0.0, 0.0, 0.5])],
            }],
            animations: vec![AnimationClip {
                name: "sway".into(),
                framerate: 24.0,
                frame_count: 25,
                looping: true,
                tracks: vec![BoneTrack {
                    bone: "tip".into(),
                    rotations: vec![
                        Keyframe {
                            frame: 0,
                            value: [0.0, 0.0, 0.0, 1.0],
                        },
                        Keyframe {
                            frame: 12,
                            value: [0.0, 0.0, 0.3826834, 0.9238795],
                        },
                        Keyframe {
                            frame: 24,
                            value: [0.0, 0.0, 0.0, 1.0],
                        },
                    ],
                    ..BoneTrack::default()
                }],
            }],
            ..RawMesh::default()
        };
        reconstruct(raw, &MeshSettings::default()).unwrap().0
    }

    #[test]
    fn test_document_structure() {
        let mesh = skinned_quad();
        let out = GltfExporter::new(false).export(&mesh, "quad.bin").unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&out.json).unwrap();

        assert_eq!(doc["asset"]["version"], "2.0");
        assert_eq!(doc["buffers"][0]["uri"], "quad.bin");
        assert_eq!(doc["buffers"][0]["byteLength"], out.bin.len());
        assert_eq!(doc["skins"][0]["joints"], json!([1, 2]));
        assert_eq!(doc["nodes"][1]["children"], json!([2]));
        assert_eq!(doc["scenes"][0]["nodes"], json!([0, 1]));
        assert_eq!(
            doc["materials"][0]["extras"]["textures"],
            json!([{ "semantic": "albedo", "texture": "Textures/paint_albedo" }])
        );
        assert_eq!(doc["meshes"][0]["extras"]["targetNames"], json!(["bulge"]));

        let primitive = &doc["meshes"][0]["primitives"][0];
        for attribute in ["POSITION", "NORMAL", "JOINTS_0", "WEIGHTS_0"] {
            assert!(primitive["attributes"][attribute].is_u64(), "{attribute}");
        }
        assert_eq!(primitive["targets"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_material_keeps_every_slot() {
        let mut mesh = skinned_quad();
        mesh.materials[0].slots = vec![
            TextureSlot {
                semantic: TextureSemantic::Albedo,
                texture_hash: 0xabc,
                texture_name: "Textures/base_albedo".into(),
            },
            TextureSlot {
                semantic: TextureSemantic::Albedo,
                texture_hash: 0,
                texture_name: "Textures/detail_albedo".into(),
            },
        ];
        let out = GltfExporter::new(false).export(&mesh, "quad.bin").unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&out.json).unwrap();

        let textures = doc["materials"][0]["extras"]["textures"].as_array().unwrap();
        assert_eq!(textures.len(), 2);
        assert_eq!(textures[0]["texture"], "Textures/base_albedo");
        assert_eq!(textures[0]["hash"], "0000000000000abc");
        assert_eq!(textures[1]["texture"], "Textures/detail_albedo");
        assert!(textures[1].get("hash").is_none());
    }

    #[test]
    fn test_animation_targets_joint_nodes() {
        let mesh = skinned_quad();
        let mut exporter = GltfExporter::new(false);
        let document = exporter.build(&mesh, "quad.bin");
        let doc = serde_json::to_value(&document).unwrap();

        let animation = &doc["animations"][0];
        assert_eq!(animation["name"], "sway");
        assert_eq!(animation["extras"]["looping"], true);
        assert_eq!(animation["channels"][0]["target"], json!({ "node": 2, "path": "rotation" }));
        assert_eq!(doc["nodes"][2]["name"], "tip");

        let sampler = &animation["samplers"][0];
        assert_eq!(sampler["interpolation"], "LINEAR");
        let input = &document.accessors[sampler["input"].as_u64().unwrap() as usize];
        assert_eq!(input.count, 3);
        assert_eq!(input.dimension, Dimension::Scalar);
        assert_eq!((input.min.clone(), input.max.clone()), (Some(vec![0.0]), Some(vec![1.0])));
        let output = &document.accessors[sampler["output"].as_u64().unwrap() as usize];
        assert_eq!(output.dimension, Dimension::Vec4);
        assert!(document.buffer_views[output.buffer_view].target.is_none());
    }

    #[test]
    fn test_buffer_views_aligned_and_in_bounds() {
        let mesh = skinned_quad();
        let mut exporter = GltfExporter::new(true);
        let document = exporter.build(&mesh, "quad.bin");
        for view in &document.buffer_views {
            assert_eq!(view.byte_offset % 4, 0);
            assert!(view.byte_offset + view.byte_length <= document.buffers[0].byte_length);
        }
    }

    #[test]
    fn test_export_is_deterministic() {
        let mesh = skinned_quad();
        let a = GltfExporter::new(true).export(&mesh, "quad.bin").unwrap();
        let b = GltfExporter::new(true).export(&mesh, "quad.bin").unwrap();
        assert_eq!(a, b);
    }
}
