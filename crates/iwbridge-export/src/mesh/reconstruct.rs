//! Raw mesh validation and normalisation

use std::collections::HashMap;

use tracing::{debug, warn};

use iwbridge_core::{sanitize_name, Transform, Vec3};
use iwbridge_parsers::{AnimationClip, BoneInfluence, Keyframe, RawBone, RawMesh, UpAxis, UvChannel};

use super::math::{self, Mat4};
use super::{Animation, AnimationChannel, Bone, Bounds, Curve, Material, MeshRecord, MeshSettings};
use crate::artifact::ConversionWarning;
use crate::error::{ExportError, ExportResult};

/// Validate and normalise `raw` into the host frame
///
/// Fails with `InvalidTopology` when an index, range or bone reference is out
/// of bounds, the bone hierarchy has a cycle, or an animation curve is not
/// keyed in frame order. Surplus UV channels are dropped with a
/// [`ConversionWarning::ChannelTruncated`], animation tracks for unknown
/// bones with a [`ConversionWarning::TrackDropped`].
pub fn reconstruct(
    raw: RawMesh,
    settings: &MeshSettings,
) -> ExportResult<(MeshRecord, Vec<ConversionWarning>)> {
    let vertex_count = raw.positions.len();
    let mut warnings = Vec::new();

    check_attribute_lengths(&raw, vertex_count)?;
    check_indices(&raw.indices, vertex_count)?;
    check_submeshes(&raw)?;
    for target in &raw.morph_targets {
        if let Some((v, _)) = target.deltas.iter().find(|(v, _)| *v as usize >= vertex_count) {
            return Err(ExportError::topology(format!(
                "morph target '{}' moves vertex {v} of {vertex_count}",
                target.name
            )));
        }
    }

    let order = parent_first_order(&raw.bones)?;
    let mut new_index = vec![0usize; order.len()];
    for (new, &old) in order.iter().enumerate() {
        new_index[old] = new;
    }

    let influences = match raw.influences {
        Some(influences) => {
            let influences = remap_influences(influences, &new_index)?;
            if raw.bones.is_empty() {
                // Only all-zero weights get here; there is no root to bind them to
                warn!(mesh = %raw.name, "Dropping bone influences of a mesh without bones");
                None
            } else {
                Some(influences)
            }
        }
        None => None,
    };

    let uv_channels = truncate_uv_channels(raw.uv_channels, settings.max_uv_channels, &mut warnings);

    let frame = HostFrame {
        to_host: settings.convert_up_axis && raw.up_axis == UpAxis::Y,
        unit_scale: settings.unit_scale,
    };

    let positions: Vec<[f32; 3]> = raw.positions.iter().map(|&p| frame.point(p)).collect();
    let normals = match raw.normals {
        Some(normals) => normals.into_iter().map(|n| frame.direction(n)).collect(),
        None if settings.generate_normals => generate_normals(&positions, &raw.indices),
        None => Vec::new(),
    };
    let morph_targets = raw
        .morph_targets
        .into_iter()
        .map(|mut target| {
            target.name = sanitize_name(&target.name);
            for (_, delta) in &mut target.deltas {
                *delta = frame.point(*delta);
            }
            target
        })
        .collect();

    let bones = build_bones(&raw.bones, &order, &new_index, |bone| Transform {
        position: frame.point(bone.position),
        rotation: frame.rotation(bone.rotation),
        scale: frame.scale(bone.scale),
    })?;
    let animations = convert_animations(raw.animations, &raw.bones, &new_index, frame, &mut warnings)?;

    let materials = raw
        .materials
        .into_iter()
        .map(|m| Material {
            name: sanitize_name(&m.name),
            slots: m.slots,
        })
        .collect();

    debug!(
        mesh = %raw.name,
        vertices = vertex_count,
        triangles = raw.indices.len() / 3,
        bones = bones.len(),
        animations = animations.len(),
        "Reconstructed mesh"
    );

    let record = MeshRecord {
        name: sanitize_name(&raw.name),
        bounds: Bounds::of(&positions),
        positions,
        normals,
        uv_channels,
        colors: raw.colors,
        influences,
        indices: raw.indices,
        bones,
        materials,
        submeshes: raw.submeshes,
        morph_targets,
        animations,
    };
    Ok((record, warnings))
}

/// Axis and unit conversion into the host frame
#[derive(Debug, Clone, Copy)]
struct HostFrame {
    to_host: bool,
    unit_scale: f32,
}

impl HostFrame {
    fn point(self, p: [f32; 3]) -> [f32; 3] {
        self.direction(p).map(|v| v * self.unit_scale)
    }

    fn direction(self, n: [f32; 3]) -> [f32; 3] {
        if self.to_host {
            math::y_up_to_z_up(n)
        } else {
            n
        }
    }

    fn rotation(self, q: [f32; 4]) -> [f32; 4] {
        if self.to_host {
            math::y_up_to_z_up_quat(q)
        } else {
            q
        }
    }

    fn scale(self, s: [f32; 3]) -> [f32; 3] {
        if self.to_host {
            math::y_up_to_z_up_scale(s)
        } else {
            s
        }
    }
}

fn check_attribute_lengths(raw: &RawMesh, vertex_count: usize) -> ExportResult<()> {
    let mut lengths = vec![
        ("normals", raw.normals.as_ref().map(Vec::len)),
        ("colours", raw.colors.as_ref().map(Vec::len)),
        ("bone influences", raw.influences.as_ref().map(Vec::len)),
    ];
    lengths.extend(raw.uv_channels.iter().map(|uv| ("uv channel", Some(uv.coords.len()))));

    for (what, len) in lengths {
        if let Some(len) = len.filter(|&len| len != vertex_count) {
            return Err(ExportError::topology(format!(
                "{what} hold {len} entries for {vertex_count} vertices"
            )));
        }
    }
    Ok(())
}

fn check_indices(indices: &[u32], vertex_count: usize) -> ExportResult<()> {
    if indices.len() % 3 != 0 {
        return Err(ExportError::topology(format!(
            "index count {} is not a multiple of 3",
            indices.len()
        )));
    }
    if let Some((at, index)) = indices
        .iter()
        .enumerate()
        .find(|(_, &i)| i as usize >= vertex_count)
    {
        return Err(ExportError::topology(format!(
            "index {index} at position {at} is out of range for {vertex_count} vertices"
        )));
    }
    Ok(())
}

fn check_submeshes(raw: &RawMesh) -> ExportResult<()> {
    let material_count = raw.materials.len().max(1);
    for (i, submesh) in raw.submeshes.iter().enumerate() {
        let end = submesh.first_index as u64 + submesh.index_count as u64;
        if end > raw.indices.len() as u64 || submesh.index_count % 3 != 0 {
            return Err(ExportError::topology(format!(
                "submesh {i} covers indices {}..{end} of {}",
                submesh.first_index,
                raw.indices.len()
            )));
        }
        if submesh.material as usize >= material_count {
            return Err(ExportError::topology(format!(
                "submesh {i} uses material {} of {}",
                submesh.material,
                raw.materials.len()
            )));
        }
    }
    Ok(())
}

/// Stable parent-first order of `bones` (old indices)
///
/// A bone is placed as soon as its parent has been placed, scanning in
/// source order, so an already ordered skeleton is returned unchanged.
fn parent_first_order(bones: &[RawBone]) -> ExportResult<Vec<usize>> {
    let count = bones.len();
    for (i, bone) in bones.iter().enumerate() {
        if bone.parent < -1 || bone.parent_index().is_some_and(|p| p >= count) {
            return Err(ExportError::topology(format!(
                "bone {i} '{}' has parent {} of {count}",
                bone.name, bone.parent
            )));
        }
    }

    let mut placed = vec![false; count];
    let mut order = Vec::with_capacity(count);
    while order.len() < count {
        let before = order.len();
        for (i, bone) in bones.iter().enumerate() {
            if !placed[i] && bone.parent_index().map_or(true, |p| placed[p]) {
                placed[i] = true;
                order.push(i);
            }
        }
        if order.len() == before {
            let cyclic: Vec<String> = (0..count)
                .filter(|&i| !placed[i])
                .map(|i| format!("{i} -> {}", bones[i].parent))
                .collect();
            return Err(ExportError::topology(format!(
                "bone hierarchy has a cycle ({})",
                cyclic.join(", ")
            )));
        }
    }
    Ok(order)
}

fn remap_influences(
    influences: Vec<BoneInfluence>,
    new_index: &[usize],
) -> ExportResult<Vec<BoneInfluence>> {
    let bone_count = new_index.len();
    influences
        .into_iter()
        .enumerate()
        .map(|(vertex, influence)| {
            let mut bones = [0u16; 4];
            let mut weights = [0.0f32; 4];
            for slot in 0..4 {
                let weight = influence.weights[slot];
                if weight <= 0.0 || !weight.is_finite() {
                    continue;
                }
                let bone = influence.bones[slot] as usize;
                if bone >= bone_count {
                    return Err(ExportError::topology(format!(
                        "vertex {vertex} is weighted to bone {bone} of {bone_count}"
                    )));
                }
                bones[slot] = new_index[bone] as u16;
                weights[slot] = weight;
            }

            let total: f32 = weights.iter().sum();
            if total > 0.0 {
                weights = weights.map(|w| w / total);
            } else {
                // Unweighted vertices follow the root
                bones = [0; 4];
                weights = [1.0, 0.0, 0.0, 0.0];
            }
            Ok(BoneInfluence { bones, weights })
        })
        .collect()
}

/// Bind clips to the reordered skeleton and key them in seconds
///
/// Clips left without any channel are dropped; glTF requires at least one.
fn convert_animations(
    clips: Vec<AnimationClip>,
    bones: &[RawBone],
    new_index: &[usize],
    frame: HostFrame,
    warnings: &mut Vec<ConversionWarning>,
) -> ExportResult<Vec<Animation>> {
    let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(bones.len());
    for (old, bone) in bones.iter().enumerate() {
        by_name.entry(bone.name.as_str()).or_insert(new_index[old]);
    }

    let mut animations = Vec::with_capacity(clips.len());
    for clip in clips {
        if !(clip.framerate.is_finite() && clip.framerate > 0.0) {
            return Err(ExportError::topology(format!(
                "animation '{}' has framerate {}",
                clip.name, clip.framerate
            )));
        }
        let seconds = |f: u32| f as f32 / clip.framerate;

        let mut channels = Vec::new();
        let mut last_frame = 0;
        for track in clip.tracks {
            let Some(&bone) = by_name.get(track.bone.as_str()) else {
                warn!(clip = %clip.name, bone = %track.bone, "Animation track targets an unknown bone");
                warnings.push(ConversionWarning::TrackDropped {
                    clip: clip.name.clone(),
                    bone: track.bone,
                });
                continue;
            };

            let curves = [
                keyed(&clip.name, &track.bone, "translation", &track.translations, |v| {
                    Curve::Translation(v.iter().map(|&t| frame.point(t)).collect())
                })?,
                keyed(&clip.name, &track.bone, "rotation", &track.rotations, |v| {
                    Curve::Rotation(v.iter().map(|&q| math::normalize_quat(frame.rotation(q))).collect())
                })?,
                keyed(&clip.name, &track.bone, "scale", &track.scales, |v| {
                    Curve::Scale(v.iter().map(|&s| frame.scale(s)).collect())
                })?,
            ];
            for (frames, curve) in curves.into_iter().flatten() {
                last_frame = last_frame.max(frames.last().copied().unwrap_or(0));
                channels.push(AnimationChannel {
                    bone,
                    times: frames.into_iter().map(seconds).collect(),
                    curve,
                });
            }
        }

        if channels.is_empty() {
            debug!(clip = %clip.name, "Animation has no channels left; skipping");
            continue;
        }
        let frames = clip.frame_count.saturating_sub(1).max(last_frame);
        animations.push(Animation {
            name: sanitize_name(&clip.name),
            duration: seconds(frames),
            looping: clip.looping,
            channels,
        });
    }
    Ok(animations)
}

/// Frames and converted values of one non-empty curve
fn keyed<T: Copy>(
    clip: &str,
    bone: &str,
    property: &str,
    keys: &[Keyframe<T>],
    convert: impl FnOnce(&[T]) -> Curve,
) -> ExportResult<Option<(Vec<u32>, Curve)>> {
    if keys.is_empty() {
        return Ok(None);
    }
    if let Some(pair) = keys.windows(2).find(|pair| pair[1].frame <= pair[0].frame) {
        return Err(ExportError::topology(format!(
            "animation '{clip}' {property} keys of bone '{bone}' go from frame {} to {}",
            pair[0].frame, pair[1].frame
        )));
    }
    let values: Vec<T> = keys.iter().map(|k| k.value).collect();
    Ok(Some((keys.iter().map(|k| k.frame).collect(), convert(&values))))
}

fn truncate_uv_channels(
    mut channels: Vec<UvChannel>,
    max: usize,
    warnings: &mut Vec<ConversionWarning>,
) -> Vec<UvChannel> {
    channels.sort_by_key(|uv| uv.channel);
    if channels.len() <= max {
        return channels;
    }

    let mut dropped: Vec<u16> = channels.drain(max..).map(|uv| uv.channel).collect();
    dropped.reverse();
    let kept: Vec<u16> = channels.iter().map(|uv| uv.channel).collect();
    warn!(?kept, ?dropped, "UV channels exceed the host maximum; dropping");
    warnings.push(ConversionWarning::ChannelTruncated { kept, dropped });
    channels
}

/// Area-weighted vertex normals
fn generate_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut sums = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| i as usize);
        let (pa, pb, pc) = (
            Vec3::from_array(positions[a]),
            Vec3::from_array(positions[b]),
            Vec3::from_array(positions[c]),
        );
        // Cross product length is twice the face area
        let face = (pb - pa).cross(pc - pa);
        for v in [a, b, c] {
            sums[v] = sums[v] + face;
        }
    }
    sums.into_iter()
        .map(|n| {
            let n = n.normalized();
            if n == Vec3::ZERO {
                [0.0, 0.0, 1.0]
            } else {
                n.to_array()
            }
        })
        .collect()
}

fn build_bones(
    raw: &[RawBone],
    order: &[usize],
    new_index: &[usize],
    local_of: impl Fn(&RawBone) -> Transform,
) -> ExportResult<Vec<Bone>> {
    let mut bones: Vec<Bone> = Vec::with_capacity(order.len());
    for &old in order {
        let source = &raw[old];
        let parent = source.parent_index().map(|p| new_index[p]);
        let local = local_of(source);
        let local_matrix = math::from_transform(&local);
        let world: Mat4 = match parent {
            Some(p) => math::multiply(&local_matrix, &bones[p].world),
            None => local_matrix,
        };
        let inverse_bind = math::inverse_affine(&world).ok_or_else(|| {
            ExportError::topology(format!("bone '{}' has a singular bind matrix", source.name))
        })?;
        bones.push(Bone {
            name: sanitize_name(&source.name),
            parent,
            local,
            world,
            inverse_bind,
        });
    }
    Ok(bones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iwbridge_parsers::{BoneTrack, MorphTarget, RawMaterial, Submesh};

    fn bone(name: &str, parent: i32, y: f32) -> RawBone {
        RawBone {
            name: name.into(),
            parent,
            position: [0.0, y, 0.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0, 1.0, 1.0],
        }
    }

    fn triangle() -> RawMesh {
        RawMesh {
            name: "tri".into(),
            up_axis: UpAxis::Z,
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            indices: vec![0, 1, 2],
            ..RawMesh::default()
        }
    }

    #[test]
    fn test_index_out_of_range() {
        let mut raw = triangle();
        raw.indices = vec![0, 1, 3];
        let err = reconstruct(raw, &MeshSettings::default()).unwrap_err();
        assert!(matches!(err, ExportError::InvalidTopology(ref m) if m.contains("index 3")));
    }

    #[test]
    fn test_partial_triangle_rejected() {
        let mut raw = triangle();
        raw.indices.push(0);
        assert!(matches!(
            reconstruct(raw, &MeshSettings::default()),
            Err(ExportError::InvalidTopology(_))
        ));
    }

    #[test]
    fn test_bone_cycle_rejected() {
        let mut raw = triangle();
        raw.bones = vec![
            bone("root", -1, 0.0),
            bone("a", 0, 1.0),
            bone("b", 1, 1.0),
            bone("c", 5, 1.0),
            bone("d", 0, 1.0),
            bone("e", 3, 1.0),
        ];
        let err = reconstruct(raw, &MeshSettings::default()).unwrap_err();
        match err {
            ExportError::InvalidTopology(message) => {
                assert!(message.contains("cycle"));
                assert!(message.contains("3 -> 5"));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_influences_without_bones() {
        let unweighted = BoneInfluence {
            bones: [0; 4],
            weights: [0.0; 4],
        };
        let mut raw = triangle();
        raw.influences = Some(vec![unweighted; 3]);
        let (mesh, _) = reconstruct(raw, &MeshSettings::default()).unwrap();
        assert!(mesh.influences.is_none());

        let mut raw = triangle();
        raw.influences = Some(vec![
            BoneInfluence {
                bones: [0, 0, 0, 0],
                weights: [1.0, 0.0, 0.0, 0.0],
            };
            3
        ]);
        assert!(matches!(
            reconstruct(raw, &MeshSettings::default()),
            Err(ExportError::InvalidTopology(ref m)) if m.contains("bone 0 of 0")
        ));
    }

    #[test]
    fn test_bones_reordered_parent_first() {
        let mut raw = triangle();
        raw.bones = vec![bone("hand", 2, 1.0), bone("root", -1, 0.0), bone("arm", 1, 2.0)];
        raw.influences = Some(vec![
            BoneInfluence {
                bones: [0, 2, 0, 0],
                weights: [3.0, 1.0, 0.0, 0.0],
            };
            3
        ]);

        let (mesh, _) = reconstruct(raw, &MeshSettings::default()).unwrap();
        let names: Vec<&str> = mesh.bones.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["root", "arm", "hand"]);
        assert_eq!(mesh.bones[2].parent, Some(1));
        for (i, b) in mesh.bones.iter().enumerate() {
            assert!(b.parent.map_or(true, |p| p < i));
        }

        let influence = mesh.influences.unwrap()[0];
        assert_eq!(influence.bones[..2], [2, 1]);
        assert_eq!(influence.weights[..2], [0.75, 0.25]);

        // hand sits at 1 + 2 along the parent chain
        let hand = &mesh.bones[2];
        assert!((hand.world[3][1] - 3.0).abs() < 1e-6);
        assert!((hand.inverse_bind[3][1] + 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_weight_binds_to_root() {
        let mut raw = triangle();
        raw.bones = vec![bone("root", -1, 0.0)];
        raw.influences = Some(vec![
            BoneInfluence {
                bones: [0; 4],
                weights: [0.0; 4],
            };
            3
        ]);
        let (mesh, _) = reconstruct(raw, &MeshSettings::default()).unwrap();
        assert_eq!(mesh.influences.unwrap()[1].weights, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_influence_bone_out_of_range() {
        let mut raw = triangle();
        raw.bones = vec![bone("root", -1, 0.0)];
        raw.influences = Some(vec![
            BoneInfluence {
                bones: [4, 0, 0, 0],
                weights: [1.0, 0.0, 0.0, 0.0],
            };
            3
        ]);
        assert!(reconstruct(raw, &MeshSettings::default()).is_err());
    }

    #[test]
    fn test_uv_truncation_drops_highest_first() {
        let mut raw = triangle();
        raw.uv_channels = [3u16, 0, 5, 1]
            .into_iter()
            .map(|channel| UvChannel {
                channel,
                coords: vec![[0.0, 0.0]; 3],
            })
            .collect();
        let settings = MeshSettings {
            max_uv_channels: 2,
            ..MeshSettings::default()
        };

        let (mesh, warnings) = reconstruct(raw, &settings).unwrap();
        let kept: Vec<u16> = mesh.uv_channels.iter().map(|uv| uv.channel).collect();
        assert_eq!(kept, [0, 1]);
        assert_eq!(
            warnings,
            vec![ConversionWarning::ChannelTruncated {
                kept: vec![0, 1],
                dropped: vec![5, 3],
            }]
        );
    }

    #[test]
    fn test_generated_normals_and_axis_conversion() {
        let mut raw = triangle();
        raw.up_axis = UpAxis::Y;
        let settings = MeshSettings {
            unit_scale: 100.0,
            ..MeshSettings::default()
        };
        let (mesh, _) = reconstruct(raw, &settings).unwrap();

        // Source +Y becomes host +Z
        assert_eq!(mesh.positions[2], [0.0, 0.0, 100.0]);
        // Face in the XZ plane, wound towards -Y
        assert_eq!(mesh.normals[0], [0.0, -1.0, 0.0]);
        let bounds = mesh.bounds.unwrap();
        assert_eq!(bounds.max, [100.0, 0.0, 100.0]);
    }

    #[test]
    fn test_submesh_and_morph_ranges() {
        let mut raw = triangle();
        raw.materials = vec![RawMaterial {
            name: "metal/painted".into(),
            slots: vec![],
        }];
        raw.submeshes = vec![Submesh {
            first_index: 0,
            index_count: 6,
            material: 0,
        }];
        assert!(reconstruct(raw.clone(), &MeshSettings::default()).is_err());

        raw.submeshes[0].index_count = 3;
        raw.morph_targets = vec![MorphTarget {
            name: "smile".into(),
            deltas: vec![(9, [0.0, 0.1, 0.0])],
        }];
        assert!(reconstruct(raw.clone(), &MeshSettings::default()).is_err());

        raw.morph_targets[0].deltas[0].0 = 2;
        let (mesh, _) = reconstruct(raw, &MeshSettings::default()).unwrap();
        assert_eq!(mesh.materials[0].name, "metal_painted");
    }

    fn clip(tracks: Vec<BoneTrack>) -> AnimationClip {
        AnimationClip {
            name: "walk cycle".into(),
            framerate: 10.0,
            frame_count: 21,
            looping: true,
            tracks,
        }
    }

    fn key<T>(frame: u32, value: T) -> Keyframe<T> {
        Keyframe { frame, value }
    }

    #[test]
    fn test_animation_bound_to_reordered_bones() {
        let mut raw = triangle();
        raw.up_axis = UpAxis::Y;
        raw.bones = vec![bone("hand", 1, 1.0), bone("root", -1, 0.0)];
        raw.animations = vec![clip(vec![
            BoneTrack {
                bone: "hand".into(),
                translations: vec![key(0, [0.0, 1.0, 0.0]), key(10, [0.0, 2.0, 0.0])],
                ..BoneTrack::default()
            },
            BoneTrack {
                bone: "tail".into(),
                scales: vec![key(0, [1.0; 3])],
                ..BoneTrack::default()
            },
        ])];

        let (mesh, warnings) = reconstruct(raw, &MeshSettings::default()).unwrap();
        assert_eq!(
            warnings,
            vec![ConversionWarning::TrackDropped {
                clip: "walk cycle".into(),
                bone: "tail".into(),
            }]
        );

        let animation = &mesh.animations[0];
        assert_eq!(animation.name, "walk_cycle");
        assert_eq!(animation.duration, 2.0);
        assert_eq!(animation.channels.len(), 1);
        let channel = &animation.channels[0];
        // hand moves behind root in parent-first order
        assert_eq!(mesh.bones[channel.bone].name, "hand");
        assert_eq!(channel.bone, 1);
        assert_eq!(channel.times, [0.0, 1.0]);
        // source +Y becomes host +Z
        assert_eq!(channel.curve, Curve::Translation(vec![[0.0, 0.0, 1.0], [0.0, 0.0, 2.0]]));
    }

    #[test]
    fn test_animation_keys_must_increase() {
        let mut raw = triangle();
        raw.bones = vec![bone("root", -1, 0.0)];
        raw.animations = vec![clip(vec![BoneTrack {
            bone: "root".into(),
            rotations: vec![key(4, [0.0, 0.0, 0.0, 1.0]), key(4, [0.0, 0.0, 0.0, 1.0])],
            ..BoneTrack::default()
        }])];
        let err = reconstruct(raw.clone(), &MeshSettings::default()).unwrap_err();
        assert!(matches!(err, ExportError::InvalidTopology(ref m) if m.contains("frame 4 to 4")));

        raw.animations[0].tracks[0].rotations.pop();
        raw.animations[0].framerate = 0.0;
        assert!(matches!(
            reconstruct(raw, &MeshSettings::default()),
            Err(ExportError::InvalidTopology(ref m)) if m.contains("framerate")
        ));
    }

    #[test]
    fn test_clip_without_known_bones_is_skipped() {
        let mut raw = triangle();
        raw.bones = vec![bone("root", -1, 0.0)];
        raw.animations = vec![clip(vec![BoneTrack {
            bone: "ghost".into(),
            translations: vec![key(0, [0.0; 3])],
            ..BoneTrack::default()
        }])];
        let (mesh, warnings) = reconstruct(raw, &MeshSettings::default()).unwrap();
        assert!(mesh.animations.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
