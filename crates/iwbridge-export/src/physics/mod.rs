//! Physics body translation
//!
//! Foreign collision shapes are mapped onto the host's primitive set. Boxes,
//! spheres and capsules translate directly; cylinders become a 16-sided
//! prism hull and convex or triangle meshes become the hull of their points.
//! Hull elements carry the deduplicated point cloud, the host builds the
//! actual hull from it on import.

pub mod hull;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use iwbridge_parsers::{CollisionShape, PhysicalMaterial, PhysicsRecord, ShapeGeometry, UpAxis};

use crate::error::{ExportError, ExportResult};
use crate::mesh::math::{normalize_quat, y_up_to_z_up, y_up_to_z_up_quat, y_up_to_z_up_scale};

/// Bumped whenever the body setup layout changes
pub const BODY_SETUP_VERSION: u32 = 1;

/// Sides of the prism that stands in for a cylinder
pub const CYLINDER_SEGMENTS: usize = 16;

/// Physics conversion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    pub unit_scale: f32,
    pub convert_up_axis: bool,
    pub pretty_json: bool,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            unit_scale: 1.0,
            convert_up_axis: true,
            pretty_json: true,
        }
    }
}

/// Host primitive; capsule and hull axes run along local Z
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostShape {
    Box {
        half_extents: [f32; 3],
    },
    Sphere {
        radius: f32,
    },
    Capsule {
        radius: f32,
        half_height: f32,
    },
    ConvexHull {
        /// Foreign shape type the hull was derived from
        source: String,
        points: Vec<[f32; 3]>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyElement {
    pub name: String,
    #[serde(flatten)]
    pub shape: HostShape,
    pub position: [f32; 3],
    /// Quaternion `[x, y, z, w]`
    pub rotation: [f32; 4],
    pub material: PhysicalMaterial,
}

/// The JSON body setup artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySetup {
    pub name: String,
    pub version: u32,
    pub up_axis: String,
    pub elements: Vec<BodyElement>,
}

/// Frame conversion shared by every shape of a record
#[derive(Debug, Clone, Copy)]
struct Frame {
    convert: bool,
    scale: f32,
}

impl Frame {
    fn point(self, p: [f32; 3]) -> [f32; 3] {
        let p = if self.convert { y_up_to_z_up(p) } else { p };
        p.map(|v| v * self.scale)
    }

    fn extents(self, e: [f32; 3]) -> [f32; 3] {
        let e = if self.convert { y_up_to_z_up_scale(e) } else { e };
        e.map(|v| v.abs() * self.scale)
    }

    fn rotation(self, q: [f32; 4]) -> [f32; 4] {
        normalize_quat(if self.convert { y_up_to_z_up_quat(q) } else { q })
    }

    fn length(self, v: f32) -> f32 {
        v.abs() * self.scale
    }
}

/// Translate every shape of `record`; the first degenerate hull aborts the body
#[instrument(skip_all, fields(body = %record.name, shapes = record.shapes.len()))]
pub fn translate(
    record: &PhysicsRecord,
    source_up: UpAxis,
    settings: &PhysicsSettings,
) -> ExportResult<BodySetup> {
    let frame = Frame {
        convert: settings.convert_up_axis && source_up == UpAxis::Y,
        scale: settings.unit_scale,
    };
    let up_axis = if frame.convert || source_up == UpAxis::Z { "z" } else { "y" };

    let elements = record
        .shapes
        .iter()
        .map(|shape| translate_shape(shape, frame))
        .collect::<ExportResult<Vec<_>>>()?;

    debug!(elements = elements.len(), "Translated physics body");
    Ok(BodySetup {
        name: iwbridge_core::sanitize_name(&record.name),
        version: BODY_SETUP_VERSION,
        up_axis: up_axis.to_string(),
        elements,
    })
}

fn translate_shape(shape: &CollisionShape, frame: Frame) -> ExportResult<BodyElement> {
    let host = match &shape.geometry {
        ShapeGeometry::Box { half_extents } => HostShape::Box {
            half_extents: frame.extents(*half_extents),
        },
        ShapeGeometry::Sphere { radius } => HostShape::Sphere {
            radius: frame.length(*radius),
        },
        ShapeGeometry::Capsule {
            radius,
            half_height,
        } => HostShape::Capsule {
            radius: frame.length(*radius),
            half_height: frame.length(*half_height),
        },
        ShapeGeometry::Cylinder {
            radius,
            half_height,
        } => convex_hull(
            shape,
            hull::prism_points(
                frame.length(*radius),
                frame.length(*half_height),
                CYLINDER_SEGMENTS,
            ),
        )?,
        ShapeGeometry::ConvexMesh { points } | ShapeGeometry::TriangleMesh { points, .. } => {
            convex_hull(shape, points.iter().map(|&p| frame.point(p)).collect())?
        }
    };

    Ok(BodyElement {
        name: iwbridge_core::sanitize_name(&shape.name),
        shape: host,
        position: frame.point(shape.transform.position),
        rotation: frame.rotation(shape.transform.rotation),
        material: shape.material.clone(),
    })
}

fn convex_hull(shape: &CollisionShape, points: Vec<[f32; 3]>) -> ExportResult<HostShape> {
    let unique = hull::dedup_points(&points);
    hull::check_volume(&unique)
        .map_err(|reason| ExportError::degenerate(&shape.name, reason.to_string()))?;
    Ok(HostShape::ConvexHull {
        source: shape.geometry.type_name().to_string(),
        points: unique,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use iwbridge_core::Transform;

    fn shape(name: &str, geometry: ShapeGeometry) -> CollisionShape {
        CollisionShape {
            name: name.into(),
            geometry,
            transform: Transform {
                position: [1.0, 2.0, 3.0],
                ..Transform::IDENTITY
            },
            material: PhysicalMaterial::default(),
        }
    }

    fn body(shapes: Vec<CollisionShape>) -> PhysicsRecord {
        PhysicsRecord {
            name: "crate body".into(),
            shapes,
        }
    }

    #[test]
    fn test_primitives_map_directly() {
        let record = body(vec![
            shape("b", ShapeGeometry::Box { half_extents: [1.0, 2.0, 3.0] }),
            shape("s", ShapeGeometry::Sphere { radius: 0.5 }),
            shape("c", ShapeGeometry::Capsule { radius: 0.25, half_height: 1.0 }),
        ]);
        let setup = translate(&record, UpAxis::Y, &PhysicsSettings::default()).unwrap();

        assert_eq!(setup.name, "crate_body");
        assert_eq!(setup.up_axis, "z");
        assert_eq!(setup.elements[0].shape, HostShape::Box { half_extents: [1.0, 3.0, 2.0] });
        assert_eq!(setup.elements[0].position, [1.0, -3.0, 2.0]);
        assert_eq!(setup.elements[1].shape, HostShape::Sphere { radius: 0.5 });
        assert!(matches!(setup.elements[2].shape, HostShape::Capsule { .. }));
    }

    #[test]
    fn test_unit_scale_and_z_up_source() {
        let record = body(vec![shape("s", ShapeGeometry::Sphere { radius: 0.5 })]);
        let settings = PhysicsSettings {
            unit_scale: 100.0,
            ..Default::default()
        };
        let setup = translate(&record, UpAxis::Z, &settings).unwrap();
        assert_eq!(setup.elements[0].shape, HostShape::Sphere { radius: 50.0 });
        assert_eq!(setup.elements[0].position, [100.0, 200.0, 300.0]);
    }

    #[test]
    fn test_cylinder_becomes_prism_hull() {
        let record = body(vec![shape("cyl", ShapeGeometry::Cylinder { radius: 1.0, half_height: 2.0 })]);
        let setup = translate(&record, UpAxis::Y, &PhysicsSettings::default()).unwrap();
        match &setup.elements[0].shape {
            HostShape::ConvexHull { source, points } => {
                assert_eq!(source, "cylinder");
                assert_eq!(points.len(), CYLINDER_SEGMENTS * 2);
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn test_triangle_mesh_points_deduplicated() {
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
        ];
        let record = body(vec![shape(
            "tri",
            ShapeGeometry::TriangleMesh { points, indices: vec![0, 1, 2, 3, 4, 5] },
        )]);
        let setup = translate(&record, UpAxis::Z, &PhysicsSettings::default()).unwrap();
        match &setup.elements[0].shape {
            HostShape::ConvexHull { points, .. } => assert_eq!(points.len(), 4),
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn test_coplanar_hull_is_degenerate() {
        let points = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.5, 0.0, 0.5]];
        let record = body(vec![shape("flat", ShapeGeometry::ConvexMesh { points })]);
        let err = translate(&record, UpAxis::Y, &PhysicsSettings::default()).unwrap_err();
        assert!(matches!(err, ExportError::DegenerateHull { ref shape, .. } if shape == "flat"));
    }

    #[test]
    fn test_json_layout() {
        let record = body(vec![shape("s", ShapeGeometry::Sphere { radius: 1.0 })]);
        let setup = translate(&record, UpAxis::Y, &PhysicsSettings::default()).unwrap();
        let value = serde_json::to_value(&setup).unwrap();
        assert_eq!(value["elements"][0]["type"], "sphere");
        assert_eq!(value["elements"][0]["material"]["name"], "Default");
        let back: BodySetup = serde_json::from_value(value).unwrap();
        assert_eq!(back, setup);
    }
}
