//! Physics chunk parser
//!
//! A single `PHSH` chunk lists collision shapes:
//!
//! ```text
//! count u32
//! per shape:
//!   type u8 | name | position 3f | rotation 4f | params | material
//! params:
//!   0 box        half extents 3f
//!   1 sphere     radius f
//!   2 capsule    radius f, half height f
//!   3 cylinder   radius f, half height f
//!   4 convex     point count u32, points 3f × n
//!   5 trimesh    point count u32, points 3f × n, index count u32, u32 × n
//! material:
//!   name | friction f | restitution f | density f
//! ```

use iwbridge_core::{AssetKind, Transform};
use serde::{Deserialize, Serialize};

use crate::container::{ChunkReader, Container, ContainerBuilder, PayloadWriter};
use crate::registry::tags;
use crate::traits::{ParseError, ParseResult};

/// Foreign shape geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeGeometry {
    Box { half_extents: [f32; 3] },
    Sphere { radius: f32 },
    Capsule { radius: f32, half_height: f32 },
    Cylinder { radius: f32, half_height: f32 },
    ConvexMesh { points: Vec<[f32; 3]> },
    TriangleMesh { points: Vec<[f32; 3]>, indices: Vec<u32> },
}

impl ShapeGeometry {
    pub fn type_code(&self) -> u8 {
        match self {
            ShapeGeometry::Box { .. } => 0,
            ShapeGeometry::Sphere { .. } => 1,
            ShapeGeometry::Capsule { .. } => 2,
            ShapeGeometry::Cylinder { .. } => 3,
            ShapeGeometry::ConvexMesh { .. } => 4,
            ShapeGeometry::TriangleMesh { .. } => 5,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ShapeGeometry::Box { .. } => "box",
            ShapeGeometry::Sphere { .. } => "sphere",
            ShapeGeometry::Capsule { .. } => "capsule",
            ShapeGeometry::Cylinder { .. } => "cylinder",
            ShapeGeometry::ConvexMesh { .. } => "convex_mesh",
            ShapeGeometry::TriangleMesh { .. } => "triangle_mesh",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalMaterial {
    pub name: String,
    pub friction: f32,
    pub restitution: f32,
    pub density: f32,
}

impl Default for PhysicalMaterial {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            friction: 0.7,
            restitution: 0.3,
            density: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionShape {
    pub name: String,
    pub geometry: ShapeGeometry,
    pub transform: Transform,
    pub material: PhysicalMaterial,
}

/// Parsed collision setup
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsRecord {
    pub name: String,
    pub shapes: Vec<CollisionShape>,
}

impl PhysicsRecord {
    /// Read the physics record out of `container`
    pub fn from_container(container: &Container, name: &str) -> ParseResult<Self> {
        let entry = container.require(tags::PHYSICS_SHAPES)?;
        let payload = container.decode(entry)?;
        let mut reader = ChunkReader::new(&payload, entry.offset as u64);

        // smallest possible shape: sphere with empty names
        let count = reader.count(1 + 2 + 28 + 4 + 2 + 12)?;
        let mut shapes = Vec::with_capacity(count);
        for _ in 0..count {
            shapes.push(read_shape(&mut reader)?);
        }
        reader.finish("shape table")?;

        Ok(Self {
            name: name.to_string(),
            shapes,
        })
    }

    /// Serialise into a physics container
    pub fn to_container(&self) -> ParseResult<Vec<u8>> {
        let mut w = PayloadWriter::new();
        w.u32(self.shapes.len() as u32);
        for shape in &self.shapes {
            write_shape(&mut w, shape);
        }

        ContainerBuilder::new(AssetKind::Physics)
            .chunk(tags::NAME, self.name.as_bytes().to_vec())
            .chunk(tags::PHYSICS_SHAPES, w.finish())
            .build()
    }
}

fn read_points(reader: &mut ChunkReader<'_>) -> ParseResult<Vec<[f32; 3]>> {
    let count = reader.count(12)?;
    (0..count).map(|_| reader.f32_array::<3>()).collect()
}

fn read_shape(reader: &mut ChunkReader<'_>) -> ParseResult<CollisionShape> {
    let at = reader.position();
    let type_code = reader.u8()?;
    let name = reader.string()?;
    let transform = Transform {
        position: reader.f32_array()?,
        rotation: reader.f32_array()?,
        scale: [1.0; 3],
    };

    let geometry = match type_code {
        0 => ShapeGeometry::Box {
            half_extents: reader.f32_array()?,
        },
        1 => ShapeGeometry::Sphere {
            radius: reader.f32()?,
        },
        2 => ShapeGeometry::Capsule {
            radius: reader.f32()?,
            half_height: reader.f32()?,
        },
        3 => ShapeGeometry::Cylinder {
            radius: reader.f32()?,
            half_height: reader.f32()?,
        },
        4 => ShapeGeometry::ConvexMesh {
            points: read_points(reader)?,
        },
        5 => {
            let points = read_points(reader)?;
            let count = reader.count(4)?;
            let indices = (0..count)
                .map(|_| reader.u32())
                .collect::<ParseResult<Vec<_>>>()?;
            ShapeGeometry::TriangleMesh { points, indices }
        }
        other => {
            return Err(ParseError::corrupted(at, format!("unknown shape type {other}")));
        }
    };

    let material = PhysicalMaterial {
        name: reader.string()?,
        friction: reader.f32()?,
        restitution: reader.f32()?,
        density: reader.f32()?,
    };

    Ok(CollisionShape {
        name,
        geometry,
        transform,
        material,
    })
}

fn write_shape(w: &mut PayloadWriter, shape: &CollisionShape) {
    w.u8(shape.geometry.type_code())
        .string(&shape.name)
        .f32s(&shape.transform.position)
        .f32s(&shape.transform.rotation);

    match &shape.geometry {
        ShapeGeometry::Box { half_extents } => {
            w.f32s(half_extents);
        }
        ShapeGeometry::Sphere { radius } => {
            w.f32(*radius);
        }
        ShapeGeometry::Capsule {
            radius,
            half_height,
        }
        | ShapeGeometry::Cylinder {
            radius,
            half_height,
        } => {
            w.f32(*radius).f32(*half_height);
        }
        ShapeGeometry::ConvexMesh { points } => {
            w.u32(points.len() as u32);
            for p in points {
                w.f32s(p);
            }
        }
        ShapeGeometry::TriangleMesh { points, indices } => {
            w.u32(points.len() as u32);
            for p in points {
                w.f32s(p);
            }
            w.u32(indices.len() as u32);
            for &i in indices {
                w.u32(i);
            }
        }
    }

    w.string(&shape.material.name)
        .f32(shape.material.friction)
        .f32(shape.material.restitution)
        .f32(shape.material.density);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

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

    #[test]
    fn test_every_shape_type() {
        let record = PhysicsRecord {
            name: "crate".into(),
            shapes: vec![
                shape("b", ShapeGeometry::Box { half_extents: [1.0, 2.0, 3.0] }),
                shape("s", ShapeGeometry::Sphere { radius: 0.5 }),
                shape("c", ShapeGeometry::Capsule { radius: 0.5, half_height: 1.0 }),
                shape("y", ShapeGeometry::Cylinder { radius: 0.5, half_height: 1.0 }),
                shape("h", ShapeGeometry::ConvexMesh { points: vec![[0.0; 3], [1.0, 0.0, 0.0]] }),
                shape(
                    "t",
                    ShapeGeometry::TriangleMesh {
                        points: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                        indices: vec![0, 1, 2],
                    },
                ),
            ],
        };

        let container = Container::parse(Bytes::from(record.to_container().unwrap())).unwrap();
        let parsed = PhysicsRecord::from_container(&container, "crate").unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_unknown_shape_type() {
        let mut w = PayloadWriter::new();
        w.u32(1).u8(42).string("x").f32s(&[0.0; 7]).f32(1.0).string("m").f32s(&[0.0; 3]);
        let bytes = ContainerBuilder::new(AssetKind::Physics)
            .chunk(tags::PHYSICS_SHAPES, w.finish())
            .build()
            .unwrap();
        let container = Container::parse(Bytes::from(bytes)).unwrap();

        let err = PhysicsRecord::from_container(&container, "x").unwrap_err();
        let entry = container.require(tags::PHYSICS_SHAPES).unwrap();
        assert_eq!(err.offset(), Some(entry.offset as u64 + 4));
    }
}
