//! Bounding computations over part subsets.
//!
//! Nothing here mutates a mesh in place: every transformation returns new parts.

use nalgebra::{Point3, Vector3};
use thiserror::Error;

use crate::part::{Face, Mesh, PartName, PlacedPart, Vertex};

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("part {part}: face {face} has {len} vertices, expected at least 3")]
    FaceArity { part: String, face: usize, len: usize },
    #[error("part {part}: face {face} references vertex {index}, part has {count}")]
    VertexIndex {
        part: String,
        face: usize,
        index: u32,
        count: usize,
    },
}

/// Axis-aligned bounds of a set of vertices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Bounds {
    /// Bounds over every vertex of the given parts, `None` when there are no vertices.
    pub fn of<'a>(parts: impl IntoIterator<Item = &'a PlacedPart>) -> Option<Bounds> {
        let mut out: Option<Bounds> = None;
        for v in parts.into_iter().flat_map(|p| p.mesh.vertices.iter()) {
            let p = v.position();
            out = Some(match out {
                None => Bounds { min: p, max: p },
                Some(b) => Bounds {
                    min: b.min.inf(&p),
                    max: b.max.sup(&p),
                },
            });
        }
        out
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }
}

/// Minimum x/y/z over the subset; the origin when the subset holds no vertices.
pub fn min_corner<'a>(parts: impl IntoIterator<Item = &'a PlacedPart>) -> Point3<f64> {
    Bounds::of(parts).map(|b| b.min).unwrap_or_else(Point3::origin)
}

/// Translate copies of `parts` so the subset's minimum corner sits at the origin.
pub fn normalized(parts: &[&PlacedPart]) -> Vec<PlacedPart> {
    let min = min_corner(parts.iter().copied());
    let shift = -min.coords;
    parts.iter().map(|p| translated(p, shift)).collect()
}

pub fn translated(part: &PlacedPart, by: Vector3<f64>) -> PlacedPart {
    let mut out = part.clone();
    for v in &mut out.mesh.vertices {
        v.x += by.x;
        v.y += by.y;
        v.z += by.z;
    }
    out
}

impl Vertex {
    pub fn position(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }
}

impl Mesh {
    /// Every face index must address a vertex of this same mesh.
    pub fn validate(&self, part: &PartName) -> Result<(), GeometryError> {
        let count = self.vertices.len();
        for (fi, face) in self.faces.iter().enumerate() {
            if face.vertices.len() < 3 {
                return Err(GeometryError::FaceArity {
                    part: part.to_string(),
                    face: fi,
                    len: face.vertices.len(),
                });
            }
            if let Some(&index) = face.vertices.iter().find(|&&i| i as usize >= count) {
                return Err(GeometryError::VertexIndex {
                    part: part.to_string(),
                    face: fi,
                    index,
                    count,
                });
            }
        }
        Ok(())
    }

    /// Axis-aligned box with quad faces, the shape placement produces for boards and legs.
    pub fn cuboid(origin: [f64; 3], size: [f64; 3]) -> Mesh {
        let [ox, oy, oz] = origin;
        let [sx, sy, sz] = size;
        let corners = [
            (ox, oy, oz),
            (ox + sx, oy, oz),
            (ox + sx, oy + sy, oz),
            (ox, oy + sy, oz),
            (ox, oy, oz + sz),
            (ox + sx, oy, oz + sz),
            (ox + sx, oy + sy, oz + sz),
            (ox, oy + sy, oz + sz),
        ];
        let vertices = corners
            .iter()
            .enumerate()
            .map(|(i, &(x, y, z))| Vertex {
                id: i as u32,
                x,
                y,
                z,
            })
            .collect();
        let faces = [
            ("bottom", [0, 3, 2, 1]),
            ("top", [4, 5, 6, 7]),
            ("front", [0, 1, 5, 4]),
            ("back", [2, 3, 7, 6]),
            ("left", [0, 4, 7, 3]),
            ("right", [1, 2, 6, 5]),
        ]
        .into_iter()
        .map(|(name, idx)| Face {
            name: name.to_string(),
            vertices: idx.to_vec(),
        })
        .collect();
        Mesh { vertices, faces }
    }
}
