//! Collision geometry of the bodies the tracer queries.
//!
//! Geometry is a closed set of shapes. Triangle meshes may be wrapped in a
//! scale, shared between instances, or grouped in unions; the helpers here
//! unwrap them down to the leaf meshes.

use crate::{
    isect::{ray_box_intersect, ray_sphere_intersect, ray_tri_intersect_moller_trumbore, Ray},
    math::{transform_normal, Affine3A, Vec3},
    Error,
};
use std::sync::Arc;

/// Triangle index storage. Meshes with few vertices use 16-bit indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriangleIndices {
    /// 16-bit indices.
    Small(Vec<[u16; 3]>),
    /// 32-bit indices.
    Large(Vec<[u32; 3]>),
}

impl TriangleIndices {
    /// Number of triangles.
    pub fn len(&self) -> usize {
        match self {
            TriangleIndices::Small(indices) => indices.len(),
            TriangleIndices::Large(indices) => indices.len(),
        }
    }

    /// Whether there are no triangles.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Vertex indices of the triangle `face`.
    pub fn get(&self, face: usize) -> Option<[u32; 3]> {
        match self {
            TriangleIndices::Small(indices) => indices.get(face).map(|t| t.map(u32::from)),
            TriangleIndices::Large(indices) => indices.get(face).copied(),
        }
    }
}

/// Hit of a ray against a triangle mesh, in the space the ray was given in.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MeshHit {
    /// Ray parameter of the hit.
    pub t: f32,
    /// Hit position.
    pub point: Vec3,
    /// Geometric normal of the hit triangle.
    pub normal: Vec3,
    /// Index of the hit triangle.
    pub face_index: u32,
}

/// Indexed triangle mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    vertices: Vec<Vec3>,
    indices: TriangleIndices,
}

impl TriangleMesh {
    /// Creates a mesh, validating that every index refers to an existing
    /// vertex.
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Result<Self, Error> {
        for (face, tri) in triangles.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertices.len()) {
                return Err(Error::InvalidTriangleIndex {
                    face,
                    index,
                    count: vertices.len(),
                });
            }
        }
        let indices = if vertices.len() <= u16::MAX as usize + 1 {
            TriangleIndices::Small(triangles.iter().map(|t| t.map(|i| i as u16)).collect())
        } else {
            TriangleIndices::Large(triangles)
        };
        Ok(Self { vertices, indices })
    }

    /// Creates a flat grid in the XY plane, centred on the origin, facing
    /// `+Z`.
    ///
    /// # Arguments
    ///
    /// * `size` - Extent of the grid along X and Y.
    /// * `cells` - Number of cells along X and Y, each split into two
    ///   triangles.
    pub fn grid(size: [f32; 2], cells: [u32; 2]) -> Self {
        let [cx, cy] = cells.map(|c| c.max(1));
        let mut vertices = Vec::with_capacity(((cx + 1) * (cy + 1)) as usize);
        for j in 0..=cy {
            for i in 0..=cx {
                vertices.push(Vec3::new(
                    (i as f32 / cx as f32 - 0.5) * size[0],
                    (j as f32 / cy as f32 - 0.5) * size[1],
                    0.0,
                ));
            }
        }
        let mut triangles = Vec::with_capacity((cx * cy * 2) as usize);
        for j in 0..cy {
            for i in 0..cx {
                let v0 = j * (cx + 1) + i;
                let v1 = v0 + 1;
                let v2 = v0 + cx + 1;
                let v3 = v2 + 1;
                triangles.push([v0, v1, v3]);
                triangles.push([v0, v3, v2]);
            }
        }
        let indices = if vertices.len() <= u16::MAX as usize + 1 {
            TriangleIndices::Small(triangles.iter().map(|t| t.map(|i| i as u16)).collect())
        } else {
            TriangleIndices::Large(triangles)
        };
        Self { vertices, indices }
    }

    /// Vertex positions.
    pub fn vertices(&self) -> &[Vec3] { &self.vertices }

    /// Triangle indices.
    pub fn indices(&self) -> &TriangleIndices { &self.indices }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize { self.indices.len() }

    /// Positions of the vertices of the triangle `face`.
    pub fn triangle(&self, face: u32) -> Option<[Vec3; 3]> {
        self.indices
            .get(face as usize)
            .map(|tri| tri.map(|i| self.vertices[i as usize]))
    }

    /// Finds the closest triangle hit by the ray within `(0, t_max]`.
    pub fn raycast(&self, org: Vec3, dir: Vec3, t_max: f32) -> Option<MeshHit> {
        let ray = Ray::new(org, dir);
        let mut closest: Option<MeshHit> = None;
        let mut t_max = t_max;
        for face in 0..self.num_triangles() as u32 {
            let Some(triangle) = self.triangle(face) else {
                continue;
            };
            if let Some(isect) = ray_tri_intersect_moller_trumbore(&ray, &triangle, t_max) {
                t_max = isect.t;
                closest = Some(MeshHit {
                    t: isect.t,
                    point: isect.p,
                    normal: isect.n,
                    face_index: face,
                });
            }
        }
        closest
    }
}

/// Child of a [`Geometry::Union`], placed relative to its parent.
#[derive(Debug, Clone)]
pub struct UnionChild {
    /// Child to parent transform.
    pub transform: Affine3A,
    /// The child geometry.
    pub geometry: Geometry,
}

/// Collision geometry.
#[derive(Debug, Clone)]
pub enum Geometry {
    /// A triangle mesh.
    TriangleMesh(Arc<TriangleMesh>),
    /// A triangle mesh with a local scale applied.
    Scaled {
        /// The wrapped mesh.
        mesh: Arc<TriangleMesh>,
        /// Scale applied to the mesh vertices.
        scale: Vec3,
    },
    /// A triangle mesh shared with other bodies.
    Instanced(Arc<TriangleMesh>),
    /// A group of geometries.
    Union(Vec<UnionChild>),
    /// A sphere centred on the origin.
    Sphere {
        /// Radius of the sphere.
        radius: f32,
    },
    /// An axis aligned box centred on the origin.
    Box {
        /// Half size along each axis.
        half_extents: Vec3,
    },
}

/// Hit of a world-space ray against a [`Geometry`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeometryHit {
    /// Distance along the ray.
    pub t: f32,
    /// World-space hit position.
    pub point: Vec3,
    /// World-space normal, normalised.
    pub normal: Vec3,
    /// Index of the hit triangle for mesh geometry.
    pub face_index: Option<u32>,
}

impl Geometry {
    /// Whether the geometry contains triangle meshes the triangle density
    /// mode can inspect.
    pub fn is_mesh_like(&self) -> bool {
        matches!(
            self,
            Geometry::TriangleMesh(_)
                | Geometry::Scaled { .. }
                | Geometry::Instanced(_)
                | Geometry::Union(_)
        )
    }

    /// Calls `f` for every triangle mesh leaf with its local to world
    /// transform.
    ///
    /// Scaled meshes are reported with the scale folded into the transform,
    /// instanced meshes with the transform of the instance, and union
    /// children with their relative transform applied. Analytic shapes are
    /// skipped.
    pub fn visit_leaf_meshes<F>(&self, transform: Affine3A, f: &mut F)
    where
        F: FnMut(&TriangleMesh, Affine3A),
    {
        match self {
            Geometry::TriangleMesh(mesh) | Geometry::Instanced(mesh) => f(mesh.as_ref(), transform),
            Geometry::Scaled { mesh, scale } => f(mesh.as_ref(), transform * Affine3A::from_scale(*scale)),
            Geometry::Union(children) => {
                for child in children {
                    child.geometry.visit_leaf_meshes(transform * child.transform, f);
                }
            },
            Geometry::Sphere { .. } | Geometry::Box { .. } => {},
        }
    }

    /// Intersects a world-space ray with the geometry placed by `transform`.
    ///
    /// # Arguments
    ///
    /// * `transform` - Local to world transform of the geometry.
    /// * `org` - World-space ray origin.
    /// * `dir` - World-space ray direction, normalised.
    /// * `t_max` - Largest accepted distance.
    pub fn raycast(&self, transform: Affine3A, org: Vec3, dir: Vec3, t_max: f32) -> Option<GeometryHit> {
        match self {
            Geometry::TriangleMesh(mesh) | Geometry::Instanced(mesh) => {
                raycast_mesh(mesh, transform, org, dir, t_max)
            },
            Geometry::Scaled { mesh, scale } => {
                raycast_mesh(mesh, transform * Affine3A::from_scale(*scale), org, dir, t_max)
            },
            Geometry::Union(children) => {
                let mut closest: Option<GeometryHit> = None;
                let mut t_max = t_max;
                for child in children {
                    if let Some(hit) = child.geometry.raycast(transform * child.transform, org, dir, t_max) {
                        t_max = hit.t;
                        closest = Some(hit);
                    }
                }
                closest
            },
            Geometry::Sphere { radius } => {
                let local = to_local_ray(&transform, org, dir);
                ray_sphere_intersect(&local, *radius, t_max).map(|isect| GeometryHit {
                    t: isect.t,
                    point: org + dir * isect.t,
                    normal: transform_normal(&transform, isect.n),
                    face_index: None,
                })
            },
            Geometry::Box { half_extents } => {
                let local = to_local_ray(&transform, org, dir);
                ray_box_intersect(&local, *half_extents, t_max).map(|isect| GeometryHit {
                    t: isect.t,
                    point: org + dir * isect.t,
                    normal: transform_normal(&transform, isect.n),
                    face_index: None,
                })
            },
        }
    }
}

/// Brings a world-space ray into the local space of `transform`, keeping the
/// ray parameter unchanged.
fn to_local_ray(transform: &Affine3A, org: Vec3, dir: Vec3) -> Ray {
    let inv = transform.inverse();
    Ray::new(inv.transform_point3(org), inv.transform_vector3(dir))
}

fn raycast_mesh(mesh: &TriangleMesh, transform: Affine3A, org: Vec3, dir: Vec3, t_max: f32) -> Option<GeometryHit> {
    let local = to_local_ray(&transform, org, dir);
    mesh.raycast(local.org, local.dir, t_max).map(|hit| GeometryHit {
        t: hit.t,
        point: org + dir * hit.t,
        normal: transform_normal(&transform, hit.normal),
        face_index: Some(hit.face_index),
    })
}
