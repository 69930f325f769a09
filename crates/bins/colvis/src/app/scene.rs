//! Scene descriptions traced by the command line application.
//!
//! A scene is a TOML file listing collision bodies and named viewpoints:
//!
//! ```toml
//! map_name = "/Game/Maps/Arena"
//!
//! [[bodies]]
//! name = "ground"
//! shape = { kind = "grid", size = [4000.0, 4000.0], cells = [32, 32] }
//!
//! [[bodies]]
//! name = "statue"
//! shape = { kind = "obj", path = "statue.obj" }
//! simple = { kind = "box", half_extents = [50.0, 50.0, 150.0] }
//! transform = { translation = [600.0, 0.0, 0.0] }
//!
//! [[viewpoints]]
//! origin = [-800.0, 0.0, 300.0]
//! rotation = { pitch = -15.0 }
//! ```

use crate::app::ColvisError;
use base::{
    geometry::{Geometry, TriangleMesh, UnionChild},
    math::{Affine3A, Vec3},
    query::{CollisionResponse, MaterialId, Mobility, NetMode, ObjectChannel},
    view::ViewRotation,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use trace::world::{Body, MeshWorld};

/// Scene used when none is given.
pub const DEMO_SCENE: &str = r#"
map_name = "/Game/Maps/Demo"

[[bodies]]
name = "ground"
shape = { kind = "grid", size = [4000.0, 4000.0], cells = [32, 32] }
simple = { kind = "box", half_extents = [2000.0, 2000.0, 1.0] }
material = 1

[[bodies]]
name = "boulder"
shape = { kind = "sphere", radius = 150.0 }
transform = { translation = [400.0, -300.0, 150.0] }
material = 2

[[bodies]]
name = "crate"
shape = { kind = "box", half_extents = [80.0, 80.0, 80.0] }
transform = { translation = [500.0, 250.0, 80.0], rotation = { yaw = 30.0 } }
channel = "physics-body"
mobility = "movable"
material = 3

[[bodies]]
name = "gate"
transform = { translation = [900.0, 0.0, 0.0] }
material = 4
[bodies.shape]
kind = "union"
children = [
    { shape = { kind = "box", half_extents = [40.0, 40.0, 200.0] }, transform = { translation = [0.0, -250.0, 200.0] } },
    { shape = { kind = "box", half_extents = [40.0, 40.0, 200.0] }, transform = { translation = [0.0, 250.0, 200.0] } },
    { shape = { kind = "box", half_extents = [40.0, 290.0, 40.0] }, transform = { translation = [0.0, 0.0, 440.0] } },
]

[[bodies]]
name = "billboard"
shape = { kind = "grid", size = [600.0, 300.0], cells = [48, 24] }
transform = { translation = [1400.0, 0.0, 350.0], rotation = { pitch = 90.0 } }

[[bodies]]
name = "trigger"
shape = { kind = "sphere", radius = 120.0 }
transform = { translation = [300.0, 300.0, 200.0] }
channel = "visibility"
response = "overlap"

[[viewpoints]]
origin = [-800.0, 0.0, 300.0]
rotation = { pitch = -10.0 }

[[viewpoints]]
origin = [500.0, -1200.0, 500.0]
rotation = { pitch = -20.0, yaw = 90.0 }

[[viewpoints]]
origin = [0.0, 0.0, 200.0]
"#;

/// Description of a scene.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDesc {
    /// Name of the map, the output files are named after its last segment.
    pub map_name: String,
    /// Network role of the world.
    pub net_mode: NetMode,
    /// Collision bodies.
    pub bodies: Vec<BodyDesc>,
    /// Places to trace from.
    pub viewpoints: Viewpoints,
}

/// Description of a collision body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyDesc {
    /// Name of the body.
    pub name: String,
    /// Complex collision shape.
    pub shape: ShapeDesc,
    /// Simple collision shape.
    #[serde(default)]
    pub simple: Option<ShapeDesc>,
    /// Placement of the body.
    #[serde(default)]
    pub transform: TransformDesc,
    /// Object channel of the body.
    #[serde(default = "default_channel")]
    pub channel: ObjectChannel,
    /// Mobility of the body.
    #[serde(default)]
    pub mobility: Mobility,
    /// Response of the body to traces.
    #[serde(default)]
    pub response: CollisionResponse,
    /// Physical material of the body.
    #[serde(default)]
    pub material: Option<u32>,
}

fn default_channel() -> ObjectChannel { ObjectChannel::WorldStatic }

/// Description of a collision shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ShapeDesc {
    /// Sphere centred on the origin.
    Sphere {
        /// Radius of the sphere.
        radius: f32,
    },
    /// Box centred on the origin.
    Box {
        /// Half size of the box along each axis.
        half_extents: Vec3,
    },
    /// Flat triangle grid in the XY plane.
    Grid {
        /// Extent along X and Y.
        size: [f32; 2],
        /// Number of cells along X and Y.
        cells: [u32; 2],
    },
    /// Triangle mesh loaded from a Wavefront OBJ file.
    Obj {
        /// Path of the file, relative to the scene file.
        path: PathBuf,
        /// Scale applied to the mesh.
        #[serde(default)]
        scale: Option<Vec3>,
    },
    /// Group of shapes.
    Union {
        /// Children of the group.
        children: Vec<ChildDesc>,
    },
}

/// Child of a [`ShapeDesc::Union`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildDesc {
    /// Shape of the child.
    pub shape: ShapeDesc,
    /// Child to parent transform.
    #[serde(default)]
    pub transform: TransformDesc,
}

/// Scale, rotation and translation, applied in this order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformDesc {
    /// Translation.
    pub translation: Vec3,
    /// Rotation in degrees.
    pub rotation: ViewRotation,
    /// Scale.
    pub scale: Vec3,
}

impl Default for TransformDesc {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: ViewRotation::default(),
            scale: Vec3::ONE,
        }
    }
}

impl TransformDesc {
    /// Converts the description into an affine transform.
    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation.to_quat(), self.translation)
    }
}

/// A place to trace from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    /// Position of the viewer.
    pub origin: Vec3,
    /// Orientation of the viewer.
    #[serde(default)]
    pub rotation: ViewRotation,
}

/// Viewpoints of a scene, addressed by index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Viewpoints(pub Vec<Viewpoint>);

impl Viewpoints {
    /// Resolves the viewpoint at `index`.
    ///
    /// A negative index keeps the default viewpoint. An index past the end
    /// falls back to the last viewpoint, then to the first one, then to the
    /// default one; every fallback is logged.
    pub fn resolve(&self, index: i32) -> Viewpoint {
        if index < 0 {
            return Viewpoint::default();
        }
        let mut index = index as usize;
        if index >= self.0.len() {
            let last = self.0.len().saturating_sub(1);
            log::warn!("Unable to resolve viewpoint {}, trying to use {}", index, last);
            index = last;
        }
        let viewpoint = self.0.get(index).or_else(|| {
            log::warn!("Couldn't resolve viewpoint {}, trying to use the first one", index);
            self.0.first()
        });
        match viewpoint {
            Some(viewpoint) => *viewpoint,
            None => {
                log::warn!("No viewpoint was resolved, tracing from the origin");
                Viewpoint::default()
            },
        }
    }
}

/// Triangle meshes already loaded, keyed by path.
#[derive(Debug, Default)]
struct MeshCache {
    meshes: HashMap<PathBuf, Arc<TriangleMesh>>,
}

impl MeshCache {
    /// Returns the geometry of the mesh at `path`; meshes loaded more than
    /// once are instanced.
    fn geometry(&mut self, path: &Path, scale: Option<Vec3>) -> Result<Geometry, ColvisError> {
        let (mesh, instanced) = match self.meshes.get(path) {
            Some(mesh) => (mesh.clone(), true),
            None => {
                let mesh = Arc::new(load_obj(path)?);
                self.meshes.insert(path.to_path_buf(), mesh.clone());
                (mesh, false)
            },
        };
        Ok(match scale {
            Some(scale) => Geometry::Scaled { mesh, scale },
            None if instanced => Geometry::Instanced(mesh),
            None => Geometry::TriangleMesh(mesh),
        })
    }
}

/// Loads every model of a Wavefront OBJ file into a single mesh.
fn load_obj(path: &Path) -> Result<TriangleMesh, ColvisError> {
    let (models, _) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS).map_err(|err| {
        ColvisError::new(
            format!("Failed to read Wavefront file {}", path.display()),
            Some(Box::new(err)),
        )
    })?;
    let mut vertices = Vec::new();
    let mut triangles = Vec::new();
    for model in &models {
        let offset = vertices.len() as u32;
        vertices.extend(
            model
                .mesh
                .positions
                .chunks_exact(3)
                .map(|p| Vec3::new(p[0], p[1], p[2])),
        );
        triangles.extend(
            model
                .mesh
                .indices
                .chunks_exact(3)
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );
    }
    log::debug!(
        "Loaded {}: {} models, {} vertices, {} triangles",
        path.display(),
        models.len(),
        vertices.len(),
        triangles.len()
    );
    TriangleMesh::new(vertices, triangles)
        .map_err(|err| ColvisError::from_base_error(err, format!("Invalid mesh in {}", path.display())))
}

impl ShapeDesc {
    fn build(&self, meshes: &mut MeshCache) -> Result<Geometry, ColvisError> {
        Ok(match self {
            ShapeDesc::Sphere { radius } => Geometry::Sphere { radius: *radius },
            ShapeDesc::Box { half_extents } => Geometry::Box {
                half_extents: *half_extents,
            },
            ShapeDesc::Grid { size, cells } => Geometry::TriangleMesh(Arc::new(TriangleMesh::grid(*size, *cells))),
            ShapeDesc::Obj { path, scale } => meshes.geometry(path, *scale)?,
            ShapeDesc::Union { children } => Geometry::Union(
                children
                    .iter()
                    .map(|child| {
                        Ok(UnionChild {
                            transform: child.transform.to_affine(),
                            geometry: child.shape.build(meshes)?,
                        })
                    })
                    .collect::<Result<_, ColvisError>>()?,
            ),
        })
    }

    fn resolve_paths(&mut self, base: &Path) {
        match self {
            ShapeDesc::Obj { path, .. } => *path = crate::app::config::resolve_path(base, path),
            ShapeDesc::Union { children } => children.iter_mut().for_each(|child| child.shape.resolve_paths(base)),
            _ => {},
        }
    }
}

impl SceneDesc {
    /// Parses a scene from a TOML string.
    pub fn parse(string: &str) -> Result<Self, toml::de::Error> { toml::from_str(string) }

    /// Built-in demo scene.
    pub fn demo() -> Result<Self, ColvisError> {
        Self::parse(DEMO_SCENE)
            .map_err(|err| ColvisError::new("Failed to parse the demo scene", Some(Box::new(err))))
    }

    /// Loads a scene from a TOML file. Mesh paths are resolved against the
    /// directory of the file.
    pub fn load(path: &Path) -> Result<Self, ColvisError> {
        log::info!("Loading scene {}", path.display());
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let string = std::fs::read_to_string(path).map_err(|err| {
            ColvisError::from_io_error(err, format!("Failed to read scene file: {}", path.display()))
        })?;
        let mut scene = Self::parse(&string).map_err(|err| {
            ColvisError::new(
                format!("Failed to parse scene file: {}", path.display()),
                Some(Box::new(err)),
            )
        })?;
        for body in &mut scene.bodies {
            body.shape.resolve_paths(base);
            if let Some(simple) = &mut body.simple {
                simple.resolve_paths(base);
            }
        }
        Ok(scene)
    }

    /// Loads the scene at `path`, or the demo scene.
    pub fn load_or_demo(path: Option<&Path>) -> Result<Self, ColvisError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                log::info!("No scene given, using the demo scene");
                Self::demo()
            },
        }
    }

    /// Builds the collision world of the scene.
    pub fn build(&self) -> Result<MeshWorld, ColvisError> {
        let mut world = MeshWorld::new(self.map_name.as_str()).with_net_mode(self.net_mode);
        let mut meshes = MeshCache::default();
        for desc in &self.bodies {
            let mut body = Body::new(desc.name.as_str(), desc.shape.build(&mut meshes)?);
            body.simple = desc.simple.as_ref().map(|simple| simple.build(&mut meshes)).transpose()?;
            body.transform = desc.transform.to_affine();
            body.channel = desc.channel;
            body.mobility = desc.mobility;
            body.response = desc.response;
            body.material = desc.material.map(MaterialId);
            log::debug!("    - body {}: {:?}", desc.name, desc.channel);
            world.add_body(body);
        }
        log::info!("Scene {} built with {} bodies", self.map_name, self.bodies.len());
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::query::{CollisionWorld, ObjectQueryParams, QueryParams};

    #[test]
    fn demo_scene_builds() {
        let scene = SceneDesc::demo().unwrap();
        assert_eq!(scene.bodies.len(), 6);
        assert_eq!(scene.viewpoints.0.len(), 3);
        let world = scene.build().unwrap();
        assert_eq!(world.map_name().as_deref(), Some("/Game/Maps/Demo"));
        assert_eq!(world.bodies().len(), 6);
        assert!(world.bodies()[3].geometry.is_mesh_like());
        assert_eq!(world.bodies()[5].response, CollisionResponse::Overlap);

        // Straight down onto the ground.
        let hit = world
            .line_trace(
                Vec3::new(-1000.0, 10.0, 100.0),
                Vec3::new(-1000.0, 10.0, -100.0),
                &ObjectQueryParams::default(),
                &QueryParams::default(),
            )
            .unwrap();
        assert!((hit.distance - 100.0).abs() < 1e-3);
        assert!(hit.impact_normal.z.abs() > 0.99);
    }

    #[test]
    fn shapes_and_defaults_parse() {
        let scene = SceneDesc::parse(
            r#"
            [[bodies]]
            name = "rock"
            shape = { kind = "sphere", radius = 2.0 }
            "#,
        )
        .unwrap();
        let body = &scene.bodies[0];
        assert_eq!(body.channel, ObjectChannel::WorldStatic);
        assert_eq!(body.mobility, Mobility::Static);
        assert_eq!(body.transform, TransformDesc::default());
        assert!(body.simple.is_none());
        assert_eq!(scene.net_mode, NetMode::Standalone);
        assert!(scene.viewpoints.0.is_empty());

        assert!(SceneDesc::parse(
            r#"
            [[bodies]]
            name = "rock"
            shape = { kind = "cone", radius = 2.0 }
            "#
        )
        .is_err());
    }

    #[test]
    fn transform_applies_scale_then_rotation_then_translation() {
        let transform = TransformDesc {
            translation: Vec3::new(10.0, 0.0, 0.0),
            rotation: ViewRotation::new(0.0, 90.0, 0.0),
            scale: Vec3::splat(2.0),
        }
        .to_affine();
        let p = transform.transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(10.0, 2.0, 0.0), 1e-5), "{}", p);
    }

    #[test]
    fn viewpoint_fallbacks() {
        let a = Viewpoint {
            origin: Vec3::X,
            rotation: ViewRotation::default(),
        };
        let b = Viewpoint {
            origin: Vec3::Y,
            rotation: ViewRotation::new(0.0, 45.0, 0.0),
        };
        let viewpoints = Viewpoints(vec![a, b]);
        assert_eq!(viewpoints.resolve(0), a);
        assert_eq!(viewpoints.resolve(1), b);
        assert_eq!(viewpoints.resolve(7), b);
        assert_eq!(viewpoints.resolve(-1), Viewpoint::default());
        assert_eq!(Viewpoints::default().resolve(3), Viewpoint::default());
    }

    #[test]
    fn obj_meshes_are_loaded_and_instanced() {
        let dir = std::env::temp_dir().join(format!("colvis-scene-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("quad.obj"),
            "v -1 -1 0\nv 1 -1 0\nv 1 1 0\nv -1 1 0\nf 1 2 3\nf 1 3 4\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("scene.toml"),
            r#"
            [[bodies]]
            name = "a"
            shape = { kind = "obj", path = "quad.obj" }

            [[bodies]]
            name = "b"
            shape = { kind = "obj", path = "quad.obj" }

            [[bodies]]
            name = "c"
            shape = { kind = "obj", path = "quad.obj", scale = [2.0, 2.0, 1.0] }
            "#,
        )
        .unwrap();

        let scene = SceneDesc::load(&dir.join("scene.toml")).unwrap();
        let world = scene.build().unwrap();
        let bodies = world.bodies();
        match &bodies[0].geometry {
            Geometry::TriangleMesh(mesh) => assert_eq!(mesh.num_triangles(), 2),
            other => panic!("unexpected geometry {:?}", other),
        }
        assert!(matches!(bodies[1].geometry, Geometry::Instanced(_)));
        assert!(matches!(bodies[2].geometry, Geometry::Scaled { .. }));

        assert!(SceneDesc::parse("[[bodies]]\nname = \"x\"\nshape = { kind = \"obj\", path = \"missing.obj\" }")
            .unwrap()
            .build()
            .is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
