//! Brute-force reference implementation of [`CollisionWorld`].
//!
//! Every trace tests every body, which is plenty for debugging scenes and
//! tests. Larger scenes would plug in their own world behind the same trait.

use base::{
    geometry::Geometry,
    math::{Affine3A, Vec3},
    query::{
        BodyGeometry, BodyHandle, CollisionResponse, CollisionWorld, HitResult, MaterialId, Mobility, NetMode,
        ObjectChannel, ObjectQueryParams, QueryParams,
    },
};
use std::sync::atomic::{AtomicBool, Ordering};

/// A collision body of a [`MeshWorld`].
#[derive(Debug, Clone)]
pub struct Body {
    /// Name of the body, for logging.
    pub name: String,
    /// Complex collision geometry.
    pub geometry: Geometry,
    /// Simple collision geometry, used when traces don't ask for complex
    /// geometry. Falls back to the complex geometry when absent.
    pub simple: Option<Geometry>,
    /// Local to world transform.
    pub transform: Affine3A,
    /// Object channel of the body.
    pub channel: ObjectChannel,
    /// Mobility of the body.
    pub mobility: Mobility,
    /// Response of the body to traces.
    pub response: CollisionResponse,
    /// Physical material of the surface.
    pub material: Option<MaterialId>,
}

impl Body {
    /// Creates a static, blocking body on the world static channel.
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            name: name.into(),
            geometry,
            simple: None,
            transform: Affine3A::IDENTITY,
            channel: ObjectChannel::WorldStatic,
            mobility: Mobility::Static,
            response: CollisionResponse::Block,
            material: None,
        }
    }

    /// Geometry traced for the given query parameters.
    fn traced_geometry(&self, params: &QueryParams) -> &Geometry {
        match (&self.simple, params.trace_complex) {
            (Some(simple), false) => simple,
            _ => &self.geometry,
        }
    }
}

/// World made of a flat list of bodies.
#[derive(Debug)]
pub struct MeshWorld {
    map_name: Option<String>,
    net_mode: NetMode,
    bodies: Vec<Body>,
    valid: AtomicBool,
}

impl MeshWorld {
    /// Creates an empty standalone world for the given map.
    pub fn new(map_name: impl Into<String>) -> Self {
        Self {
            map_name: Some(map_name.into()),
            net_mode: NetMode::Standalone,
            bodies: Vec::new(),
            valid: AtomicBool::new(true),
        }
    }

    /// Sets the network role of the world.
    pub fn with_net_mode(mut self, net_mode: NetMode) -> Self {
        self.net_mode = net_mode;
        self
    }

    /// Adds a body and returns its handle.
    pub fn add_body(&mut self, body: Body) -> BodyHandle {
        self.bodies.push(body);
        BodyHandle(self.bodies.len() as u32 - 1)
    }

    /// Returns the body behind a handle.
    pub fn body(&self, handle: BodyHandle) -> Option<&Body> { self.bodies.get(handle.0 as usize) }

    /// All the bodies of the world.
    pub fn bodies(&self) -> &[Body] { &self.bodies }

    /// Marks the world as torn down. Queries still work, but drivers stop
    /// tracing it.
    pub fn invalidate(&self) { self.valid.store(false, Ordering::Release); }
}

impl CollisionWorld for MeshWorld {
    fn line_trace(
        &self,
        start: Vec3,
        end: Vec3,
        object_params: &ObjectQueryParams,
        params: &QueryParams,
    ) -> Option<HitResult> {
        let delta = end - start;
        let length = delta.length();
        if length <= 0.0 || !length.is_finite() {
            return None;
        }
        let dir = delta / length;

        let mut t_max = length;
        let mut closest = None;
        for (idx, body) in self.bodies.iter().enumerate() {
            if !object_params.accepts(body.channel)
                || !params.mobility.accepts(body.mobility)
                || !params.accepts_response(body.response)
            {
                continue;
            }
            let Some(hit) = body.traced_geometry(params).raycast(body.transform, start, dir, t_max) else {
                continue;
            };
            t_max = hit.t;
            closest = Some(HitResult {
                impact_point: hit.point,
                impact_normal: hit.normal,
                distance: hit.t,
                primitive_id: idx as u32,
                face_index: if params.return_face_index {
                    hit.face_index
                } else {
                    None
                },
                material: if params.return_physical_material {
                    body.material
                } else {
                    None
                },
                body: Some(BodyHandle(idx as u32)),
            });
        }
        closest
    }

    fn body_geometry(&self, body: BodyHandle) -> Option<BodyGeometry<'_>> {
        self.body(body).map(|b| BodyGeometry {
            geometry: &b.geometry,
            transform: b.transform,
        })
    }

    fn is_valid(&self) -> bool { self.valid.load(Ordering::Acquire) }

    fn map_name(&self) -> Option<String> { self.map_name.clone() }

    fn net_mode(&self) -> NetMode { self.net_mode }
}
