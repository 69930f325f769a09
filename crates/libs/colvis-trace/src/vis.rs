//! Visualisation modes.
//!
//! Each mode is a zero-sized tag implementing [`VisMode`], so that the trace
//! kernels get one specialised copy per mode instead of branching on the
//! mode for every pixel.

use base::{
    color::{facing_ratio, greyscale, heatmap, quantise, random_colour, unresolved_geometry, Rgba8},
    math::{Affine3A, Vec3},
    query::{BodyGeometry, CollisionWorld, HitResult},
    settings::VisualisationType,
};

/// Length of the local probe re-casting the hit triangle in the triangle
/// density mode.
pub const DENSITY_PROBE_LENGTH: f32 = 10.0;

/// Per-pixel inputs of the colour computation besides the hit itself.
#[derive(Debug)]
pub struct ShadeInputs<'a, W: ?Sized> {
    /// World the ray was traced in.
    pub world: &'a W,
    /// Normalised direction of the traced ray.
    pub trace_dir: Vec3,
    /// Direction pointing from the scene back towards the viewer.
    pub rev_view_forward: Vec3,
    /// Normalised query time in `[0, 1]`, 0 when not measured.
    pub timer: f32,
    /// Twice the triangle area mapped to red.
    pub density_min_area2: f32,
    /// `1 / (max_area2 - min_area2)`.
    pub density_mul: f32,
}

/// A visualisation mode known at compile time.
pub trait VisMode: Send + Sync + 'static {
    /// The runtime value this mode corresponds to.
    const KIND: VisualisationType;

    /// Whether each query has to be timed.
    const USES_TIMER: bool = false;

    /// Colour of a ray that hit nothing.
    fn on_miss<W: CollisionWorld + ?Sized>(_inputs: &ShadeInputs<'_, W>) -> Rgba8 { Rgba8::BLACK }

    /// Colour of a ray that hit something.
    ///
    /// `facing` is the clamped facing ratio between the ray and the hit
    /// normal.
    fn on_hit<W: CollisionWorld + ?Sized>(hit: &HitResult, facing: f32, inputs: &ShadeInputs<'_, W>) -> Rgba8;
}

/// Colours a trace result with the mode `V`.
#[inline]
pub fn visualise<V: VisMode, W: CollisionWorld + ?Sized>(hit: Option<&HitResult>, inputs: &ShadeInputs<'_, W>) -> Rgba8 {
    match hit {
        Some(hit) => V::on_hit(hit, facing_ratio(inputs.trace_dir, hit.impact_normal), inputs),
        None => V::on_miss(inputs),
    }
}

/// Facing ratio in red, view alignment in green, their magnitude in blue.
#[derive(Debug, Copy, Clone, Default)]
pub struct Facing;

impl VisMode for Facing {
    const KIND: VisualisationType = VisualisationType::Default;

    fn on_hit<W: CollisionWorld + ?Sized>(hit: &HitResult, facing: f32, inputs: &ShadeInputs<'_, W>) -> Rgba8 {
        let r = facing;
        let g = inputs.rev_view_forward.dot(hit.impact_normal).clamp(0.0, 1.0);
        let b = (r * r + g * g).sqrt().min(1.0);
        Rgba8::opaque(quantise(r), quantise(g), quantise(b))
    }
}

/// Random colour per primitive, shaded by the facing ratio.
#[derive(Debug, Copy, Clone, Default)]
pub struct Primitive;

impl VisMode for Primitive {
    const KIND: VisualisationType = VisualisationType::Primitive;

    fn on_hit<W: CollisionWorld + ?Sized>(hit: &HitResult, facing: f32, _inputs: &ShadeInputs<'_, W>) -> Rgba8 {
        random_colour([hit.primitive_id, 0, 0], facing)
    }
}

/// Random colour per triangle, unshaded so neighbouring triangles stay
/// distinguishable.
#[derive(Debug, Copy, Clone, Default)]
pub struct Triangles;

impl VisMode for Triangles {
    const KIND: VisualisationType = VisualisationType::Triangles;

    fn on_hit<W: CollisionWorld + ?Sized>(hit: &HitResult, _facing: f32, _inputs: &ShadeInputs<'_, W>) -> Rgba8 {
        random_colour([hit.face_index.unwrap_or(u32::MAX), hit.primitive_id, 0], 1.0)
    }
}

/// Random colour per physical material, shaded by the facing ratio.
#[derive(Debug, Copy, Clone, Default)]
pub struct Material;

impl VisMode for Material {
    const KIND: VisualisationType = VisualisationType::Material;

    fn on_hit<W: CollisionWorld + ?Sized>(hit: &HitResult, facing: f32, _inputs: &ShadeInputs<'_, W>) -> Rgba8 {
        let material = hit.material.map_or(0, |m| m.0);
        random_colour([material, 0, 0], facing)
    }
}

/// Heatmap of the query time of rays that hit something.
#[derive(Debug, Copy, Clone, Default)]
pub struct RayTime;

impl VisMode for RayTime {
    const KIND: VisualisationType = VisualisationType::RayTime;
    const USES_TIMER: bool = true;

    fn on_hit<W: CollisionWorld + ?Sized>(_hit: &HitResult, _facing: f32, inputs: &ShadeInputs<'_, W>) -> Rgba8 {
        heatmap(inputs.timer, 1.0)
    }
}

/// Heatmap of the query time of every ray.
#[derive(Debug, Copy, Clone, Default)]
pub struct RayTimeEvenMiss;

impl VisMode for RayTimeEvenMiss {
    const KIND: VisualisationType = VisualisationType::RayTimeEvenMiss;
    const USES_TIMER: bool = true;

    fn on_miss<W: CollisionWorld + ?Sized>(inputs: &ShadeInputs<'_, W>) -> Rgba8 { heatmap(inputs.timer, 1.0) }

    fn on_hit<W: CollisionWorld + ?Sized>(_hit: &HitResult, _facing: f32, inputs: &ShadeInputs<'_, W>) -> Rgba8 {
        heatmap(inputs.timer, 1.0)
    }
}

/// Heatmap of the area of the hit triangle: small triangles are red, large
/// ones green.
///
/// Hits without a body or on analytic geometry are shaded in grey; bodies
/// with triangle meshes where no triangle could be found again are shaded
/// with [`unresolved_geometry`].
#[derive(Debug, Copy, Clone, Default)]
pub struct TriangleDensity;

impl VisMode for TriangleDensity {
    const KIND: VisualisationType = VisualisationType::TriangleDensity;

    fn on_hit<W: CollisionWorld + ?Sized>(hit: &HitResult, facing: f32, inputs: &ShadeInputs<'_, W>) -> Rgba8 {
        let Some(BodyGeometry { geometry, transform }) = hit.body.and_then(|body| inputs.world.body_geometry(body))
        else {
            return greyscale(facing);
        };
        if !geometry.is_mesh_like() {
            return greyscale(facing);
        }

        match hit_triangle_area2(hit.impact_point, inputs.trace_dir, geometry, transform) {
            Some(area2) => {
                let density = (1.0 - (area2 - inputs.density_min_area2) * inputs.density_mul).clamp(0.0, 1.0);
                heatmap(density, facing)
            },
            None => unresolved_geometry(facing),
        }
    }
}

/// Re-casts a short probe through every leaf mesh of `geometry` and returns
/// twice the world-space area of the closest triangle hit.
fn hit_triangle_area2(
    impact_point: Vec3,
    trace_dir: Vec3,
    geometry: &base::geometry::Geometry,
    transform: Affine3A,
) -> Option<f32> {
    let start = impact_point - trace_dir;
    let mut closest: Option<(f32, [Vec3; 3])> = None;
    geometry.visit_leaf_meshes(transform, &mut |mesh, node| {
        let inv = node.inverse();
        let Some(hit) = mesh.raycast(
            inv.transform_point3(start),
            inv.transform_vector3(trace_dir),
            DENSITY_PROBE_LENGTH,
        ) else {
            return;
        };
        if closest.map_or(false, |(t, _)| t <= hit.t) {
            return;
        }
        if let Some(triangle) = mesh.triangle(hit.face_index) {
            closest = Some((hit.t, triangle.map(|p| node.transform_point3(p))));
        }
    });
    closest.map(|(_, [a, b, c])| (a - c).cross(b - c).length())
}
