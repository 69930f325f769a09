//! Perspective ray caster.

use crate::vis::{visualise, ShadeInputs, VisMode};
use base::{
    buffer::{PixelTarget, RowBand},
    color::Rgba8,
    math::{Mat4, UVec2, Vec2, Vec3},
    query::CollisionWorld,
    sampling::SamplingStrategy,
    settings::CollisionSettings,
    view::{unproject, ViewMatrices},
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Distance from the viewer at which traces end.
pub const MAX_TRACE_RANGE: f32 = 1_048_576.0;

/// Maps a query duration onto `[0, 1]` between `min_ms` and `max_ms`.
pub fn normalise_trace_time(elapsed: Duration, min_ms: f32, max_ms: f32) -> f32 {
    let ms = elapsed.as_secs_f64() as f32 * 1000.0;
    ((ms - min_ms) / (max_ms - min_ms).max(f32::EPSILON)).clamp(0.0, 1.0)
}

/// Immutable snapshot of everything needed to trace pixels of one view.
///
/// The renderer is shared by all the workers of a dispatch; each of them
/// writes through its own disjoint [`PixelTarget`].
pub struct PerspectiveRenderer<W: ?Sized> {
    world: Arc<W>,
    settings: CollisionSettings,
    target_size: UVec2,
    origin: Vec3,
    inv_view_projection: Mat4,
    pixel_to_uv: Vec2,
    rev_view_forward: Vec3,
}

impl<W: ?Sized> Clone for PerspectiveRenderer<W> {
    fn clone(&self) -> Self {
        Self {
            world: self.world.clone(),
            settings: self.settings.clone(),
            target_size: self.target_size,
            origin: self.origin,
            inv_view_projection: self.inv_view_projection,
            pixel_to_uv: self.pixel_to_uv,
            rev_view_forward: self.rev_view_forward,
        }
    }
}

impl<W: ?Sized> std::fmt::Debug for PerspectiveRenderer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerspectiveRenderer")
            .field("target_size", &self.target_size)
            .field("origin", &self.origin)
            .field("vis_type", &self.settings.vis_type)
            .finish_non_exhaustive()
    }
}

impl<W: CollisionWorld + ?Sized> PerspectiveRenderer<W> {
    /// Creates a renderer tracing `world` from `view` into a target of
    /// `target_size` pixels.
    pub fn new(world: Arc<W>, target_size: UVec2, settings: CollisionSettings, view: &ViewMatrices) -> Self {
        Self {
            world,
            settings,
            target_size,
            origin: view.origin(),
            inv_view_projection: *view.inv_view_projection(),
            pixel_to_uv: Vec2::ONE / target_size.max(UVec2::ONE).as_vec2(),
            rev_view_forward: view.reverse_forward(),
        }
    }

    /// World being traced.
    pub fn world(&self) -> &Arc<W> { &self.world }

    /// Settings of the pass.
    pub fn settings(&self) -> &CollisionSettings { &self.settings }

    /// Size of the target in pixels.
    pub fn target_size(&self) -> UVec2 { self.target_size }

    /// Direction pointing from the scene back towards the viewer.
    pub fn rev_view_forward(&self) -> Vec3 { self.rev_view_forward }

    /// Overrides the reverse view direction, so that the faces of a cube map
    /// share the shading of the first face.
    pub fn set_rev_view_forward(&mut self, rev_view_forward: Vec3) { self.rev_view_forward = rev_view_forward; }

    /// World-space direction of the ray through the centre of the pixel.
    pub fn ray_direction(&self, pos: UVec2) -> Vec3 {
        let uv = (pos.as_vec2() + 0.5) * self.pixel_to_uv;
        let ndc = Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
        (unproject(&self.inv_view_projection, ndc) - self.origin).normalize()
    }

    /// Traces the pixel at `pos` and returns its colour, or `None` if the
    /// position lies outside of the target.
    pub fn shade_pixel<V: VisMode>(&self, pos: UVec2) -> Option<Rgba8> {
        if pos.x >= self.target_size.x || pos.y >= self.target_size.y {
            return None;
        }

        let dir = self.ray_direction(pos);
        let start = self.origin + dir * self.settings.min_distance;
        let end = self.origin + dir * MAX_TRACE_RANGE;

        let trace = || {
            self.world.line_trace(
                start,
                end,
                &self.settings.object_params,
                &self.settings.query_params,
            )
        };
        let (hit, timer) = if V::USES_TIMER {
            let started = Instant::now();
            let hit = trace();
            let elapsed = started.elapsed();
            let timer = normalise_trace_time(elapsed, self.settings.ray_time_min_ms, self.settings.ray_time_max_ms);
            (hit, timer)
        } else {
            (trace(), 0.0)
        };

        let inputs = ShadeInputs {
            world: self.world.as_ref(),
            trace_dir: dir,
            rev_view_forward: self.rev_view_forward,
            timer,
            density_min_area2: self.settings.triangle_density_min_area2,
            density_mul: self.settings.triangle_density_mul,
        };
        Some(visualise::<V, W>(hit.as_ref(), &inputs))
    }

    /// Traces the pixel at `pos` into `target`. Positions outside of the
    /// target are ignored.
    pub fn render_pixel<V: VisMode, T: PixelTarget + ?Sized>(&self, pos: UVec2, target: &mut T) {
        if let Some(colour) = self.shade_pixel::<V>(pos) {
            target.put(pos, colour);
        }
    }

    /// Traces this frame's sample of the tile starting at `tile`.
    pub fn render_tile_pixel<S: SamplingStrategy, V: VisMode, T: PixelTarget + ?Sized>(
        &self,
        tile: UVec2,
        target: &mut T,
    ) {
        let pos = S::next_tile_sample(tile, self.settings.tile_size, self.settings.frame_id);
        self.render_pixel::<V, T>(pos, target);
    }

    /// Traces this frame's sample of every tile of the row of tiles starting
    /// at the band's first row.
    pub fn render_tile_row<S: SamplingStrategy, V: VisMode>(&self, band: &mut RowBand<'_>) {
        let tile_size = self.settings.tile_size;
        let y = band.y();
        for x in (0..self.target_size.x).step_by(tile_size as usize) {
            self.render_tile_pixel::<S, V, _>(UVec2::new(x, y), &mut *band);
        }
    }
}
