//! Offline visualisation: traces a complete image or cube map in batches of
//! rays, one batch per tick, and writes the result to disk.

use crate::{
    kernel::{dispatch_mask, Kernel, KernelExecutor},
    output::{map_stem, timestamped_path, FileOutputWriter, OutputWriter},
    renderer::PerspectiveRenderer,
    task::TraceTask,
    vis::{Facing, VisMode},
};
use base::{
    buffer::{PixelSpan, RenderBuffer},
    math::{div_round_up, UVec2, Vec3},
    query::CollisionWorld,
    sampling::{Linear, SamplingStrategy},
    settings::CollisionSettings,
    view::{CubeFace, ViewMatrices, ViewRotation, OFFLINE_NEAR_PLANE},
};
use chrono::Local;
use rayon::prelude::*;
use std::{
    f32::consts::FRAC_PI_2,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Smallest accepted resolution.
pub const MIN_RESOLUTION: u32 = 32;
/// Largest accepted resolution.
pub const MAX_RESOLUTION: u32 = 8192;
/// Resolution used when none is given.
pub const DEFAULT_RESOLUTION: u32 = 512;
/// Smallest accepted number of rays per tick.
pub const MIN_RAYS_PER_TICK: u32 = 4;
/// Largest accepted number of rays per tick.
pub const MAX_RAYS_PER_TICK: u32 = 4096;
/// Largest accepted number of rays per tick when large batches are allowed.
pub const MAX_LARGE_RAYS_PER_TICK: u32 = 1 << 16;
/// Number of rays per tick used when none is given.
pub const DEFAULT_RAYS_PER_TICK: u32 = 1024;

/// Parameters of an offline trace.
#[derive(Debug, Clone)]
pub struct OfflineSettings {
    /// Trace settings.
    pub settings: CollisionSettings,
    /// Position of the viewer.
    pub origin: Vec3,
    /// Orientation of the viewer.
    pub rotation: ViewRotation,
    /// Width and height of the image, or of each cube face.
    pub resolution: u32,
    /// Number of rays traced per tick.
    pub rays_per_tick: u32,
    /// Whether to trace a cube map instead of a single image.
    pub cubemap: bool,
}

impl OfflineSettings {
    /// Creates the settings of a single image trace from the origin.
    ///
    /// # Arguments
    ///
    /// * `settings` - Trace settings.
    /// * `resolution` - Image size, clamped to
    ///   [`MIN_RESOLUTION`]..=[`MAX_RESOLUTION`].
    /// * `rays_per_tick` - Clamped to [`MIN_RAYS_PER_TICK`] and either
    ///   [`MAX_RAYS_PER_TICK`] or [`MAX_LARGE_RAYS_PER_TICK`].
    /// * `allow_large_batches` - Raises the upper bound of `rays_per_tick`.
    pub fn new(settings: CollisionSettings, resolution: u32, rays_per_tick: u32, allow_large_batches: bool) -> Self {
        let max_rays = if allow_large_batches {
            MAX_LARGE_RAYS_PER_TICK
        } else {
            MAX_RAYS_PER_TICK
        };
        Self {
            settings,
            origin: Vec3::ZERO,
            rotation: ViewRotation::default(),
            resolution: resolution.clamp(MIN_RESOLUTION, MAX_RESOLUTION),
            rays_per_tick: rays_per_tick.clamp(MIN_RAYS_PER_TICK, max_rays),
            cubemap: false,
        }
    }

    /// Places the viewer.
    pub fn with_viewpoint(mut self, origin: Vec3, rotation: ViewRotation) -> Self {
        self.origin = origin;
        self.rotation = rotation;
        self
    }

    /// Switches between single image and cube map.
    pub fn with_cubemap(mut self, cubemap: bool) -> Self {
        self.cubemap = cubemap;
        self
    }

    /// Total number of rays of the trace.
    pub fn num_rays(&self) -> u64 {
        let rays = self.resolution as u64 * self.resolution as u64;
        if self.cubemap {
            rays * 6
        } else {
            rays
        }
    }
}

/// Progress of an [`OfflineDriver`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OfflineState {
    /// Nothing dispatched yet.
    Init,
    /// Batches are being traced.
    Tracing,
    /// The result is being written.
    Writing,
    /// Finished, whether or not the output could be written.
    Done,
    /// The world went away before the trace finished.
    Aborted,
}

impl OfflineState {
    /// Whether no more tick will do anything.
    pub fn is_finished(self) -> bool { matches!(self, Self::Done | Self::Aborted) }
}

/// Traces a contiguous range of row-major pixels.
struct StrideKernel<'a, W: ?Sized> {
    renderer: &'a PerspectiveRenderer<W>,
    span: PixelSpan<'a>,
}

impl<W: CollisionWorld + ?Sized> Kernel for StrideKernel<'_, W> {
    fn run<V: VisMode, S: SamplingStrategy>(&mut self) {
        let renderer = self.renderer;
        self.span.par_pixels_mut().for_each(|(pos, pixel)| {
            if let Some(colour) = renderer.shade_pixel::<V>(pos) {
                *pixel = colour;
            }
        });
    }
}

/// Drives an offline trace, one batch of rays per [`OfflineDriver::tick`].
pub struct OfflineDriver<W: ?Sized, O = FileOutputWriter> {
    world: Arc<W>,
    renderers: Arc<Vec<PerspectiveRenderer<W>>>,
    buffers: Vec<RenderBuffer>,
    executor: KernelExecutor,
    rays_per_tick: u64,
    iteration: u64,
    max_iterations: u64,
    cubemap: bool,
    state: OfflineState,
    task: Option<TraceTask<Vec<RenderBuffer>>>,
    output_dir: PathBuf,
    output_path: Option<PathBuf>,
    writer: O,
}

impl<W: CollisionWorld + ?Sized + 'static> OfflineDriver<W, FileOutputWriter> {
    /// Creates a driver writing PNG and DDS files into `output_dir`.
    pub fn new(world: Arc<W>, settings: OfflineSettings, output_dir: impl Into<PathBuf>) -> Self {
        Self::with_writer(world, settings, output_dir, FileOutputWriter)
    }
}

impl<W: CollisionWorld + ?Sized + 'static, O: OutputWriter> OfflineDriver<W, O> {
    /// Creates a driver handing its result to `writer`.
    pub fn with_writer(world: Arc<W>, settings: OfflineSettings, output_dir: impl Into<PathBuf>, writer: O) -> Self {
        let resolution = settings.resolution;
        let size = UVec2::splat(resolution);
        log::info!("Offline trace of {:?}", world.map_name().unwrap_or_default());
        log::info!("    - net mode: {:?}", world.net_mode());
        log::info!("    - resolution: {}", resolution);
        log::info!("    - rays per tick: {}", settings.rays_per_tick);
        log::info!("    - total rays: {}", settings.num_rays());
        log::info!("    - cube map: {}", settings.cubemap);

        let (renderers, rays_per_tick) = if settings.cubemap {
            let mut renderers: Vec<_> = CubeFace::ALL
                .iter()
                .map(|&face| {
                    let view = ViewMatrices::cube_face(settings.origin, settings.rotation, face);
                    PerspectiveRenderer::new(world.clone(), size, settings.settings.clone(), &view)
                })
                .collect();
            // Faces shade against the forward vector of the first face.
            let rev_view_forward = renderers[0].rev_view_forward();
            for renderer in renderers.iter_mut().skip(1) {
                renderer.set_rev_view_forward(rev_view_forward);
            }
            (renderers, (settings.rays_per_tick / 6).max(1))
        } else {
            let view = ViewMatrices::from_rotation(settings.origin, settings.rotation, FRAC_PI_2, 1.0, OFFLINE_NEAR_PLANE);
            let renderer = PerspectiveRenderer::new(world.clone(), size, settings.settings.clone(), &view);
            (vec![renderer], settings.rays_per_tick)
        };

        let rays_per_tick = rays_per_tick as u64;
        let buffers = vec![RenderBuffer::new(size); renderers.len()];
        Self {
            world,
            renderers: Arc::new(renderers),
            buffers,
            executor: KernelExecutor::from_settings(&settings.settings),
            rays_per_tick,
            iteration: 0,
            max_iterations: div_round_up(resolution as u64 * resolution as u64, rays_per_tick),
            cubemap: settings.cubemap,
            state: OfflineState::Init,
            task: None,
            output_dir: output_dir.into(),
            output_path: None,
            writer,
        }
    }

    /// Current state.
    pub fn state(&self) -> OfflineState { self.state }

    /// Number of batches dispatched so far.
    pub fn iteration(&self) -> u64 { self.iteration }

    /// Number of batches needed to cover the image.
    pub fn max_iterations(&self) -> u64 { self.max_iterations }

    /// Number of rays traced per face and per batch.
    pub fn rays_per_tick(&self) -> u64 { self.rays_per_tick }

    /// Whether a cube map is traced.
    pub fn is_cubemap(&self) -> bool { self.cubemap }

    /// Renderers, one per face.
    pub fn renderers(&self) -> &[PerspectiveRenderer<W>] { &self.renderers }

    /// Traced images, one per face. Empty while a batch is in flight.
    pub fn buffers(&self) -> &[RenderBuffer] { &self.buffers }

    /// Where the result was written, once written.
    pub fn output_path(&self) -> Option<&Path> { self.output_path.as_deref() }

    /// Output writer.
    pub fn writer(&self) -> &O { &self.writer }

    /// Advances the trace by one batch.
    ///
    /// Waits for the previous batch, then either aborts if the world is gone,
    /// writes the result if every batch has been traced, or dispatches the
    /// next batch in the background.
    pub fn tick(&mut self) -> OfflineState {
        if self.state.is_finished() {
            return self.state;
        }

        if let Some(task) = self.task.take() {
            match task.wait() {
                Ok(buffers) => self.buffers = buffers,
                Err(err) => {
                    log::error!("Offline trace failed: {}", err);
                    self.state = OfflineState::Aborted;
                    return self.state;
                },
            }
        }

        if !self.world.is_valid() {
            log::info!("World has gone out of scope! Bailing!");
            self.state = OfflineState::Aborted;
            return self.state;
        }

        log::info!(
            "{:.2}% [{} / {}]",
            100.0 * self.iteration as f64 / self.max_iterations as f64,
            self.iteration,
            self.max_iterations
        );

        if self.iteration == self.max_iterations {
            self.state = OfflineState::Writing;
            self.write_output();
            self.state = OfflineState::Done;
            return self.state;
        }

        let start = (self.iteration * self.rays_per_tick) as usize;
        let range = start..start + self.rays_per_tick as usize;
        self.iteration += 1;

        let executor = self.executor;
        let renderers = self.renderers.clone();
        let mut buffers = std::mem::take(&mut self.buffers);
        self.task = Some(TraceTask::spawn(move || {
            for (renderer, buffer) in renderers.iter().zip(buffers.iter_mut()) {
                // Pixels are strided linearly, only the mode matters.
                executor.dispatch_masked::<{ dispatch_mask::VIS_TYPE }, Facing, Linear, _>(&mut StrideKernel {
                    renderer,
                    span: buffer.span_mut(range.clone()),
                });
            }
            buffers
        }));
        self.state = OfflineState::Tracing;
        self.state
    }

    /// Ticks until the trace is done or aborted.
    pub fn run_to_completion(&mut self) -> OfflineState {
        while !self.tick().is_finished() {}
        self.state
    }

    fn write_output(&mut self) {
        let stem = map_stem(self.world.map_name().as_deref());
        let now = Local::now();
        let result = if self.cubemap {
            let path = timestamped_path(&self.output_dir, &format!("{}_cubemap", stem), "dds", &now);
            self.writer.write_cubemap(&self.buffers, &path).map(|_| path)
        } else {
            let path = timestamped_path(&self.output_dir, &stem, "png", &now);
            self.writer.write_image(&self.buffers[0], &path).map(|_| path)
        };
        match result {
            Ok(path) => {
                log::info!("Written to: {}", path.display());
                self.output_path = Some(path);
            },
            Err(err) => log::error!("Failed to write the offline trace: {}", err),
        }
    }
}

impl<W: ?Sized, O> std::fmt::Debug for OfflineDriver<W, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineDriver")
            .field("faces", &self.renderers.len())
            .field("iteration", &self.iteration)
            .field("max_iterations", &self.max_iterations)
            .field("state", &self.state)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}
