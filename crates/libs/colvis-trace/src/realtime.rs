//! Progressive realtime visualisation.
//!
//! Every frame traces a single pixel per tile of each view and accumulates
//! the result in a buffer owned by the view. A view cycles through three
//! states: idle (buffer parked in the cache), producing (buffer moved into a
//! background task) and awaiting consumption (buffer held by a
//! [`CompletedFrame`]). Dropping the completed frame hands the buffer back to
//! the view for the next frame; so does dropping an unconsumed
//! [`RenderState`].
//!
//! The host marks frame boundaries with [`RealtimeDriver::advance_frame`];
//! all the views started within a frame share its frame number.

use crate::{
    kernel::{Kernel, KernelExecutor},
    renderer::PerspectiveRenderer,
    task::TraceTask,
    vis::VisMode,
    TraceError,
};
use base::{
    buffer::RenderBuffer,
    math::UVec2,
    query::{CollisionWorld, NetMode},
    sampling::SamplingStrategy,
    settings::{CollisionSettings, SettingsOptions},
    view::ViewMatrices,
};
use rayon::prelude::*;
use std::{
    collections::HashMap,
    ops::Deref,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Weak,
    },
};

/// Number of frames a view survives without being rendered.
pub const VIEW_KEEP_ALIVE_FRAMES: u64 = 30;

/// Identifier of a view, stable across frames.
pub type ViewKey = u32;

/// Picks the world a frame is traced in.
pub trait WorldResolver<W: ?Sized>: Send + Sync {
    /// Returns the world to trace, given the world of the view.
    fn resolve(&self, active: &Arc<W>) -> Arc<W>;
}

/// Traces the world of the view.
#[derive(Debug, Copy, Clone, Default)]
pub struct ActiveWorld;

impl<W: ?Sized> WorldResolver<W> for ActiveWorld {
    fn resolve(&self, active: &Arc<W>) -> Arc<W> { active.clone() }
}

/// Traces the first live dedicated server world, falling back to the world
/// of the view. Useful to inspect what the server sees while playing in a
/// client.
#[derive(Debug)]
pub struct PreferDedicatedServer<W: ?Sized> {
    candidates: Vec<Weak<W>>,
}

impl<W: ?Sized> Default for PreferDedicatedServer<W> {
    fn default() -> Self { Self { candidates: Vec::new() } }
}

impl<W: CollisionWorld + ?Sized> PreferDedicatedServer<W> {
    /// Creates the resolver with the worlds to consider.
    pub fn new(candidates: &[Arc<W>]) -> Self {
        Self {
            candidates: candidates.iter().map(Arc::downgrade).collect(),
        }
    }

    /// Adds a world to consider.
    pub fn push(&mut self, world: &Arc<W>) { self.candidates.push(Arc::downgrade(world)); }
}

impl<W: CollisionWorld + ?Sized> WorldResolver<W> for PreferDedicatedServer<W> {
    fn resolve(&self, active: &Arc<W>) -> Arc<W> {
        self.candidates
            .iter()
            .filter_map(Weak::upgrade)
            .find(|world| world.net_mode() == NetMode::DedicatedServer && world.is_valid())
            .unwrap_or_else(|| active.clone())
    }
}

/// Computes the size of the trace target for a viewport.
///
/// The scale is raised so that the smaller side keeps at least one pixel.
pub fn target_size(viewport: UVec2, scale: f32) -> UVec2 {
    let min_side = viewport.x.min(viewport.y).max(1) as f32;
    let scale = scale.max(1.0 / min_side);
    UVec2::new(
        (viewport.x as f32 * scale + 0.5) as u32,
        (viewport.y as f32 * scale + 0.5) as u32,
    )
}

/// Per view data kept across frames.
#[derive(Debug)]
struct ViewState {
    last_accessed: u64,
    buffer: Option<RenderBuffer>,
    returned: Receiver<RenderBuffer>,
    return_to: Sender<RenderBuffer>,
    in_flight_since: Option<u64>,
}

impl ViewState {
    fn new(frame: u64) -> Self {
        let (return_to, returned) = mpsc::channel();
        Self {
            last_accessed: frame,
            buffer: None,
            returned,
            return_to,
            in_flight_since: None,
        }
    }

    /// Collects the buffer handed back by the consumer, without blocking.
    /// Returns whether the view is free to start a new frame.
    fn reclaim(&mut self, key: ViewKey, frame: u64) -> bool {
        while let Ok(buffer) = self.returned.try_recv() {
            self.buffer = Some(buffer);
            self.in_flight_since = None;
        }
        match self.in_flight_since {
            Some(since) if frame - since > VIEW_KEEP_ALIVE_FRAMES => {
                log::warn!(
                    "View {} didn't get its buffer back since frame {}, allocating a new one",
                    key,
                    since
                );
                self.in_flight_since = None;
                true
            },
            Some(_) => false,
            None => true,
        }
    }
}

/// Views rendered recently, keyed by [`ViewKey`].
#[derive(Debug, Default)]
pub struct ViewCache {
    views: HashMap<ViewKey, ViewState>,
}

impl ViewCache {
    /// Number of cached views.
    pub fn len(&self) -> usize { self.views.len() }

    /// Whether no view is cached.
    pub fn is_empty(&self) -> bool { self.views.is_empty() }

    /// Whether the view is cached.
    pub fn contains(&self, key: ViewKey) -> bool { self.views.contains_key(&key) }

    /// Frame at which the view was last rendered.
    pub fn last_accessed(&self, key: ViewKey) -> Option<u64> { self.views.get(&key).map(|v| v.last_accessed) }

    fn touch(&mut self, key: ViewKey, frame: u64) -> &mut ViewState {
        let state = self.views.entry(key).or_insert_with(|| {
            log::debug!("New view {} at frame {}", key, frame);
            ViewState::new(frame)
        });
        state.last_accessed = frame;
        state
    }

    /// Evicts the views not rendered during the last
    /// [`VIEW_KEEP_ALIVE_FRAMES`] frames and returns how many were evicted.
    pub fn prune(&mut self, frame: u64) -> usize {
        let before = self.views.len();
        self.views.retain(|key, state| {
            let keep = frame.saturating_sub(state.last_accessed) <= VIEW_KEEP_ALIVE_FRAMES;
            if !keep {
                log::debug!("Evicting view {} last rendered at frame {}", key, state.last_accessed);
            }
            keep
        });
        before - self.views.len()
    }

    /// Drops every view.
    pub fn clear(&mut self) { self.views.clear(); }
}

/// Traces one sample per tile, one row of tiles per worker.
struct TileRowKernel<'a, W: ?Sized> {
    renderer: &'a PerspectiveRenderer<W>,
    buffer: &'a mut RenderBuffer,
}

impl<W: CollisionWorld + ?Sized> Kernel for TileRowKernel<'_, W> {
    fn run<V: VisMode, S: SamplingStrategy>(&mut self) {
        let renderer = self.renderer;
        self.buffer
            .par_rows_mut(renderer.settings().tile_size)
            .for_each(|mut band| renderer.render_tile_row::<S, V>(&mut band));
    }
}

/// A frame being traced in the background.
#[derive(Debug)]
pub struct RenderState {
    view_key: ViewKey,
    frame: u64,
    target_size: UVec2,
    task: Option<TraceTask<RenderBuffer>>,
    return_to: Sender<RenderBuffer>,
}

impl RenderState {
    /// View the frame belongs to.
    pub fn view_key(&self) -> ViewKey { self.view_key }

    /// Frame counter value the frame was started at.
    pub fn frame(&self) -> u64 { self.frame }

    /// Size of the buffer being traced.
    pub fn target_size(&self) -> UVec2 { self.target_size }

    /// Blocks until the trace is done.
    ///
    /// If the task was lost the view is released and starts over with a new
    /// buffer at its next frame.
    pub fn wait(mut self) -> Result<CompletedFrame, TraceError> {
        let task = self.task.take().ok_or(TraceError::TaskLost)?;
        match task.wait() {
            Ok(buffer) => Ok(CompletedFrame {
                view_key: self.view_key,
                buffer,
                return_to: self.return_to.clone(),
            }),
            Err(err) => {
                release_lost(self.view_key, &self.return_to);
                Err(err)
            },
        }
    }
}

impl Drop for RenderState {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            match task.wait() {
                Ok(buffer) => {
                    let _ = self.return_to.send(buffer);
                },
                Err(_) => release_lost(self.view_key, &self.return_to),
            }
        }
    }
}

/// Frees the view of a frame whose buffer went down with its task.
fn release_lost(view_key: ViewKey, return_to: &Sender<RenderBuffer>) {
    log::warn!("Trace task of view {} was lost, its samples are discarded", view_key);
    let _ = return_to.send(RenderBuffer::new(UVec2::ZERO));
}

/// A traced frame ready to be composited.
///
/// Dereferences to the traced buffer. The buffer goes back to its view when
/// the frame is dropped.
#[derive(Debug)]
pub struct CompletedFrame {
    view_key: ViewKey,
    buffer: RenderBuffer,
    return_to: Sender<RenderBuffer>,
}

impl CompletedFrame {
    /// View the frame belongs to.
    pub fn view_key(&self) -> ViewKey { self.view_key }
}

impl Deref for CompletedFrame {
    type Target = RenderBuffer;

    fn deref(&self) -> &Self::Target { &self.buffer }
}

impl Drop for CompletedFrame {
    fn drop(&mut self) {
        let buffer = std::mem::replace(&mut self.buffer, RenderBuffer::new(UVec2::ZERO));
        // The view may have been evicted meanwhile, the buffer is simply
        // dropped then.
        let _ = self.return_to.send(buffer);
    }
}

/// Drives the progressive visualisation of any number of views.
#[derive(Debug)]
pub struct RealtimeDriver<R = ActiveWorld> {
    options: SettingsOptions,
    resolver: R,
    views: ViewCache,
    frame_counter: u64,
}

impl RealtimeDriver<ActiveWorld> {
    /// Creates a driver tracing the world of each view.
    pub fn new(options: SettingsOptions) -> Self { Self::with_resolver(options, ActiveWorld) }
}

impl<R> RealtimeDriver<R> {
    /// Creates a driver picking the traced world with `resolver`.
    pub fn with_resolver(options: SettingsOptions, resolver: R) -> Self {
        Self {
            options,
            resolver,
            views: ViewCache::default(),
            frame_counter: 0,
        }
    }

    /// User options, picked up at the next frame.
    pub fn options(&self) -> &SettingsOptions { &self.options }

    /// Replaces the user options; they apply from the next frame on.
    pub fn set_options(&mut self, options: SettingsOptions) { self.options = options; }

    /// Number of the current host frame.
    pub fn frame_counter(&self) -> u64 { self.frame_counter }

    /// Starts a new host frame and returns its number.
    ///
    /// Called once per frame, before the views of the frame are begun.
    pub fn advance_frame(&mut self) -> u64 {
        self.frame_counter += 1;
        self.frame_counter
    }

    /// Views currently cached.
    pub fn views(&self) -> &ViewCache { &self.views }

    /// Starts tracing a frame of a view in the background.
    ///
    /// The frame is numbered after the current host frame, see
    /// [`RealtimeDriver::advance_frame`]. Returns `None` when disabled, when
    /// the viewport is empty, or when the view's previous frame is still held
    /// by its consumer. Never blocks.
    ///
    /// # Arguments
    ///
    /// * `world` - World of the view.
    /// * `view_key` - Stable identifier of the view.
    /// * `view` - View matrices of the frame.
    /// * `viewport` - Size of the viewport in pixels.
    /// * `enabled` - Whether the visualisation is on.
    pub fn begin_frame<W>(
        &mut self,
        world: &Arc<W>,
        view_key: ViewKey,
        view: &ViewMatrices,
        viewport: UVec2,
        enabled: bool,
    ) -> Option<RenderState>
    where
        W: CollisionWorld + ?Sized + 'static,
        R: WorldResolver<W>,
    {
        if !enabled || viewport.x == 0 || viewport.y == 0 {
            return None;
        }

        let frame = self.frame_counter;
        let world = self.resolver.resolve(world);
        let settings = CollisionSettings::new(&self.options, frame);
        let target_size = target_size(viewport, settings.scale);

        let state = self.views.touch(view_key, frame);
        if !state.reclaim(view_key, frame) {
            log::debug!("View {} is still being consumed, skipping frame {}", view_key, frame);
            return None;
        }
        let mut buffer = match state.buffer.take() {
            Some(buffer) if buffer.dimensions() == target_size => buffer,
            _ => {
                log::debug!("Allocating {}x{} buffer for view {}", target_size.x, target_size.y, view_key);
                RenderBuffer::new(target_size)
            },
        };
        state.in_flight_since = Some(frame);
        let return_to = state.return_to.clone();

        let renderer = PerspectiveRenderer::new(world, target_size, settings, view);
        let executor = KernelExecutor::from_settings(renderer.settings());
        let task = TraceTask::spawn(move || {
            executor.dispatch(&mut TileRowKernel {
                renderer: &renderer,
                buffer: &mut buffer,
            });
            buffer
        });

        Some(RenderState {
            view_key,
            frame,
            target_size,
            task: Some(task),
            return_to,
        })
    }

    /// Waits for a frame started with [`RealtimeDriver::begin_frame`].
    pub fn end_frame(&self, state: Option<RenderState>) -> Result<Option<CompletedFrame>, TraceError> {
        state.map(RenderState::wait).transpose()
    }

    /// Evicts the views not rendered recently and returns how many were
    /// evicted.
    pub fn prune_stale_views(&mut self) -> usize { self.views.prune(self.frame_counter) }

    /// Releases every view.
    pub fn shutdown(&mut self) {
        log::info!("Shutting down realtime visualisation, releasing {} views", self.views.len());
        self.views.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Body, MeshWorld};
    use base::{
        color::Rgba8,
        geometry::Geometry,
        math::{Affine3A, Vec3},
        sampling::SamplingPattern,
        view::ViewRotation,
    };
    use proptest::prelude::*;

    fn world() -> Arc<MeshWorld> {
        let mut world = MeshWorld::new("Test");
        let mut wall = Body::new(
            "wall",
            Geometry::Box {
                half_extents: Vec3::new(1.0, 1000.0, 1000.0),
            },
        );
        wall.transform = Affine3A::from_translation(Vec3::new(500.0, 0.0, 0.0));
        world.add_body(wall);
        Arc::new(world)
    }

    fn options() -> SettingsOptions {
        SettingsOptions {
            tile_size: 4,
            scale: 1.0,
            sampling: SamplingPattern::Linear,
            ..Default::default()
        }
    }

    fn view() -> ViewMatrices { ViewMatrices::from_rotation(Vec3::ZERO, ViewRotation::default(), 1.0, 1.0, 1.0) }

    fn written(buffer: &RenderBuffer) -> usize { buffer.pixels().iter().filter(|p| p.a != 0).count() }

    #[test]
    fn target_size_rounds_and_keeps_a_pixel() {
        assert_eq!(target_size(UVec2::new(1280, 720), 0.5), UVec2::new(640, 360));
        assert_eq!(target_size(UVec2::new(101, 51), 0.5), UVec2::new(51, 26));
        assert_eq!(target_size(UVec2::new(1280, 720), 0.0), UVec2::new(2, 1));
    }

    proptest! {
        #[test]
        fn target_size_is_never_empty(w in 1u32..4096, h in 1u32..4096, scale in 0.0f32..=1.0) {
            let size = target_size(UVec2::new(w, h), scale);
            prop_assert!(size.x >= 1 && size.y >= 1);
            prop_assert!(size.x <= w && size.y <= h);
        }
    }

    #[test]
    fn disabled_or_empty_views_are_skipped() {
        let world = world();
        let mut driver = RealtimeDriver::new(options());
        assert!(driver.begin_frame(&world, 0, &view(), UVec2::new(16, 16), false).is_none());
        assert!(driver.begin_frame(&world, 0, &view(), UVec2::new(0, 16), true).is_none());
        assert_eq!(driver.frame_counter(), 0);
        assert!(driver.end_frame(None).unwrap().is_none());
    }

    #[test]
    fn frames_accumulate_in_the_view_buffer() {
        let world = world();
        let mut driver = RealtimeDriver::new(options());

        driver.advance_frame();
        let state = driver.begin_frame(&world, 7, &view(), UVec2::new(16, 8), true);
        let frame = driver.end_frame(state).unwrap().unwrap();
        assert_eq!(frame.dimensions(), UVec2::new(16, 8));
        assert_eq!(frame.view_key(), 7);
        assert_eq!(written(&frame), 8);
        drop(frame);

        driver.advance_frame();
        let state = driver.begin_frame(&world, 7, &view(), UVec2::new(16, 8), true);
        let frame = driver.end_frame(state).unwrap().unwrap();
        assert_eq!(written(&frame), 16);
        assert!(frame.pixels().iter().all(|p| *p == Rgba8::TRANSPARENT || p.a == 255));
        drop(frame);

        // A new size starts over.
        driver.advance_frame();
        let state = driver.begin_frame(&world, 7, &view(), UVec2::new(8, 8), true);
        let frame = driver.end_frame(state).unwrap().unwrap();
        assert_eq!(frame.dimensions(), UVec2::new(8, 8));
        assert_eq!(written(&frame), 4);
    }

    #[test]
    fn held_frames_skip_the_view_without_blocking() {
        let world = world();
        let mut driver = RealtimeDriver::new(options());
        driver.advance_frame();
        let state = driver.begin_frame(&world, 1, &view(), UVec2::new(8, 8), true);
        let held = driver.end_frame(state).unwrap().unwrap();

        driver.advance_frame();
        assert!(driver.begin_frame(&world, 1, &view(), UVec2::new(8, 8), true).is_none());
        // Other views are not affected.
        let other = driver.begin_frame(&world, 2, &view(), UVec2::new(8, 8), true);
        assert!(other.is_some());
        drop(driver.end_frame(other).unwrap());

        drop(held);
        driver.advance_frame();
        let state = driver.begin_frame(&world, 1, &view(), UVec2::new(8, 8), true);
        assert!(state.is_some());
        let frame = driver.end_frame(state).unwrap().unwrap();
        assert_eq!(written(&frame), 8);
    }

    #[test]
    fn stale_views_are_pruned() {
        let world = world();
        let mut driver = RealtimeDriver::new(options());
        driver.advance_frame();
        let state = driver.begin_frame(&world, 1, &view(), UVec2::new(8, 8), true);
        drop(driver.end_frame(state).unwrap());
        assert_eq!(driver.views().last_accessed(1), Some(1));

        for _ in 0..30 {
            driver.advance_frame();
            let state = driver.begin_frame(&world, 2, &view(), UVec2::new(8, 8), true);
            drop(driver.end_frame(state).unwrap());
        }
        assert_eq!(driver.frame_counter(), 31);
        assert_eq!(driver.prune_stale_views(), 0);
        assert!(driver.views().contains(1));

        driver.advance_frame();
        let state = driver.begin_frame(&world, 2, &view(), UVec2::new(8, 8), true);
        drop(driver.end_frame(state).unwrap());
        assert_eq!(driver.prune_stale_views(), 1);
        assert!(!driver.views().contains(1));
        assert!(driver.views().contains(2));

        driver.shutdown();
        assert!(driver.views().is_empty());
    }

    #[test]
    fn dedicated_server_world_is_preferred() {
        let client = Arc::new(MeshWorld::new("Client").with_net_mode(NetMode::Client));
        let server = Arc::new(MeshWorld::new("Server").with_net_mode(NetMode::DedicatedServer));
        let resolver = PreferDedicatedServer::new(&[client.clone(), server.clone()]);
        assert!(Arc::ptr_eq(&resolver.resolve(&client), &server));

        server.invalidate();
        assert!(Arc::ptr_eq(&resolver.resolve(&client), &client));

        let resolver = PreferDedicatedServer::new(&[client.clone()]);
        drop(server);
        assert!(Arc::ptr_eq(&resolver.resolve(&client), &client));
        assert!(Arc::ptr_eq(&ActiveWorld.resolve(&client), &client));
    }

    #[test]
    fn driver_traces_through_the_resolver() {
        let client = Arc::new(MeshWorld::new("Empty").with_net_mode(NetMode::Client));
        let server = world();
        let mut driver = RealtimeDriver::with_resolver(options(), PreferDedicatedServer::default());
        let state = driver.begin_frame(&client, 0, &view(), UVec2::new(8, 8), true);
        let frame = driver.end_frame(state).unwrap().unwrap();
        assert!(frame.pixels().iter().filter(|p| p.a != 0).all(|p| *p == Rgba8::BLACK));
        drop(frame);

        let mut resolver = PreferDedicatedServer::default();
        let server = Arc::new(
            Arc::try_unwrap(server)
                .unwrap()
                .with_net_mode(NetMode::DedicatedServer),
        );
        resolver.push(&server);
        let mut driver = RealtimeDriver::with_resolver(options(), resolver);
        let state = driver.begin_frame(&client, 0, &view(), UVec2::new(8, 8), true);
        let frame = driver.end_frame(state).unwrap().unwrap();
        assert!(frame.pixels().iter().filter(|p| p.a != 0).all(|p| *p != Rgba8::BLACK));
    }

    #[test]
    fn views_of_a_frame_share_its_frame_number() {
        let world = world();
        let mut driver = RealtimeDriver::new(SettingsOptions {
            tile_size: 2,
            ..options()
        });
        let keys = [0, 1];
        for expected in 1..=4 {
            assert_eq!(driver.advance_frame(), expected);
            let states: Vec<_> = keys
                .iter()
                .map(|&key| driver.begin_frame(&world, key, &view(), UVec2::new(4, 4), true))
                .collect();
            assert!(states.iter().flatten().all(|state| state.frame() == expected));
            for state in states {
                let frame = driver.end_frame(state).unwrap().unwrap();
                assert_eq!(written(&frame), 4 * expected as usize);
            }
        }
        // Four frames of a 2x2 tile cover every pixel of both views.
        assert_eq!(driver.frame_counter(), 4);
        assert_eq!(driver.views().last_accessed(0), Some(4));
        assert_eq!(driver.views().last_accessed(1), Some(4));
    }

    #[test]
    fn unconsumed_frames_hand_the_buffer_back() {
        let world = world();
        let mut driver = RealtimeDriver::new(options());
        driver.advance_frame();
        let state = driver.begin_frame(&world, 3, &view(), UVec2::new(8, 8), true);
        assert!(state.is_some());
        drop(state);

        for expected in 2..=4usize {
            driver.advance_frame();
            let state = driver.begin_frame(&world, 3, &view(), UVec2::new(8, 8), true);
            assert!(state.is_some());
            let frame = driver.end_frame(state).unwrap().unwrap();
            assert_eq!(written(&frame), 4 * expected);
        }
    }
}
