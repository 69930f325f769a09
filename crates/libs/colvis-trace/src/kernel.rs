//! Dispatch of trace kernels specialised for the visualisation mode and the
//! sampling pattern.
//!
//! A kernel is written once, generically over a [`VisMode`] and a
//! [`SamplingStrategy`]. The [`KernelExecutor`] maps the runtime settings to
//! the matching pair of tags, so the per-pixel code never branches on them.

use crate::vis::{Facing, Material, Primitive, RayTime, RayTimeEvenMiss, Triangles, TriangleDensity, VisMode};
use base::{
    sampling::{Linear, SamplingPattern, SamplingStrategy, R2},
    settings::{CollisionSettings, VisualisationType},
};

/// Bits of the dispatch mask, selecting which dimensions are resolved from
/// the executor's runtime values.
pub mod dispatch_mask {
    /// Resolve the visualisation mode at runtime.
    pub const VIS_TYPE: u32 = 1 << 0;
    /// Resolve the sampling pattern at runtime.
    pub const SAMPLING_PATTERN: u32 = 1 << 1;
    /// Resolve everything at runtime.
    pub const ALL: u32 = VIS_TYPE | SAMPLING_PATTERN;
}

/// Work specialised for a visualisation mode and a sampling pattern.
pub trait Kernel {
    /// Runs the kernel.
    fn run<V: VisMode, S: SamplingStrategy>(&mut self);
}

/// Runtime values a kernel is dispatched on.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct KernelExecutor {
    /// Visualisation mode.
    pub vis_type: VisualisationType,
    /// Sampling pattern.
    pub sampling_pattern: SamplingPattern,
}

impl KernelExecutor {
    /// Creates an executor.
    pub const fn new(vis_type: VisualisationType, sampling_pattern: SamplingPattern) -> Self {
        Self {
            vis_type,
            sampling_pattern,
        }
    }

    /// Creates an executor from resolved settings.
    pub fn from_settings(settings: &CollisionSettings) -> Self {
        Self::new(settings.vis_type, settings.sampling_pattern)
    }

    /// Runs `kernel` specialised for both runtime values.
    pub fn dispatch<K: Kernel>(&self, kernel: &mut K) {
        self.dispatch_masked::<{ dispatch_mask::ALL }, Facing, Linear, K>(kernel)
    }

    /// Runs `kernel` specialised for the runtime values selected by `MASK`;
    /// the others are taken from `V` and `S`.
    pub fn dispatch_masked<const MASK: u32, V, S, K>(&self, kernel: &mut K)
    where
        V: VisMode,
        S: SamplingStrategy,
        K: Kernel,
    {
        if MASK & dispatch_mask::SAMPLING_PATTERN == 0 {
            return self.dispatch_vis_type::<MASK, V, S, K>(kernel);
        }
        match self.sampling_pattern {
            SamplingPattern::Linear => self.dispatch_vis_type::<MASK, V, Linear, K>(kernel),
            SamplingPattern::R2 => self.dispatch_vis_type::<MASK, V, R2, K>(kernel),
        }
    }

    fn dispatch_vis_type<const MASK: u32, V, S, K>(&self, kernel: &mut K)
    where
        V: VisMode,
        S: SamplingStrategy,
        K: Kernel,
    {
        if MASK & dispatch_mask::VIS_TYPE == 0 {
            return kernel.run::<V, S>();
        }
        match self.vis_type {
            VisualisationType::Default => kernel.run::<Facing, S>(),
            VisualisationType::Primitive => kernel.run::<Primitive, S>(),
            VisualisationType::Triangles => kernel.run::<Triangles, S>(),
            VisualisationType::Material => kernel.run::<Material, S>(),
            VisualisationType::RayTime => kernel.run::<RayTime, S>(),
            VisualisationType::RayTimeEvenMiss => kernel.run::<RayTimeEvenMiss, S>(),
            VisualisationType::TriangleDensity => kernel.run::<TriangleDensity, S>(),
        }
    }
}
