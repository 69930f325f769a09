//! Visualisation settings.
//!
//! [`SettingsOptions`] is what users write in their configuration file;
//! [`CollisionSettings`] is the resolved, clamped snapshot a render pass
//! works with.

use crate::{
    query::{MobilityType, ObjectChannel, ObjectQueryParams, ObjectTypeMask, QueryParams},
    sampling::SamplingPattern,
    Error,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Smallest allowed tile size.
pub const MIN_TILE_SIZE: u32 = 2;

/// Largest allowed tile size.
pub const MAX_TILE_SIZE: u32 = 128;

/// How a traced ray is turned into a colour.
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisualisationType {
    /// Facing ratio and view alignment of the hit normal.
    #[default]
    Default,
    /// Random colour per hit primitive.
    Primitive,
    /// Random colour per hit triangle.
    Triangles,
    /// Random colour per physical material.
    Material,
    /// Heatmap of the query time of hits.
    RayTime,
    /// Heatmap of the query time of hits and misses.
    RayTimeEvenMiss,
    /// Heatmap of the area of the hit triangle.
    TriangleDensity,
}

impl VisualisationType {
    /// All the visualisation types, in index order.
    pub const ALL: [VisualisationType; 7] = [
        VisualisationType::Default,
        VisualisationType::Primitive,
        VisualisationType::Triangles,
        VisualisationType::Material,
        VisualisationType::RayTime,
        VisualisationType::RayTimeEvenMiss,
        VisualisationType::TriangleDensity,
    ];

    /// Converts an index into a visualisation type.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range; use [`TryFrom`] for untrusted
    /// values.
    pub fn from_index(index: u32) -> Self {
        match Self::try_from(index) {
            Ok(vis) => vis,
            Err(err) => panic!("{}", err),
        }
    }

    /// Whether the mode measures how long each query takes.
    pub const fn uses_timer(self) -> bool {
        matches!(self, Self::RayTime | Self::RayTimeEvenMiss)
    }

    /// Whether the mode needs the index of the hit triangle.
    pub const fn needs_face_index(self) -> bool {
        matches!(self, Self::Triangles | Self::TriangleDensity)
    }

    /// Whether the mode needs the physical material of the hit.
    pub const fn needs_physical_material(self) -> bool { matches!(self, Self::Material) }
}

impl TryFrom<u32> for VisualisationType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(Error::InvalidVisualisationType(value))
    }
}

impl Display for VisualisationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VisualisationType::Default => "Default",
            VisualisationType::Primitive => "Primitive",
            VisualisationType::Triangles => "Triangles",
            VisualisationType::Material => "Material",
            VisualisationType::RayTime => "RayTime",
            VisualisationType::RayTimeEvenMiss => "RayTimeEvenMiss",
            VisualisationType::TriangleDensity => "TriangleDensity",
        };
        write!(f, "{}", name)
    }
}

/// Options of the ray time heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RayTimeOptions {
    /// Also colour rays that hit nothing.
    pub include_misses: bool,
    /// Query time mapped to green, in milliseconds.
    pub min_time_ms: f32,
    /// Query time mapped to red, in milliseconds.
    pub max_time_ms: f32,
}

impl Default for RayTimeOptions {
    fn default() -> Self {
        Self {
            include_misses: false,
            min_time_ms: 0.001,
            max_time_ms: 0.02,
        }
    }
}

/// Options of the triangle density heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangleDensityOptions {
    /// Triangle area mapped to red.
    pub min_area: f32,
    /// Triangle area mapped to green.
    pub max_area: f32,
}

impl Default for TriangleDensityOptions {
    fn default() -> Self {
        Self {
            min_area: 1.0,
            max_area: 10000.0,
        }
    }
}

/// User facing settings of the visualiser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOptions {
    /// Size of the square tiles, each traced once per frame.
    pub tile_size: u32,
    /// Resolution scale of the realtime target.
    pub scale: f32,
    /// Pattern deciding which pixel of a tile gets traced.
    pub sampling: SamplingPattern,
    /// Visualisation mode.
    pub vis_type: VisualisationType,
    /// Ray time heatmap options.
    pub ray_time: RayTimeOptions,
    /// Triangle density heatmap options.
    pub triangle_density: TriangleDensityOptions,
    /// Distance from the viewer at which traces start.
    pub min_distance: f32,
    /// Individual object channels to query.
    pub object_channels: Vec<ObjectChannel>,
    /// Query every static object channel.
    pub all_static_objects: bool,
    /// Query every dynamic object channel.
    pub all_dynamic_objects: bool,
    /// Tag attached to the traces, empty for none.
    pub trace_tag: String,
    /// Trace against complex geometry.
    pub trace_complex: bool,
    /// Skip blocking bodies.
    pub ignore_blocks: bool,
    /// Skip overlapping bodies.
    pub ignore_touches: bool,
    /// Mobility filter.
    pub mobility: MobilityType,
}

impl Default for SettingsOptions {
    fn default() -> Self {
        Self {
            tile_size: 8,
            scale: 0.5,
            sampling: SamplingPattern::R2,
            vis_type: VisualisationType::Default,
            ray_time: RayTimeOptions::default(),
            triangle_density: TriangleDensityOptions::default(),
            min_distance: 100.0,
            object_channels: Vec::new(),
            all_static_objects: false,
            all_dynamic_objects: false,
            trace_tag: String::new(),
            trace_complex: true,
            ignore_blocks: false,
            ignore_touches: false,
            mobility: MobilityType::Any,
        }
    }
}

impl SettingsOptions {
    /// Visualisation type after folding in the ray time options.
    pub fn resolved_vis_type(&self) -> VisualisationType {
        match self.vis_type {
            VisualisationType::RayTime if self.ray_time.include_misses => VisualisationType::RayTimeEvenMiss,
            vis => vis,
        }
    }

    /// Object channels queried, as a mask.
    pub fn object_mask(&self) -> ObjectTypeMask {
        let mut mask: ObjectTypeMask = self.object_channels.iter().copied().collect();
        if self.all_static_objects {
            mask = mask.union(ObjectTypeMask::ALL_STATIC);
        }
        if self.all_dynamic_objects {
            mask = mask.union(ObjectTypeMask::ALL_DYNAMIC);
        }
        mask
    }
}

/// Named groups of query options.
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettingsPreset {
    /// Query everything with complex traces.
    Default,
    /// Query the visibility channel the way the landscape sculpting tools do.
    LandscapeEditor,
}

impl SettingsPreset {
    /// Overwrites the query related options. Visualisation options are kept.
    pub fn apply(self, options: &mut SettingsOptions) {
        options.all_static_objects = false;
        options.all_dynamic_objects = false;
        options.trace_complex = true;
        options.ignore_blocks = false;
        options.ignore_touches = false;
        options.mobility = MobilityType::Any;
        match self {
            SettingsPreset::Default => {
                options.object_channels.clear();
                options.trace_tag.clear();
            },
            SettingsPreset::LandscapeEditor => {
                options.object_channels = vec![ObjectChannel::Visibility];
                options.trace_tag = String::from("Landscape");
            },
        }
    }
}

/// Resolved settings of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionSettings {
    /// Visualisation mode.
    pub vis_type: VisualisationType,
    /// Tile sampling pattern.
    pub sampling_pattern: SamplingPattern,
    /// Object filter of the traces.
    pub object_params: ObjectQueryParams,
    /// Query parameters of the traces.
    pub query_params: QueryParams,
    /// Tile size, in `[MIN_TILE_SIZE, MAX_TILE_SIZE]`.
    pub tile_size: u32,
    /// Resolution scale, in `[0, 1]`.
    pub scale: f32,
    /// Distance from the viewer at which traces start.
    pub min_distance: f32,
    /// Frame index fed to the sampling pattern.
    pub frame_id: u32,
    /// Query time mapped to green, in milliseconds.
    pub ray_time_min_ms: f32,
    /// Query time mapped to red, in milliseconds.
    pub ray_time_max_ms: f32,
    /// Twice the triangle area mapped to red.
    pub triangle_density_min_area2: f32,
    /// Twice the triangle area mapped to green.
    pub triangle_density_max_area2: f32,
    /// `1 / (max_area2 - min_area2)`.
    pub triangle_density_mul: f32,
}

impl Default for CollisionSettings {
    fn default() -> Self { Self::new(&SettingsOptions::default(), 0) }
}

impl CollisionSettings {
    /// Resolves user options into settings for the frame `frame_counter`.
    pub fn new(options: &SettingsOptions, frame_counter: u64) -> Self {
        let vis_type = options.resolved_vis_type();
        let query_params = QueryParams {
            trace_tag: (!options.trace_tag.is_empty()).then(|| options.trace_tag.clone()),
            trace_complex: options.trace_complex,
            ignore_blocks: options.ignore_blocks,
            ignore_touches: options.ignore_touches,
            mobility: options.mobility,
            return_physical_material: false,
            return_face_index: false,
        };
        let mut settings = Self {
            vis_type,
            sampling_pattern: options.sampling,
            object_params: ObjectQueryParams::new(options.object_mask()),
            query_params,
            tile_size: options.tile_size,
            scale: options.scale,
            min_distance: options.min_distance,
            frame_id: 0,
            ray_time_min_ms: options.ray_time.min_time_ms,
            ray_time_max_ms: options.ray_time.max_time_ms,
            triangle_density_min_area2: options.triangle_density.min_area * 2.0,
            triangle_density_max_area2: options.triangle_density.max_area * 2.0,
            triangle_density_mul: 0.0,
        };
        settings.update(frame_counter);
        settings
    }

    /// Re-derives every field depending on the others. Must be called after
    /// changing any field directly.
    pub fn update(&mut self, frame_counter: u64) {
        self.query_params.return_face_index = self.vis_type.needs_face_index();
        self.query_params.return_physical_material = self.vis_type.needs_physical_material();
        self.tile_size = self.tile_size.clamp(MIN_TILE_SIZE, MAX_TILE_SIZE);
        self.scale = if self.scale.is_nan() {
            0.0
        } else {
            self.scale.clamp(0.0, 1.0)
        };
        self.frame_id = match self.sampling_pattern {
            SamplingPattern::R2 => (frame_counter % (self.tile_size as u64).pow(4)) as u32,
            SamplingPattern::Linear => (frame_counter & 0xffff_ffff) as u32,
        };
        let area_range = self.triangle_density_max_area2 - self.triangle_density_min_area2;
        self.triangle_density_mul = 1.0 / area_range.max(f32::EPSILON);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let settings = CollisionSettings::default();
        assert_eq!(settings.vis_type, VisualisationType::Default);
        assert_eq!(settings.sampling_pattern, SamplingPattern::R2);
        assert_eq!(settings.tile_size, 8);
        assert_eq!(settings.scale, 0.5);
        assert_eq!(settings.min_distance, 100.0);
        assert_eq!(settings.triangle_density_min_area2, 2.0);
        assert_eq!(settings.triangle_density_max_area2, 20000.0);
        assert_eq!(settings.triangle_density_mul, 1.0 / 19998.0);
        assert!(settings.query_params.trace_complex);
        assert!(settings.query_params.trace_tag.is_none());
        assert!(settings.object_params.object_types.is_empty());
    }

    #[test]
    fn values_are_clamped() {
        let options = SettingsOptions {
            tile_size: 1,
            scale: 3.0,
            ..Default::default()
        };
        let settings = CollisionSettings::new(&options, 0);
        assert_eq!(settings.tile_size, 2);
        assert_eq!(settings.scale, 1.0);

        let mut settings = CollisionSettings::default();
        settings.tile_size = 4096;
        settings.scale = -1.0;
        settings.update(0);
        assert_eq!(settings.tile_size, 128);
        assert_eq!(settings.scale, 0.0);
    }

    #[test]
    fn frame_id_wraps_for_r2() {
        let options = SettingsOptions {
            tile_size: 4,
            sampling: SamplingPattern::R2,
            ..Default::default()
        };
        assert_eq!(CollisionSettings::new(&options, 256).frame_id, 0);
        assert_eq!(CollisionSettings::new(&options, 257).frame_id, 1);
        let linear = SettingsOptions {
            sampling: SamplingPattern::Linear,
            ..options
        };
        assert_eq!(CollisionSettings::new(&linear, (1 << 32) + 5).frame_id, 5);
    }

    #[test]
    fn query_returns_follow_the_mode() {
        let mut settings = CollisionSettings::default();
        for vis in VisualisationType::ALL {
            settings.vis_type = vis;
            settings.update(0);
            assert_eq!(
                settings.query_params.return_face_index,
                matches!(vis, VisualisationType::Triangles | VisualisationType::TriangleDensity)
            );
            assert_eq!(
                settings.query_params.return_physical_material,
                vis == VisualisationType::Material
            );
        }
    }

    #[test]
    fn ray_time_with_misses() {
        let mut options = SettingsOptions {
            vis_type: VisualisationType::RayTime,
            ..Default::default()
        };
        assert_eq!(options.resolved_vis_type(), VisualisationType::RayTime);
        options.ray_time.include_misses = true;
        assert_eq!(CollisionSettings::new(&options, 0).vis_type, VisualisationType::RayTimeEvenMiss);
    }

    #[test]
    fn vis_type_from_index() {
        assert_eq!(VisualisationType::from_index(6), VisualisationType::TriangleDensity);
        assert!(matches!(
            VisualisationType::try_from(7),
            Err(Error::InvalidVisualisationType(7))
        ));
    }

    #[test]
    #[should_panic]
    fn vis_type_from_invalid_index_panics() { let _ = VisualisationType::from_index(42); }

    #[test]
    fn presets() {
        let mut options = SettingsOptions {
            ignore_blocks: true,
            all_static_objects: true,
            ..Default::default()
        };
        SettingsPreset::LandscapeEditor.apply(&mut options);
        let settings = CollisionSettings::new(&options, 0);
        assert_eq!(settings.query_params.trace_tag.as_deref(), Some("Landscape"));
        assert!(!settings.query_params.ignore_blocks);
        assert_eq!(
            settings.object_params.object_types,
            ObjectTypeMask::NONE.with(ObjectChannel::Visibility)
        );

        SettingsPreset::Default.apply(&mut options);
        assert_eq!(options, SettingsOptions::default());
    }

    #[test]
    fn options_from_toml() {
        let options: SettingsOptions = toml::from_str(
            r#"
            tile_size = 16
            vis_type = "triangle-density"
            sampling = "linear"
            object_channels = ["world-static", "pawn"]

            [triangle_density]
            max_area = 500.0
            "#,
        )
        .unwrap();
        assert_eq!(options.tile_size, 16);
        assert_eq!(options.vis_type, VisualisationType::TriangleDensity);
        assert_eq!(options.sampling, SamplingPattern::Linear);
        assert_eq!(options.triangle_density.min_area, 1.0);
        assert_eq!(options.triangle_density.max_area, 500.0);
        assert!(options.object_mask().contains(ObjectChannel::Pawn));
        assert_eq!(options.scale, 0.5);
    }
}
