//! Collision query interface the tracer talks to.

use crate::{
    geometry::Geometry,
    math::{Affine3A, Vec3},
};
use serde::{Deserialize, Serialize};

/// Object channels a collision body can belong to.
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectChannel {
    /// Static level geometry.
    WorldStatic,
    /// Moving level geometry.
    WorldDynamic,
    /// Characters.
    Pawn,
    /// Visibility-only geometry.
    Visibility,
    /// Camera-only geometry.
    Camera,
    /// Simulated rigid bodies.
    PhysicsBody,
    /// Vehicles.
    Vehicle,
    /// Destructible pieces.
    Destructible,
}

impl ObjectChannel {
    /// Returns the bit of the channel in an [`ObjectTypeMask`].
    pub const fn bit(self) -> u32 { 1 << self as u32 }
}

/// Set of object channels a query accepts.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ObjectTypeMask(u32);

impl ObjectTypeMask {
    /// Empty mask.
    pub const NONE: Self = Self(0);
    /// Every static object channel.
    pub const ALL_STATIC: Self = Self(ObjectChannel::WorldStatic.bit());
    /// Every dynamic object channel.
    pub const ALL_DYNAMIC: Self = Self(
        ObjectChannel::WorldDynamic.bit()
            | ObjectChannel::Pawn.bit()
            | ObjectChannel::PhysicsBody.bit()
            | ObjectChannel::Vehicle.bit()
            | ObjectChannel::Destructible.bit(),
    );
    /// Every static and dynamic object channel.
    pub const ALL_OBJECTS: Self = Self(Self::ALL_STATIC.0 | Self::ALL_DYNAMIC.0);

    /// Creates a mask from raw bits.
    pub const fn from_bits(bits: u32) -> Self { Self(bits) }

    /// Returns the raw bits.
    pub const fn bits(self) -> u32 { self.0 }

    /// Returns the mask with `channel` added.
    pub const fn with(self, channel: ObjectChannel) -> Self { Self(self.0 | channel.bit()) }

    /// Returns the union of both masks.
    pub const fn union(self, other: Self) -> Self { Self(self.0 | other.0) }

    /// Whether `channel` is part of the mask.
    pub const fn contains(self, channel: ObjectChannel) -> bool { self.0 & channel.bit() != 0 }

    /// Whether the mask is empty.
    pub const fn is_empty(self) -> bool { self.0 == 0 }
}

impl FromIterator<ObjectChannel> for ObjectTypeMask {
    fn from_iter<T: IntoIterator<Item = ObjectChannel>>(iter: T) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

/// Object filter of a query.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ObjectQueryParams {
    /// Channels the query accepts. An empty mask accepts every channel.
    pub object_types: ObjectTypeMask,
}

impl ObjectQueryParams {
    /// Creates the filter.
    pub const fn new(object_types: ObjectTypeMask) -> Self { Self { object_types } }

    /// Whether a body on `channel` passes the filter.
    pub fn accepts(&self, channel: ObjectChannel) -> bool {
        self.object_types.is_empty() || self.object_types.contains(channel)
    }
}

/// Mobility of a collision body.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mobility {
    /// Never moves.
    #[default]
    Static,
    /// May move at runtime.
    Movable,
}

/// Mobility filter of a query.
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MobilityType {
    /// Accepts every body.
    #[default]
    Any,
    /// Static bodies only.
    Static,
    /// Movable bodies only.
    Dynamic,
}

impl MobilityType {
    /// Whether a body with `mobility` passes the filter.
    pub const fn accepts(self, mobility: Mobility) -> bool {
        match self {
            MobilityType::Any => true,
            MobilityType::Static => matches!(mobility, Mobility::Static),
            MobilityType::Dynamic => matches!(mobility, Mobility::Movable),
        }
    }
}

/// How a body reacts to traces.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionResponse {
    /// Stops the trace.
    #[default]
    Block,
    /// Reports a touch without stopping the trace.
    Overlap,
}

/// Query parameters of a line trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    /// Tag identifying the trace, if any.
    pub trace_tag: Option<String>,
    /// Trace against complex (per-triangle) geometry instead of the simple
    /// collision shapes.
    pub trace_complex: bool,
    /// Skip blocking bodies.
    pub ignore_blocks: bool,
    /// Skip overlapping bodies.
    pub ignore_touches: bool,
    /// Mobility filter.
    pub mobility: MobilityType,
    /// Fill [`HitResult::material`].
    pub return_physical_material: bool,
    /// Fill [`HitResult::face_index`].
    pub return_face_index: bool,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            trace_tag: None,
            trace_complex: true,
            ignore_blocks: false,
            ignore_touches: false,
            mobility: MobilityType::Any,
            return_physical_material: false,
            return_face_index: false,
        }
    }
}

impl QueryParams {
    /// Whether a body with `response` is considered by the trace.
    pub const fn accepts_response(&self, response: CollisionResponse) -> bool {
        match response {
            CollisionResponse::Block => !self.ignore_blocks,
            CollisionResponse::Overlap => !self.ignore_touches,
        }
    }
}

/// Handle of a body inside a [`CollisionWorld`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

/// Identifier of a physical material.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// Result of a successful line trace.
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    /// World-space impact position.
    pub impact_point: Vec3,
    /// World-space impact normal, normalised.
    pub impact_normal: Vec3,
    /// Distance from the trace start.
    pub distance: f32,
    /// Identifier of the hit primitive.
    pub primitive_id: u32,
    /// Index of the hit triangle, if requested and available.
    pub face_index: Option<u32>,
    /// Physical material of the hit surface, if requested and available.
    pub material: Option<MaterialId>,
    /// Body owning the hit geometry.
    pub body: Option<BodyHandle>,
}

/// Collision geometry of a body, together with its world transform.
#[derive(Debug, Clone, Copy)]
pub struct BodyGeometry<'a> {
    /// The geometry.
    pub geometry: &'a Geometry,
    /// Local to world transform.
    pub transform: Affine3A,
}

/// Network role of a world.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetMode {
    /// Single process game.
    #[default]
    Standalone,
    /// Server without local players.
    DedicatedServer,
    /// Server with a local player.
    ListenServer,
    /// Networked client.
    Client,
}

/// A world that can be queried for collisions.
///
/// Implementations must be safe to query from many threads at once.
pub trait CollisionWorld: Send + Sync {
    /// Traces a line from `start` to `end` and returns the closest hit.
    fn line_trace(
        &self,
        start: Vec3,
        end: Vec3,
        object_params: &ObjectQueryParams,
        params: &QueryParams,
    ) -> Option<HitResult>;

    /// Returns the collision geometry of a body.
    fn body_geometry(&self, body: BodyHandle) -> Option<BodyGeometry<'_>>;

    /// Whether the world can still be queried.
    fn is_valid(&self) -> bool { true }

    /// Path or name of the loaded map, if any.
    fn map_name(&self) -> Option<String> { None }

    /// Network role of the world.
    fn net_mode(&self) -> NetMode { NetMode::Standalone }
}
