//! # colvis-trace
//! Ray tracer of the collision visualiser.
//!
//! A [`renderer::PerspectiveRenderer`] turns pixels into line traces against
//! a [`base::query::CollisionWorld`] and colours the results according to a
//! [`vis::VisMode`]. The [`realtime::RealtimeDriver`] refines one sample per
//! tile every frame, while the [`offline::OfflineDriver`] traces a complete
//! image or cube map in batches and writes it to disk.
#![warn(missing_docs)]

mod error;
pub mod kernel;
pub mod offline;
pub mod output;
pub mod realtime;
pub mod renderer;
pub mod task;
pub mod vis;
pub mod world;

pub use error::TraceError;
