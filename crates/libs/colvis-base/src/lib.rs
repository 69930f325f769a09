//! # colvis-base
//! Core library for the collision visualiser.
//! Contains the colour policies, tile sampling patterns, settings, the
//! collision query interface and the geometry the visualiser traces against.
#![warn(missing_docs)]

pub mod buffer;
pub mod color;
pub mod error;
pub mod geometry;
pub mod isect;
pub mod math;
pub mod query;
pub mod sampling;
pub mod settings;
pub mod view;

pub use error::Error;
