//! Helper modules shared across the filesystem layers.
pub mod geometry;
