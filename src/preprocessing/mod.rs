//! Image preprocessing applied before recognition

pub mod pipeline;
pub mod steps;

pub use pipeline::{Pipeline, Preset};
