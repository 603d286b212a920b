//! Detection metrics for the face-mask pipeline.

pub mod map;

pub use map::{AreaRange, MapConfig, MapError, MapReport, MeanAveragePrecision};
