pub mod analyzer;
pub mod detector;
pub mod error;

pub use analyzer::{BrightnessAnalyzer, FrameAnalysis, FrameAnalyzer};
pub use detector::OccupancyDetector;
pub use error::{OccupancyError, Result};
