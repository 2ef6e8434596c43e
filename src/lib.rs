//! Motion Analyzer - Rust Implementation
//!
//! Resilient frame extraction and background-differencing motion detection
//! for recorded video. Frames are decoded with bounded retries, persisted as
//! indexed image artifacts, then compared against a reference frame to find
//! regions of motion.

pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod store;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder, ExportFormat};
pub use crate::detection::{BoundingBox, DetectionResult, DetectionRun, FrameDetection, MotionDetector};
pub use crate::error::{MotionError, Result};
pub use crate::frame::Frame;
pub use crate::pipeline::{BatchResult, MotionPipeline, VideoAnalysis};
pub use crate::report::DetectionReport;
pub use crate::source::{ExtractionSummary, FrameSource, RetryPolicy, VideoBackend, VideoHandle};
pub use crate::store::{ArtifactFormat, FrameArtifact, FrameStore};
