//! Text and JSON reports of detection results

use crate::config::ExportFormat;
use crate::detection::DetectionResult;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Detection result of one video, ready to be written out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub video: String,
    pub generated_at: DateTime<Utc>,
    pub frames_with_motion: usize,
    pub total_objects: usize,
    pub detections: DetectionResult,
}

impl DetectionReport {
    pub fn new(video: impl Into<String>, detections: DetectionResult) -> Self {
        Self {
            video: video.into(),
            generated_at: Utc::now(),
            frames_with_motion: detections.len(),
            total_objects: detections.total_boxes(),
            detections,
        }
    }

    /// Plain-text listing: one header line, then every frame and its objects
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "Motion detected in {} frames", self.detections.len());

        for detection in self.detections.iter() {
            let _ = writeln!(
                text,
                "Frame {}: {} objects detected",
                detection.frame_index,
                detection.boxes.len()
            );
            for (j, b) in detection.boxes.iter().enumerate() {
                let _ = writeln!(
                    text,
                    "  Object {}: x={}, y={}, width={}, height={}",
                    j + 1,
                    b.x,
                    b.y,
                    b.width,
                    b.height
                );
            }
        }

        text
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write one file per format as `base.<ext>` and return the written paths
    pub fn write(&self, base: &Path, formats: &[ExportFormat]) -> Result<Vec<PathBuf>> {
        if let Some(parent) = base.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut written = Vec::with_capacity(formats.len());
        for format in formats {
            // appended rather than set: stems may contain dots
            let mut name = base.as_os_str().to_os_string();
            name.push(".");
            name.push(format.extension());
            let path = PathBuf::from(name);
            let content = match format {
                ExportFormat::Text => self.to_text(),
                ExportFormat::JSON => self.to_json()?,
            };
            fs::write(&path, content)?;
            info!("📝 Report saved: {}", path.display());
            written.push(path);
        }

        Ok(written)
    }
}

/// Report base path for a video: `output_dir/<video stem>_motion`
pub fn report_base(output_dir: &Path, video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    output_dir.join(format!("{}_motion", stem))
}
