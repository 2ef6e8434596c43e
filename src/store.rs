//! Frame artifact storage: one indexed image file per extracted frame

use crate::error::{MotionError, Result};
use crate::frame::Frame;
use chrono::{DateTime, Utc};
use image::ImageFormat;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};
use walkdir::WalkDir;

/// File written once the last artifact of an extraction has been flushed
pub const COMPLETION_MARKER: &str = ".extraction_complete";

/// Image format of frame artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Jpg,
    Png,
    Bmp,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Jpg => "jpg",
            ArtifactFormat::Png => "png",
            ArtifactFormat::Bmp => "bmp",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            ArtifactFormat::Jpg => ImageFormat::Jpeg,
            ArtifactFormat::Png => ImageFormat::Png,
            ArtifactFormat::Bmp => ImageFormat::Bmp,
        }
    }
}

/// A persisted frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameArtifact {
    pub index: u64,
    pub path: PathBuf,
}

/// Contents of the completion marker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub extracted: u64,
    pub skipped: u64,
    pub total_frame_count: u64,
    pub completed_at: DateTime<Utc>,
}

fn artifact_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^frame_(\d{5,})\.(jpg|jpeg|png|bmp)$").expect("artifact name pattern is valid")
    })
}

/// Directory of `frame_NNNNN` artifacts for one video
#[derive(Debug, Clone)]
pub struct FrameStore {
    dir: PathBuf,
    format: ArtifactFormat,
}

impl FrameStore {
    pub fn new(dir: impl Into<PathBuf>, format: ArtifactFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// Path of the artifact for `index`, zero-padded to 5 digits
    pub fn artifact_path(&self, index: u64) -> PathBuf {
        self.dir
            .join(format!("frame_{:05}.{}", index, self.format.extension()))
    }

    pub fn contains(&self, index: u64) -> bool {
        self.artifact_path(index).exists()
    }

    /// Persist a frame. An existing artifact for the same index is left untouched.
    pub fn write(&self, frame: &Frame) -> Result<FrameArtifact> {
        let path = self.artifact_path(frame.index);

        if path.exists() {
            debug!("Artifact already present, not rewriting: {}", path.display());
            return Ok(FrameArtifact {
                index: frame.index,
                path,
            });
        }

        fs::create_dir_all(&self.dir)?;

        let mut buffer = Cursor::new(Vec::new());
        frame.image.write_to(&mut buffer, self.format.image_format())?;

        // Write to a hidden partial file first so a crash never leaves a truncated artifact
        let partial = self.dir.join(format!(
            ".frame_{:05}.{}.partial",
            frame.index,
            self.format.extension()
        ));
        {
            let mut file = File::create(&partial)?;
            file.write_all(buffer.get_ref())?;
            file.sync_all()?;
        }
        fs::rename(&partial, &path)?;

        Ok(FrameArtifact {
            index: frame.index,
            path,
        })
    }

    /// All artifacts in ascending index order
    pub fn list(&self) -> Result<Vec<FrameArtifact>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let pattern = artifact_name_pattern();
        let mut artifacts = Vec::new();

        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| MotionError::Io(std::io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if let Some(captures) = pattern.captures(&name) {
                if let Ok(index) = captures[1].parse::<u64>() {
                    artifacts.push(FrameArtifact {
                        index,
                        path: entry.path().to_path_buf(),
                    });
                }
            }
        }

        artifacts.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.path.cmp(&b.path)));
        artifacts.dedup_by_key(|a| a.index);

        Ok(artifacts)
    }

    /// Decode an artifact back into a frame
    pub fn read(&self, artifact: &FrameArtifact) -> Result<Frame> {
        let bytes = fs::read(&artifact.path)?;
        let image = image::load_from_memory(&bytes).map_err(|e| MotionError::CorruptArtifact {
            path: artifact.path.clone(),
            reason: e.to_string(),
        })?;

        Ok(Frame::new(artifact.index, image.to_rgb8()))
    }

    /// True when the directory holds no frame artifacts. Partial writes,
    /// the marker and stray files do not count.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.list()?.is_empty())
    }

    pub fn marker_path(&self) -> PathBuf {
        self.dir.join(COMPLETION_MARKER)
    }

    pub fn is_complete(&self) -> bool {
        self.marker_path().exists()
    }

    /// Record that extraction finished; call only after the last artifact is written
    pub fn mark_complete(&self, extracted: u64, skipped: u64, total_frame_count: u64) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let marker = CompletionMarker {
            extracted,
            skipped,
            total_frame_count,
            completed_at: Utc::now(),
        };

        let mut file = File::create(self.marker_path())?;
        file.write_all(serde_json::to_string_pretty(&marker)?.as_bytes())?;
        file.sync_all()?;

        info!("🏁 Extraction marked complete: {}", self.dir.display());
        Ok(())
    }

    pub fn completion_marker(&self) -> Result<Option<CompletionMarker>> {
        if !self.is_complete() {
            return Ok(None);
        }
        let content = fs::read_to_string(self.marker_path())?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}
