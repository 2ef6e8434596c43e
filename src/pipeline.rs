use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::detection::{DetectionResult, MotionDetector};
use crate::error::Result;
use crate::report::{report_base, DetectionReport};
use crate::source::{ExtractionSummary, FfmpegBackend, FrameSource, Sleeper, ThreadSleeper, VideoBackend};
use crate::store::FrameStore;

/// Everything produced for a single video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAnalysis {
    pub video: PathBuf,
    pub extraction: ExtractionSummary,
    pub detections: DetectionResult,
    pub reports: Vec<PathBuf>,
    pub processing_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Completed,
    Failed,
}

/// Batch entry for one video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoOutcome {
    pub video: PathBuf,
    pub status: ProcessingStatus,
    pub frames_extracted: u64,
    pub frames_skipped: u64,
    pub frames_with_motion: usize,
    pub reports: Vec<PathBuf>,
    pub error_message: Option<String>,
    pub processing_time: Duration,
}

/// Overall batch processing results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_time: Duration,
    pub results: Vec<VideoOutcome>,
}

/// Extract → detect → report, for one video or a directory of videos.
/// Videos are always processed one after another.
pub struct MotionPipeline<B: VideoBackend = FfmpegBackend, S: Sleeper = ThreadSleeper> {
    config: Config,
    source: FrameSource<B, S>,
    detector: MotionDetector,
}

impl MotionPipeline<FfmpegBackend, ThreadSleeper> {
    pub fn new(config: Config) -> Self {
        Self::with_backend(config, FfmpegBackend::new(), ThreadSleeper)
    }
}

impl<B: VideoBackend, S: Sleeper> MotionPipeline<B, S> {
    pub fn with_backend(config: Config, backend: B, sleeper: S) -> Self {
        info!("🔧 Initializing motion pipeline");
        debug!("{}", config.summary());

        Self {
            source: FrameSource::with_backend(config.extraction.clone(), backend, sleeper),
            detector: MotionDetector::new(config.detection.clone()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &FrameSource<B, S> {
        &self.source
    }

    pub fn detector(&self) -> &MotionDetector {
        &self.detector
    }

    /// Frame store a video's frames are extracted into
    pub fn store_for(&self, video: &Path) -> FrameStore {
        FrameStore::new(
            self.source.destination_for(video),
            self.config.extraction.artifact_format,
        )
    }

    /// Run the full pipeline for one video
    pub fn process_video(&self, video: &Path, output_dir: &Path) -> Result<VideoAnalysis> {
        let start_time = Instant::now();
        let store = self.store_for(video);

        let extraction = self.source.extract_video(video, store.dir())?;
        let detections = self.detector.detect_store(&store)?;

        let filename = video
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let report = DetectionReport::new(filename, detections);
        let reports = report.write(
            &report_base(output_dir, video),
            &self.config.output.export_formats,
        )?;

        let processing_time = start_time.elapsed();
        info!(
            "✅ Completed: {} in {:.2}s ({} frames with motion)",
            video.display(),
            processing_time.as_secs_f64(),
            report.frames_with_motion
        );

        Ok(VideoAnalysis {
            video: video.to_path_buf(),
            extraction,
            detections: report.detections,
            reports,
            processing_time,
        })
    }

    /// Find videos under `dir` whose extension is supported (case-insensitive)
    pub fn discover_videos(&self, dir: &Path) -> Vec<PathBuf> {
        let extensions = &self.config.extraction.supported_extensions;

        let mut videos: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| {
                        let ext = ext.to_lowercase();
                        extensions.iter().any(|e| e.to_lowercase() == ext)
                    })
                    .unwrap_or(false)
            })
            .collect();

        videos.sort();
        videos
    }

    /// Process every video in a directory and save `batch_results.json`
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchResult> {
        let start_time = Instant::now();

        info!("🚀 Starting batch processing...");
        info!("📁 Input: {}", input_dir.display());
        info!("📂 Output: {}", output_dir.display());

        std::fs::create_dir_all(output_dir)?;

        info!("🔍 Discovering videos...");
        let videos = self.discover_videos(input_dir);
        if videos.is_empty() {
            warn!("No videos found in {}", input_dir.display());
        } else {
            info!("📹 Found {} videos to process", videos.len());
        }

        let total_videos = videos.len();
        let mut results = Vec::with_capacity(total_videos);
        for (index, video) in videos.iter().enumerate() {
            info!("📹 Processing video {}/{}: {}", index + 1, total_videos, video.display());
            let video_start = Instant::now();

            let outcome = match self.process_video(video, output_dir) {
                Ok(analysis) => VideoOutcome {
                    video: video.clone(),
                    status: ProcessingStatus::Completed,
                    frames_extracted: analysis.extraction.extracted,
                    frames_skipped: analysis.extraction.skipped,
                    frames_with_motion: analysis.detections.len(),
                    reports: analysis.reports,
                    error_message: None,
                    processing_time: analysis.processing_time,
                },
                Err(e) => {
                    error!("❌ Failed: {} - {}", video.display(), e);
                    VideoOutcome {
                        video: video.clone(),
                        status: ProcessingStatus::Failed,
                        frames_extracted: 0,
                        frames_skipped: 0,
                        frames_with_motion: 0,
                        reports: Vec::new(),
                        error_message: Some(e.to_string()),
                        processing_time: video_start.elapsed(),
                    }
                }
            };
            results.push(outcome);
        }

        let successful = results
            .iter()
            .filter(|r| r.status == ProcessingStatus::Completed)
            .count();
        let batch = BatchResult {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            total_time: start_time.elapsed(),
            results,
        };

        let results_path = output_dir.join("batch_results.json");
        std::fs::write(&results_path, serde_json::to_string_pretty(&batch)?)?;
        info!("💾 Results saved to: {}", results_path.display());

        Ok(batch)
    }
}
