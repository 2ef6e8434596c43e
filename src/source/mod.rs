//! Resilient frame extraction
//!
//! A [`FrameSource`] opens a video container, decodes its frames in order and
//! persists each one to a [`FrameStore`]. Failed reads are retried with
//! exponential backoff; a frame whose retries are exhausted is skipped, and a
//! run of consecutive skips aborts the extraction.

pub mod ffmpeg;
pub mod retry;

pub use ffmpeg::{FfmpegBackend, FfmpegDecoder};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};

use crate::config::ExtractionConfig;
use crate::error::{MotionError, Result};
use crate::frame::Frame;
use crate::store::FrameStore;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Container metadata reported by a [`VideoBackend`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoProperties {
    pub frame_rate: f64,
    /// 0 when the container does not report it
    pub total_frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    /// Display rotation in degrees; frames are decoded in stored orientation
    #[serde(default)]
    pub rotation: i32,
}

/// An opened, decodable video. Only constructed with a positive frame rate.
#[derive(Debug, Clone)]
pub struct VideoHandle {
    path: PathBuf,
    frame_rate: f64,
    total_frame_count: u64,
    size_in_bytes: u64,
    width: u32,
    height: u32,
    codec: String,
    rotation: i32,
}

impl VideoHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn total_frame_count(&self) -> u64 {
        self.total_frame_count
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn rotation(&self) -> i32 {
        self.rotation
    }

    /// File name of the video, used to name its frame directory
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Sequential frame reader for one opened video
pub trait FrameDecoder {
    /// Read the next frame. An error covers both a corrupt frame and end of stream.
    fn read_frame(&mut self) -> Result<RgbImage>;
}

/// Probes containers and opens decoders for them
pub trait VideoBackend {
    fn probe(&self, path: &Path) -> Result<VideoProperties>;
    fn open_decoder(&self, handle: &VideoHandle) -> Result<Box<dyn FrameDecoder>>;
}

/// Outcome of one extraction call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub destination: PathBuf,
    pub extracted: u64,
    pub skipped: u64,
    pub total_frame_count: u64,
    /// True when a previous run had already completed and nothing was decoded
    pub skipped_existing: bool,
}

/// Lazy, finite, non-restartable sequence of decoded frames.
///
/// Yields frames in strictly increasing index order. Indices of skipped frames
/// are consumed without being yielded. After a fatal error the sequence ends.
/// The decoder is released as soon as the sequence ends or is dropped.
pub struct ExtractedFrames<'a> {
    decoder: Option<Box<dyn FrameDecoder>>,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
    total_frame_count: u64,
    index: u64,
    consecutive_failures: u32,
    decoded: u64,
    skipped: u64,
}

impl<'a> ExtractedFrames<'a> {
    fn new(
        decoder: Box<dyn FrameDecoder>,
        sleeper: &'a dyn Sleeper,
        policy: RetryPolicy,
        total_frame_count: u64,
    ) -> Self {
        Self {
            decoder: Some(decoder),
            sleeper,
            policy,
            total_frame_count,
            index: 0,
            consecutive_failures: 0,
            decoded: 0,
            skipped: 0,
        }
    }

    /// Frames decoded so far
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Frames skipped after exhausting their retries
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Index the next read will be assigned
    pub fn next_index(&self) -> u64 {
        self.index
    }

    fn finish(&mut self) {
        self.decoder = None;
    }

    /// Retry a failed read with exponential backoff
    fn retry(&mut self, mut last_error: MotionError) -> Option<RgbImage> {
        let decoder = self.decoder.as_mut()?;

        for attempt in 0..self.policy.max_retries {
            let delay = self.policy.backoff(attempt);
            warn!(
                "Failed to read frame {} ({}). Retrying in {:?}...",
                self.index, last_error, delay
            );
            self.sleeper.sleep(delay);

            match decoder.read_frame() {
                Ok(image) => return Some(image),
                Err(e) => last_error = e,
            }
        }

        error!(
            "Skipping frame {} after {} retries: {}",
            self.index, self.policy.max_retries, last_error
        );
        None
    }
}

impl Iterator for ExtractedFrames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let decoder = self.decoder.as_mut()?;

            let image = match decoder.read_frame() {
                Ok(image) => Some(image),
                Err(e) if self.index < self.total_frame_count => self.retry(e),
                Err(e) => {
                    debug!("End of stream at frame {}: {}", self.index, e);
                    self.finish();
                    return None;
                }
            };

            match image {
                Some(image) => {
                    self.consecutive_failures = 0;
                    let frame = Frame::new(self.index, image);
                    self.index += 1;
                    self.decoded += 1;

                    if self.index % 100 == 0 {
                        info!(
                            "📊 Processed {} frames, {} left",
                            self.index,
                            self.total_frame_count.saturating_sub(self.index)
                        );
                    }

                    return Some(Ok(frame));
                }
                None => {
                    self.skipped += 1;
                    self.consecutive_failures += 1;

                    if self.consecutive_failures >= self.policy.max_consecutive_failures {
                        let index = self.index;
                        self.finish();
                        return Some(Err(MotionError::TooManyFailures {
                            index,
                            consecutive: self.consecutive_failures,
                        }));
                    }

                    self.index += 1;
                }
            }
        }
    }
}

/// Opens videos and extracts their frames into a [`FrameStore`]
pub struct FrameSource<B: VideoBackend = FfmpegBackend, S: Sleeper = ThreadSleeper> {
    config: ExtractionConfig,
    backend: B,
    sleeper: S,
    policy: RetryPolicy,
}

impl FrameSource<FfmpegBackend, ThreadSleeper> {
    pub fn new(config: ExtractionConfig) -> Self {
        Self::with_backend(config, FfmpegBackend::new(), ThreadSleeper)
    }
}

impl<B: VideoBackend, S: Sleeper> FrameSource<B, S> {
    pub fn with_backend(config: ExtractionConfig, backend: B, sleeper: S) -> Self {
        Self {
            config,
            backend,
            sleeper,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Frame directory for a video: `frames_dir/<video file name>`
    pub fn destination_for(&self, video_path: &Path) -> PathBuf {
        let filename = video_path
            .file_name()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "unknown".into());
        self.config.frames_dir.join(filename)
    }

    /// Validate and probe a video container
    pub fn open(&self, path: &Path) -> Result<VideoHandle> {
        if !path.exists() {
            return Err(MotionError::NotFound(path.to_path_buf()));
        }

        let size_in_bytes = std::fs::metadata(path)?.len();
        let limit_bytes = self.config.max_video_size_bytes();
        if size_in_bytes > limit_bytes {
            return Err(MotionError::SizeLimit {
                path: path.to_path_buf(),
                size_bytes: size_in_bytes,
                limit_bytes,
            });
        }

        let props = self.backend.probe(path)?;

        if props.frame_rate.is_nan() || props.frame_rate <= 0.0 {
            return Err(MotionError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "frame rate is zero".to_string(),
            });
        }

        if props.width > 0
            && (props.width < self.config.min_width || props.height < self.config.min_height)
        {
            warn!(
                "Low resolution video {}: {}x{} is below {}x{}",
                path.display(),
                props.width,
                props.height,
                self.config.min_width,
                self.config.min_height
            );
        }

        let handle = VideoHandle {
            path: path.to_path_buf(),
            frame_rate: props.frame_rate,
            total_frame_count: props.total_frame_count,
            size_in_bytes,
            width: props.width,
            height: props.height,
            codec: props.codec,
            rotation: props.rotation,
        };

        info!(
            "📹 Opened video: {} ({}, {}x{}, {:.1}fps, {} frames, {} bytes)",
            handle.filename(),
            handle.codec(),
            handle.width,
            handle.height,
            handle.frame_rate,
            handle.total_frame_count,
            handle.size_in_bytes
        );

        if handle.rotation() != 0 {
            info!(
                "🔄 Video carries a {}° rotation flag; frames are kept in stored orientation",
                handle.rotation()
            );
        }

        Ok(handle)
    }

    /// Start decoding a video. Nothing is persisted by the returned sequence.
    pub fn frames(&self, handle: &VideoHandle) -> Result<ExtractedFrames<'_>> {
        let decoder = self.backend.open_decoder(handle)?;
        Ok(ExtractedFrames::new(
            decoder,
            &self.sleeper,
            self.policy,
            handle.total_frame_count,
        ))
    }

    /// Whether a previous extraction into `store` already finished
    pub fn is_extracted(&self, store: &FrameStore) -> Result<bool> {
        if self.config.require_completion_marker {
            Ok(store.is_complete())
        } else {
            Ok(!store.is_empty()?)
        }
    }

    /// Decode every frame of `handle` into `destination`
    pub fn extract(&self, handle: &VideoHandle, destination: &Path) -> Result<ExtractionSummary> {
        let store = FrameStore::new(destination, self.config.artifact_format);

        if self.is_extracted(&store)? {
            return self.existing_summary(&store, handle.total_frame_count);
        }

        if !store.is_empty()? {
            warn!(
                "Found an unfinished extraction in {}; existing frames are kept",
                destination.display()
            );
        }

        std::fs::create_dir_all(destination)?;
        info!("🎬 Extracting frames: {} -> {}", handle.filename(), destination.display());

        let mut frames = self.frames(handle)?;
        let mut extracted = 0;
        for frame in frames.by_ref() {
            let frame = frame?;
            store.write(&frame)?;
            extracted += 1;
        }
        let skipped = frames.skipped();
        drop(frames);

        store.mark_complete(extracted, skipped, handle.total_frame_count)?;

        info!(
            "✅ Extracted {} frames ({} skipped) into {}",
            extracted,
            skipped,
            destination.display()
        );

        Ok(ExtractionSummary {
            destination: destination.to_path_buf(),
            extracted,
            skipped,
            total_frame_count: handle.total_frame_count,
            skipped_existing: false,
        })
    }

    /// Open and extract a video, returning early without opening it when
    /// `destination` already holds a finished extraction
    pub fn extract_video(&self, path: &Path, destination: &Path) -> Result<ExtractionSummary> {
        if !path.exists() {
            return Err(MotionError::NotFound(path.to_path_buf()));
        }

        let store = FrameStore::new(destination, self.config.artifact_format);
        if self.is_extracted(&store)? {
            return self.existing_summary(&store, 0);
        }

        let handle = self.open(path)?;
        self.extract(&handle, destination)
    }

    fn existing_summary(&self, store: &FrameStore, total_frame_count: u64) -> Result<ExtractionSummary> {
        info!(
            "⏭️ Frames already exist in {}. Skipping extraction.",
            store.dir().display()
        );

        let summary = match store.completion_marker()? {
            Some(marker) => ExtractionSummary {
                destination: store.dir().to_path_buf(),
                extracted: marker.extracted,
                skipped: marker.skipped,
                total_frame_count: marker.total_frame_count,
                skipped_existing: true,
            },
            None => ExtractionSummary {
                destination: store.dir().to_path_buf(),
                extracted: store.list()?.len() as u64,
                skipped: 0,
                total_frame_count,
                skipped_existing: true,
            },
        };

        Ok(summary)
    }
}
