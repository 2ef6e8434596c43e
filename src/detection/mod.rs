//! Background-differencing motion detection
//!
//! The first frame of a run becomes the reference. Every later frame is
//! normalized the same way and compared against it; changed regions large
//! enough to clear the noise floor are reported as bounding boxes.

pub mod preprocess;
pub mod regions;

pub use preprocess::{normalize, BLUR_KERNEL_SIZE};
pub use regions::{dilate, external_contours, threshold_difference, BinaryMask, Contour};

use crate::config::DetectionConfig;
use crate::error::Result;
use crate::frame::Frame;
use crate::store::FrameStore;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Per-pixel intensity difference above which a pixel counts as changed
pub const DIFF_THRESHOLD: u8 = 25;

/// 3x3 dilation passes applied to the change map
pub const DILATION_ITERATIONS: usize = 2;

/// Axis-aligned rectangle in working-resolution pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Boxes found in one frame, in contour discovery order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetection {
    pub frame_index: u64,
    pub boxes: Vec<BoundingBox>,
}

/// Detections of a run, in increasing frame-index order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionResult {
    detections: Vec<FrameDetection>,
}

impl DetectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, detection: FrameDetection) {
        debug_assert!(self
            .detections
            .last()
            .map_or(true, |last| last.frame_index < detection.frame_index));
        self.detections.push(detection);
    }

    /// Number of frames with at least one box
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameDetection> {
        self.detections.iter()
    }

    pub fn detections(&self) -> &[FrameDetection] {
        &self.detections
    }

    /// Boxes for a frame index; empty when the frame had no motion
    pub fn boxes_for(&self, frame_index: u64) -> &[BoundingBox] {
        self.detections
            .binary_search_by_key(&frame_index, |d| d.frame_index)
            .map(|i| self.detections[i].boxes.as_slice())
            .unwrap_or(&[])
    }

    pub fn total_boxes(&self) -> usize {
        self.detections.iter().map(|d| d.boxes.len()).sum()
    }
}

/// Bounding boxes of the changed regions between two normalized frames
pub fn find_motion_boxes(reference: &GrayImage, current: &GrayImage, min_area: f64) -> Vec<BoundingBox> {
    let mask = threshold_difference(reference, current, DIFF_THRESHOLD);
    let mask = dilate(&mask, DILATION_ITERATIONS);

    external_contours(&mask)
        .into_iter()
        .filter(|contour| contour.area() >= min_area)
        .map(|contour| contour.bounding_box)
        .collect()
}

/// Compares frames against a run-scoped reference frame
#[derive(Debug, Clone)]
pub struct MotionDetector {
    config: DetectionConfig,
}

impl MotionDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Start an incremental run with no reference frame yet
    pub fn start_run(&self) -> DetectionRun<'_> {
        DetectionRun {
            config: &self.config,
            reference: None,
            last_index: None,
            result: DetectionResult::new(),
        }
    }

    /// Detect motion across in-memory frames
    pub fn detect<I>(&self, frames: I) -> DetectionResult
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut run = self.start_run();
        for frame in frames {
            run.process(&frame);
        }
        run.finish()
    }

    /// Detect motion across the artifacts of a store, read back in index order.
    /// Unreadable artifacts are logged and skipped.
    pub fn detect_store(&self, store: &FrameStore) -> Result<DetectionResult> {
        let artifacts = store.list()?;
        info!(
            "🔍 Detecting motion in {} frames from {}",
            artifacts.len(),
            store.dir().display()
        );

        let mut run = self.start_run();
        for artifact in &artifacts {
            match store.read(artifact) {
                Ok(frame) => {
                    run.process(&frame);
                }
                Err(e) => warn!("Skipping unreadable frame {}: {}", artifact.index, e),
            }
        }

        let result = run.finish();
        info!(
            "✅ Motion detected in {} of {} frames ({} objects)",
            result.len(),
            artifacts.len(),
            result.total_boxes()
        );
        Ok(result)
    }
}

/// One detection run. Holds the reference frame, which is set exactly once.
pub struct DetectionRun<'a> {
    config: &'a DetectionConfig,
    reference: Option<GrayImage>,
    last_index: Option<u64>,
    result: DetectionResult,
}

impl DetectionRun<'_> {
    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Feed the next frame. Returns the detection appended for it, if any.
    pub fn process(&mut self, frame: &Frame) -> Option<&FrameDetection> {
        if let Some(last) = self.last_index {
            if frame.index <= last {
                warn!(
                    "Frame {} arrived after frame {}; ignoring out-of-order frame",
                    frame.index, last
                );
                return None;
            }
        }
        self.last_index = Some(frame.index);

        let normalized = normalize(&frame.image, self.config.working_width);

        if self.reference.is_none() {
            debug!(
                "Reference frame set from frame {} ({}x{})",
                frame.index,
                normalized.width(),
                normalized.height()
            );
            self.reference = Some(normalized);
            return None;
        }
        let reference = self.reference.as_ref()?;

        if reference.dimensions() != normalized.dimensions() {
            warn!(
                "Frame {} is {:?} after resizing but the reference is {:?}; skipping",
                frame.index,
                normalized.dimensions(),
                reference.dimensions()
            );
            return None;
        }

        let boxes = find_motion_boxes(reference, &normalized, self.config.min_area);
        if boxes.is_empty() {
            return None;
        }

        debug!("Frame {}: {} objects detected", frame.index, boxes.len());
        self.result.push(FrameDetection {
            frame_index: frame.index,
            boxes,
        });
        self.result.detections.last()
    }

    pub fn finish(self) -> DetectionResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArtifactFormat;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    const BACKGROUND: u8 = 40;
    const FOREGROUND: u8 = 220;

    fn background(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([BACKGROUND; 3]))
    }

    fn with_blocks(mut image: RgbImage, blocks: &[(u32, u32, u32, u32)]) -> RgbImage {
        for &(x0, y0, w, h) in blocks {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    image.put_pixel(x, y, Rgb([FOREGROUND; 3]));
                }
            }
        }
        image
    }

    fn detector() -> MotionDetector {
        MotionDetector::new(DetectionConfig::default())
    }

    /// The box must contain the changed block and overshoot each side by at most `margin`
    fn assert_encloses(actual: &BoundingBox, block: (u32, u32, u32, u32), margin: u32) {
        let (x, y, w, h) = block;
        let right = actual.x + actual.width;
        let bottom = actual.y + actual.height;
        assert!(
            actual.x <= x && actual.y <= y && right >= x + w && bottom >= y + h,
            "{:?} does not contain {:?}",
            actual,
            block
        );
        assert!(
            x - actual.x <= margin
                && y - actual.y <= margin
                && right - (x + w) <= margin
                && bottom - (y + h) <= margin,
            "{:?} overshoots {:?} by more than {} px",
            actual,
            block,
            margin
        );
    }

    #[test]
    fn test_single_frame_sets_reference_only() {
        let result = detector().detect(vec![Frame::new(0, background(500, 300))]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_identical_frames_produce_nothing() {
        let frames = (0..5).map(|i| Frame::new(i, background(500, 300)));
        assert!(detector().detect(frames).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(detector().detect(Vec::new()).is_empty());
    }

    #[test]
    fn test_change_below_noise_floor_is_ignored() {
        let frames = vec![
            Frame::new(0, background(500, 300)),
            Frame::new(1, with_blocks(background(500, 300), &[(250, 150, 6, 6)])),
        ];
        assert!(detector().detect(frames).is_empty());
    }

    #[test]
    fn test_contiguous_change_gives_one_box() {
        let frames = vec![
            Frame::new(0, background(500, 300)),
            Frame::new(1, with_blocks(background(500, 300), &[(200, 100, 80, 60)])),
        ];
        let result = detector().detect(frames);

        assert_eq!(result.len(), 1);
        let boxes = result.boxes_for(1);
        assert_eq!(boxes.len(), 1);
        // blur keeps the step above threshold ~4 px out, dilation adds 2
        assert_eq!(boxes[0], BoundingBox { x: 194, y: 94, width: 92, height: 72 });
        assert_encloses(&boxes[0], (200, 100, 80, 60), 8);
    }

    #[test]
    fn test_separate_changes_in_discovery_order() {
        let frames = vec![
            Frame::new(0, background(500, 300)),
            Frame::new(
                1,
                with_blocks(background(500, 300), &[(50, 180, 60, 60), (300, 40, 60, 60)]),
            ),
        ];
        let result = detector().detect(frames);
        let boxes = result.boxes_for(1);

        assert_eq!(boxes.len(), 2);
        assert_encloses(&boxes[0], (300, 40, 60, 60), 8);
        assert_encloses(&boxes[1], (50, 180, 60, 60), 8);
    }

    #[test]
    fn test_reference_is_never_replaced() {
        let moved = || with_blocks(background(500, 300), &[(200, 100, 80, 60)]);
        let frames = vec![
            Frame::new(0, background(500, 300)),
            Frame::new(1, moved()),
            Frame::new(2, background(500, 300)),
            Frame::new(3, moved()),
        ];
        let result = detector().detect(frames);

        let indices: Vec<u64> = result.iter().map(|d| d.frame_index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert!(result.boxes_for(2).is_empty());
    }

    #[test]
    fn test_frames_are_resized_to_working_width() {
        let frames = vec![
            Frame::new(0, background(1000, 600)),
            Frame::new(1, with_blocks(background(1000, 600), &[(400, 200, 160, 120)])),
        ];
        let result = detector().detect(frames);

        let boxes = result.boxes_for(1);
        assert_eq!(boxes.len(), 1);
        // resampling softens the edge by up to one more pixel
        assert_encloses(&boxes[0], (200, 100, 80, 60), 9);
        assert!(boxes[0].x + boxes[0].width <= 500);
    }

    #[test]
    fn test_size_mismatch_is_skipped() {
        let mut run_detector = detector();
        run_detector.config.working_width = 100;
        let mut run = run_detector.start_run();

        run.process(&Frame::new(0, background(200, 100)));
        let changed = with_blocks(background(200, 200), &[(0, 0, 200, 200)]);
        assert!(run.process(&Frame::new(1, changed)).is_none());
        assert!(run.has_reference());
        assert!(run.finish().is_empty());
    }

    #[test]
    fn test_out_of_order_frames_are_ignored() {
        let detector = detector();
        let mut run = detector.start_run();
        let moved = with_blocks(background(500, 300), &[(200, 100, 80, 60)]);

        run.process(&Frame::new(3, background(500, 300)));
        assert!(run.process(&Frame::new(5, moved.clone())).is_some());
        assert!(run.process(&Frame::new(4, moved)).is_none());

        let indices: Vec<u64> = run.finish().iter().map(|d| d.frame_index).collect();
        assert_eq!(indices, vec![5]);
    }

    #[test]
    fn test_boxes_for_missing_index_is_empty() {
        let result = DetectionResult::new();
        assert!(result.boxes_for(42).is_empty());
        assert_eq!(result.total_boxes(), 0);
    }

    #[test]
    fn test_detect_store_skips_corrupt_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let store = FrameStore::new(temp_dir.path(), ArtifactFormat::Png);
        let moved = with_blocks(background(500, 300), &[(200, 100, 80, 60)]);

        std::fs::write(store.artifact_path(0), b"not an image").unwrap();
        store.write(&Frame::new(1, background(500, 300))).unwrap();
        std::fs::write(store.artifact_path(2), b"still not an image").unwrap();
        store.write(&Frame::new(3, moved)).unwrap();

        let result = detector().detect_store(&store).unwrap();

        let indices: Vec<u64> = result.iter().map(|d| d.frame_index).collect();
        assert_eq!(indices, vec![3]);
        let boxes = result.boxes_for(3);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], BoundingBox { x: 194, y: 94, width: 92, height: 72 });
    }

    #[test]
    fn test_detect_store_on_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = FrameStore::new(temp_dir.path().join("absent"), ArtifactFormat::Jpg);
        assert!(detector().detect_store(&store).unwrap().is_empty());
    }
}
