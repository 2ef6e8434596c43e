//! FFmpeg command-line backend: `ffprobe` for container metadata, `ffmpeg` piping raw RGB frames

use super::{FrameDecoder, VideoBackend, VideoHandle, VideoProperties};
use crate::error::{MotionError, Result};
use image::RgbImage;
use std::ffi::OsString;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::debug;

/// Probes and decodes videos with the `ffprobe` / `ffmpeg` binaries on `PATH`
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

impl VideoBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> Result<VideoProperties> {
        let output = Command::new("ffprobe")
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_format",
                "-show_streams",
                "-select_streams", "v:0",
            ])
            .arg(path)
            .output()
            .map_err(|e| MotionError::Open {
                path: path.to_path_buf(),
                reason: format!("failed to run ffprobe: {}", e),
            })?;

        if !output.status.success() {
            return Err(MotionError::Open {
                path: path.to_path_buf(),
                reason: format!("ffprobe exited with {}", output.status),
            });
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&json_str).map_err(|reason| MotionError::Open {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn open_decoder(&self, handle: &VideoHandle) -> Result<Box<dyn FrameDecoder>> {
        Ok(Box::new(FfmpegDecoder::spawn(handle)?))
    }
}

/// Parse `ffprobe -print_format json -show_streams -show_format` output
pub fn parse_probe_output(json_str: &str) -> std::result::Result<VideoProperties, String> {
    let ffprobe_data: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| format!("invalid ffprobe output: {}", e))?;

    let video_stream = ffprobe_data["streams"]
        .as_array()
        .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
        .ok_or_else(|| "no video stream found".to_string())?;

    let frame_rate = parse_rate(video_stream["r_frame_rate"].as_str())
        .filter(|fps| *fps > 0.0)
        .or_else(|| parse_rate(video_stream["avg_frame_rate"].as_str()))
        .unwrap_or(0.0);

    // nb_frames is missing for many containers; 0 means unknown
    let total_frame_count = video_stream["nb_frames"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    Ok(VideoProperties {
        frame_rate,
        total_frame_count,
        width: video_stream["width"].as_u64().unwrap_or(0) as u32,
        height: video_stream["height"].as_u64().unwrap_or(0) as u32,
        codec: video_stream["codec_name"]
            .as_str()
            .unwrap_or("unknown")
            .to_string(),
        rotation: parse_rotation(video_stream),
    })
}

/// Display rotation in degrees, from the display matrix side data or the
/// legacy `rotate` tag. 0 when absent.
fn parse_rotation(video_stream: &serde_json::Value) -> i32 {
    let from_side_data = video_stream["side_data_list"]
        .as_array()
        .and_then(|list| list.iter().find_map(|entry| entry["rotation"].as_i64()));

    let from_tag = || {
        video_stream["tags"]["rotate"]
            .as_str()
            .and_then(|s| s.trim().parse::<i64>().ok())
    };

    from_side_data.or_else(from_tag).unwrap_or(0) as i32
}

/// Parse "30000/1001" or "25" into frames per second
fn parse_rate(rate: Option<&str>) -> Option<f64> {
    let rate = rate?;
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                Some(0.0)
            } else {
                Some(num / den)
            }
        }
        None => rate.trim().parse().ok(),
    }
}

/// Arguments for decoding `path` to rgb24 on stdout. Frames keep the stored
/// geometry (no display rotation) and every decoded frame is emitted once,
/// without frame-rate duplication or drops.
pub fn decoder_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_os_string());
    args.extend(
        ["-fps_mode", "passthrough", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]
            .iter()
            .map(OsString::from),
    );
    args
}

/// A running `ffmpeg` process writing rgb24 frames to its stdout.
/// The child is killed and reaped when the decoder is dropped.
pub struct FfmpegDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    frame_len: usize,
}

impl FfmpegDecoder {
    pub fn spawn(handle: &VideoHandle) -> Result<Self> {
        if handle.width == 0 || handle.height == 0 {
            return Err(MotionError::Open {
                path: handle.path.clone(),
                reason: "video stream reports no frame size".to_string(),
            });
        }

        let mut child = Command::new("ffmpeg")
            .args(decoder_args(&handle.path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MotionError::Open {
                path: handle.path.clone(),
                reason: format!("failed to start ffmpeg: {}", e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| MotionError::Open {
            path: handle.path.clone(),
            reason: "ffmpeg stdout unavailable".to_string(),
        })?;

        debug!(
            "🎞️ Decoder started for {} (stored {}x{}, rotation {}°)",
            handle.path.display(),
            handle.width,
            handle.height,
            handle.rotation
        );

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            width: handle.width,
            height: handle.height,
            frame_len: handle.width as usize * handle.height as usize * 3,
        })
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn read_frame(&mut self) -> Result<RgbImage> {
        let mut buffer = vec![0u8; self.frame_len];
        self.stdout
            .read_exact(&mut buffer)
            .map_err(|e| MotionError::Decode(e.to_string()))?;

        RgbImage::from_raw(self.width, self.height, buffer)
            .ok_or_else(|| MotionError::Decode("frame buffer size mismatch".to_string()))
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("🗑️ Decoder released");
    }
}
