//! Error taxonomy for extraction, storage and detection

use std::path::PathBuf;

/// Result type for motion analyzer operations
pub type Result<T> = std::result::Result<T, MotionError>;

/// Error types for motion analyzer operations
#[derive(thiserror::Error, Debug)]
pub enum MotionError {
    #[error("Video not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(
        "Video {} is too large ({size_bytes} bytes, limit {limit_bytes} bytes); resize it, cut its length, lower its fps or raise max_video_size_gb",
        path.display()
    )]
    SizeLimit {
        path: PathBuf,
        size_bytes: u64,
        limit_bytes: u64,
    },

    #[error("Could not open video {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("Unsupported or corrupted video {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("Too many consecutive frame failures ({consecutive}) ending at frame {index}; aborting")]
    TooManyFailures { index: u64, consecutive: u32 },

    #[error("Corrupt frame artifact {}: {reason}", path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MotionError {
    /// Input and configuration failures surface before any frame is processed
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            MotionError::NotFound(_)
                | MotionError::SizeLimit { .. }
                | MotionError::Open { .. }
                | MotionError::UnsupportedFormat { .. }
                | MotionError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_classification() {
        assert!(MotionError::NotFound(PathBuf::from("a.mp4")).is_input_error());
        assert!(MotionError::Config("bad".to_string()).is_input_error());
        assert!(!MotionError::TooManyFailures { index: 7, consecutive: 4 }.is_input_error());
        assert!(!MotionError::Decode("eof".to_string()).is_input_error());
    }

    #[test]
    fn test_error_messages_name_the_path() {
        let err = MotionError::SizeLimit {
            path: PathBuf::from("big.mp4"),
            size_bytes: 10,
            limit_bytes: 5,
        };
        let message = err.to_string();
        assert!(message.contains("big.mp4"));
        assert!(message.contains("max_video_size_gb"));
    }
}
