use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{MotionError, Result};
use crate::store::ArtifactFormat;

/// Configuration for the Motion Analyzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame extraction settings
    pub extraction: ExtractionConfig,

    /// Motion detection settings
    pub detection: DetectionConfig,

    /// Output and report settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Root directory for extracted frames; each video gets a subdirectory named after its file
    pub frames_dir: PathBuf,

    /// Resolution hint: videos narrower than this are logged as low resolution
    pub min_width: u32,

    /// Resolution hint: videos shorter than this are logged as low resolution
    pub min_height: u32,

    /// Maximum container size in GiB, checked before decoding
    pub max_video_size_gb: f64,

    /// Image format used for frame artifacts
    pub artifact_format: ArtifactFormat,

    /// Only a completion marker counts as a finished extraction.
    /// When false, any non-empty destination is treated as done.
    pub require_completion_marker: bool,

    /// Video extensions picked up by batch discovery
    pub supported_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Width frames are resized to before differencing (aspect ratio preserved)
    pub working_width: u32,

    /// Minimum contour area in px² for a region to count as motion
    pub min_area: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Base output directory for reports
    pub base_dir: PathBuf,

    /// Report formats to write
    pub export_formats: Vec<ExportFormat>,

    /// Log level
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Text,
    JSON,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::JSON => "json",
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("frames"),
            min_width: 640,
            min_height: 360,
            max_video_size_gb: 1.0,
            artifact_format: ArtifactFormat::Jpg,
            require_completion_marker: true,
            supported_extensions: vec![
                "mp4".to_string(),
                "mkv".to_string(),
                "avi".to_string(),
                "mov".to_string(),
                "webm".to_string(),
                "m4v".to_string(),
            ],
        }
    }
}

impl ExtractionConfig {
    /// Size ceiling in bytes
    pub fn max_video_size_bytes(&self) -> u64 {
        (self.max_video_size_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            working_width: 500,
            min_area: 500.0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./output"),
            export_formats: vec![ExportFormat::Text],
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, then the environment
    pub fn load() -> Result<Self> {
        let config_paths = [
            "motion-analyzer.toml",
            "config/motion-analyzer.toml",
            "/etc/motion-analyzer/config.toml",
        ];

        for path in &config_paths {
            if Path::new(path).exists() {
                match Self::load_from(Path::new(path)) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from a specific TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(min_area) = std::env::var("MOTION_ANALYZER_MIN_AREA") {
            config.detection.min_area = min_area
                .parse()
                .map_err(|_| MotionError::Config(format!("invalid MOTION_ANALYZER_MIN_AREA: {}", min_area)))?;
        }

        if let Ok(width) = std::env::var("MOTION_ANALYZER_WORKING_WIDTH") {
            config.detection.working_width = width
                .parse()
                .map_err(|_| MotionError::Config(format!("invalid MOTION_ANALYZER_WORKING_WIDTH: {}", width)))?;
        }

        if let Ok(size) = std::env::var("MOTION_ANALYZER_MAX_VIDEO_SIZE_GB") {
            config.extraction.max_video_size_gb = size
                .parse()
                .map_err(|_| MotionError::Config(format!("invalid MOTION_ANALYZER_MAX_VIDEO_SIZE_GB: {}", size)))?;
        }

        if let Ok(frames_dir) = std::env::var("MOTION_ANALYZER_FRAMES_DIR") {
            config.extraction.frames_dir = PathBuf::from(frames_dir);
        }

        if let Ok(output_dir) = std::env::var("MOTION_ANALYZER_OUTPUT_DIR") {
            config.output.base_dir = PathBuf::from(output_dir);
        }

        if let Ok(log_level) = std::env::var("MOTION_ANALYZER_LOG_LEVEL") {
            config.output.log_level = log_level;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| MotionError::Config(format!("cannot serialize configuration: {}", e)))?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.detection.working_width == 0 {
            return Err(MotionError::Config("working_width must be greater than 0".to_string()));
        }

        if !self.detection.min_area.is_finite() || self.detection.min_area < 0.0 {
            return Err(MotionError::Config("min_area must be a non-negative number".to_string()));
        }

        if self.extraction.max_video_size_gb.is_nan() || self.extraction.max_video_size_gb <= 0.0 {
            return Err(MotionError::Config("max_video_size_gb must be greater than 0".to_string()));
        }

        if self.output.export_formats.is_empty() {
            return Err(MotionError::Config("at least one export format is required".to_string()));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Motion Analyzer Configuration:\n\
            - Frames Directory: {}\n\
            - Artifact Format: {}\n\
            - Max Video Size: {:.2} GiB\n\
            - Working Width: {}px\n\
            - Min Area: {}px²\n\
            - Output Directory: {}\n\
            - Export Formats: {:?}",
            self.extraction.frames_dir.display(),
            self.extraction.artifact_format.extension(),
            self.extraction.max_video_size_gb,
            self.detection.working_width,
            self.detection.min_area,
            self.output.base_dir.display(),
            self.output.export_formats
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_frames_dir(mut self, dir: PathBuf) -> Self {
        self.config.extraction.frames_dir = dir;
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.base_dir = dir;
        self
    }

    pub fn with_min_area(mut self, min_area: f64) -> Self {
        self.config.detection.min_area = min_area;
        self
    }

    pub fn with_working_width(mut self, width: u32) -> Self {
        self.config.detection.working_width = width;
        self
    }

    pub fn with_max_video_size_gb(mut self, size_gb: f64) -> Self {
        self.config.extraction.max_video_size_gb = size_gb;
        self
    }

    pub fn with_artifact_format(mut self, format: ArtifactFormat) -> Self {
        self.config.extraction.artifact_format = format;
        self
    }

    pub fn require_completion_marker(mut self, require: bool) -> Self {
        self.config.extraction.require_completion_marker = require;
        self
    }

    pub fn with_export_formats(mut self, formats: Vec<ExportFormat>) -> Self {
        self.config.output.export_formats = formats;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
