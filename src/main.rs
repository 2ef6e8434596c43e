use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use motion_analyzer_rust::report::{report_base, DetectionReport};
use motion_analyzer_rust::{Config, FrameSource, FrameStore, MotionDetector, MotionPipeline};

fn cli() -> Command {
    Command::new("Motion Analyzer (Rust)")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Resilient frame extraction and motion detection for recorded video")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)")
                .global(true)
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Output directory for reports")
                .global(true)
        )
        .arg(
            Arg::new("frames-dir")
                .short('f')
                .long("frames-dir")
                .value_name("DIR")
                .help("Root directory for extracted frames")
                .global(true)
        )
        .arg(
            Arg::new("min-area")
                .short('a')
                .long("min-area")
                .value_name("PX")
                .help("Minimum contour area reported as motion")
                .global(true)
        )
        .arg(
            Arg::new("width")
                .short('w')
                .long("width")
                .value_name("PX")
                .help("Working width frames are resized to")
                .global(true)
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
                .global(true)
        )
        .subcommand(
            Command::new("run")
                .about("Extract frames, detect motion and write the report")
                .arg(Arg::new("video").value_name("VIDEO").required(true))
        )
        .subcommand(
            Command::new("extract")
                .about("Extract frames only")
                .arg(Arg::new("video").value_name("VIDEO").required(true))
        )
        .subcommand(
            Command::new("detect")
                .about("Detect motion in an already extracted frame directory")
                .arg(Arg::new("frames").value_name("FRAMES_DIR").required(true))
        )
        .subcommand(
            Command::new("batch")
                .about("Process every video in a directory")
                .arg(Arg::new("dir").value_name("DIR").required(true))
        )
}

/// Command-line overrides win over file and environment settings
fn apply_overrides(config: &mut Config, matches: &ArgMatches) -> Result<()> {
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        config.output.base_dir = PathBuf::from(dir);
    }
    if let Some(dir) = matches.get_one::<String>("frames-dir") {
        config.extraction.frames_dir = PathBuf::from(dir);
    }
    if let Some(area) = matches.get_one::<String>("min-area") {
        config.detection.min_area = area.parse()?;
    }
    if let Some(width) = matches.get_one::<String>("width") {
        config.detection.working_width = width.parse()?;
    }
    Ok(())
}

fn path_arg(matches: &ArgMatches, id: &str) -> Result<PathBuf> {
    matches
        .get_one::<String>(id)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("missing argument: {}", id))
}

fn run_command(config: Config, command: &str, args: &ArgMatches) -> Result<()> {
    let output_dir = config.output.base_dir.clone();

    match command {
        "run" => {
            let video = path_arg(args, "video")?;
            let analysis = MotionPipeline::new(config).process_video(&video, &output_dir)?;
            info!("📊 Frames extracted: {}", analysis.extraction.extracted);
            info!("⏭️ Frames skipped: {}", analysis.extraction.skipped);
            info!("🎯 Frames with motion: {}", analysis.detections.len());
            for report in &analysis.reports {
                info!("📝 Report: {}", report.display());
            }
        }
        "extract" => {
            let video = path_arg(args, "video")?;
            let source = FrameSource::new(config.extraction);
            let destination = source.destination_for(&video);
            let summary = source.extract_video(&video, &destination)?;
            info!(
                "📁 Frames in {}: {} extracted, {} skipped",
                summary.destination.display(),
                summary.extracted,
                summary.skipped
            );
        }
        "detect" => {
            let frames_dir = path_arg(args, "frames")?;
            detect_directory(&config, &frames_dir, &output_dir)?;
        }
        "batch" => {
            let input_dir = path_arg(args, "dir")?;
            if !input_dir.exists() {
                return Err(anyhow::anyhow!("Input directory not found: {}", input_dir.display()));
            }

            let results = MotionPipeline::new(config).process_directory(&input_dir, &output_dir)?;
            info!("🎉 Processing completed in {:.2}s", results.total_time.as_secs_f64());
            info!("✅ Successful: {}", results.successful);
            info!("❌ Failed: {}", results.failed);
            info!("📊 Success rate: {:.1}%",
                if results.total > 0 {
                    results.successful as f64 / results.total as f64 * 100.0
                } else {
                    0.0
                }
            );
        }
        other => return Err(anyhow::anyhow!("unknown command: {}", other)),
    }

    Ok(())
}

fn detect_directory(config: &Config, frames_dir: &Path, output_dir: &Path) -> Result<()> {
    let store = FrameStore::new(frames_dir, config.extraction.artifact_format);
    let result = MotionDetector::new(config.detection.clone()).detect_store(&store)?;

    let name = frames_dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "frames".to_string());
    let report = DetectionReport::new(name, result);
    report.write(&report_base(output_dir, frames_dir), &config.output.export_formats)?;

    info!("🎯 Frames with motion: {}", report.frames_with_motion);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);

    let loaded = match &config_path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    // Initialize logging
    let level = if verbose {
        "debug".to_string()
    } else {
        loaded
            .as_ref()
            .map(|c| c.output.log_level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("motion_analyzer_rust={},motion_analyzer={},warn", level, level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if verbose {
        info!("Verbose logging enabled");
    }

    // Load configuration
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) if config_path.is_some() => return Err(e.into()),
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    };
    apply_overrides(&mut config, &matches)?;
    config.validate()?;

    info!("🚀 Motion Analyzer (Rust) starting...");
    info!("📁 Frames directory: {}", config.extraction.frames_dir.display());
    info!("📂 Output directory: {}", config.output.base_dir.display());

    let (command, args) = matches
        .subcommand()
        .ok_or_else(|| anyhow::anyhow!("no command given"))?;
    let command = command.to_string();
    let args = args.clone();

    // Extraction sleeps between retries; keep it off the async workers
    let start_time = std::time::Instant::now();
    tokio::task::spawn_blocking(move || run_command(config, &command, &args)).await??;

    info!("⏱️ Finished in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}
