use std::{path::PathBuf, sync::Arc};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use clipcast::{
    AnimatedImageOptions, ClipError, CodecProfile, ExportConfig, ExportOptions, ExportRequest,
    FfmpegLogLevel, ProgressCallback, ProgressInfo, SourceClip, TimeRange, TranscodeJob,
    VideoOptions,
};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  clipcast probe recording.mov --json\n  clipcast gif recording.mov --start 1.2 --end 5.4 --out-dir exports --fps 15\n  clipcast video recording.mov --start 0:05 --end 0:20 --out-dir exports --profile hevc --progress\n  clipcast completions zsh > _clipcast";

#[derive(Debug, Parser)]
#[command(
    name = "clipcast",
    version,
    about = "Export trimmed screen-recording clips as GIFs or compact videos",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Print the derived export plan before running.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while exporting.
    #[arg(long, global = true)]
    progress: bool,

    /// FFmpeg log level (quiet, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<FfmpegLogLevel>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print what the exporter sees in a recording.
    #[command(
        about = "Print source clip metadata",
        visible_alias = "info",
        after_help = "Examples:\n  clipcast probe recording.mov\n  clipcast probe recording.mov --json"
    )]
    Probe {
        /// Source recording.
        input: PathBuf,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export a range as an animated GIF.
    #[command(
        about = "Export an animated GIF",
        after_help = "Examples:\n  clipcast gif recording.mov --start 1.2 --end 5.4 --out-dir exports\n  clipcast gif recording.mov --start 0 --end 3 --out-dir exports --max-dimension 320 --once"
    )]
    Gif {
        /// Source recording.
        input: PathBuf,
        /// Range start (seconds, MM:SS, or HH:MM:SS).
        #[arg(long, default_value = "0")]
        start: String,
        /// Range end (seconds, MM:SS, or HH:MM:SS). Defaults to the end of the clip.
        #[arg(long)]
        end: Option<String>,
        /// Directory that receives the GIF.
        #[arg(long)]
        out_dir: PathBuf,
        /// Frames per second.
        #[arg(long, default_value_t = 15)]
        fps: u32,
        /// Longest output edge in pixels.
        #[arg(long, default_value_t = 640)]
        max_dimension: u32,
        /// Play once instead of looping forever.
        #[arg(long)]
        once: bool,
    },

    /// Export a range as an MP4 video.
    #[command(
        about = "Export a compact video",
        after_help = "Examples:\n  clipcast video recording.mov --start 0:05 --end 0:20 --out-dir exports\n  clipcast video recording.mov --out-dir exports --width 1280 --height 720 --profile mpeg4"
    )]
    Video {
        /// Source recording.
        input: PathBuf,
        /// Range start (seconds, MM:SS, or HH:MM:SS).
        #[arg(long, default_value = "0")]
        start: String,
        /// Range end (seconds, MM:SS, or HH:MM:SS). Defaults to the end of the clip.
        #[arg(long)]
        end: Option<String>,
        /// Directory that receives the video.
        #[arg(long)]
        out_dir: PathBuf,
        /// Requested frames per second, capped by the source's real rate.
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Maximum output width.
        #[arg(long, default_value_t = 1920)]
        width: u32,
        /// Maximum output height.
        #[arg(long, default_value_t = 1080)]
        height: u32,
        /// Encoder profile: fast (h264) | efficient (hevc) | compatible (mpeg4).
        #[arg(long, default_value = "fast")]
        profile: String,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse seconds, `MM:SS(.fff)`, or `HH:MM:SS(.fff)` into seconds.
fn parse_timecode(value: &str) -> Result<f64, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(seconds.max(0.0));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    Ok(((hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds).max(0.0))
}

fn parse_range(start: &str, end: Option<&str>) -> Result<TimeRange, Box<dyn std::error::Error>> {
    let start = parse_timecode(start)?;
    // An open end is clamped to the clip's duration.
    let end = end.map(parse_timecode).transpose()?.unwrap_or(f64::INFINITY);
    Ok(TimeRange::new(start, end))
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(seconds) = info.output_timestamp {
            self.bar.set_message(format!("{seconds:.1}s"));
        }
    }
}

fn apply_global_options(global: &GlobalOptions) {
    if let Some(level) = global.log_level {
        clipcast::set_ffmpeg_log_level(level);
    }
}

fn print_plan(job: &TranscodeJob) {
    let clip = job.clip();
    let range = job.range();
    let plan = job.plan();
    eprintln!(
        "{} {} ({}, {}, {:.2}s)",
        "source".cyan().bold(),
        clip.path.display(),
        clip.codec,
        clip.natural_size,
        clip.duration
    );
    eprintln!(
        "{} [{:.3}s, {:.3}s] -> {} frames at {} fps",
        "range".cyan().bold(),
        range.start,
        range.end,
        job.expected_frames(),
        job.output_fps()
    );
    eprintln!(
        "{} {} (scale {:.4}, {:?})",
        "render".cyan().bold(),
        plan.output_size,
        plan.scale,
        plan.orientation
    );
}

fn export(
    global: &GlobalOptions,
    request: ExportRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let job = TranscodeJob::prepare(&request)?;
    if global.verbose {
        print_plan(&job);
    }

    let mut config = ExportConfig::new();
    let progress = if global.progress {
        let progress = Arc::new(TerminalProgress::new()?);
        config = config.with_progress(progress.clone()).with_batch_size(1);
        Some(progress)
    } else {
        None
    };

    let result = job.run(&config);
    if let Some(progress) = progress {
        progress.finish();
    }
    let artifact = result?;

    println!("{}", artifact.path.display());
    if global.verbose {
        eprintln!("{} {} bytes", "size".cyan().bold(), artifact.byte_size);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global);

    match cli.command {
        Commands::Probe { input, json } => {
            let clip = SourceClip::probe(&input)?;
            let oriented = clip.oriented_size();
            if json {
                let payload = json!({
                    "path": clip.path.display().to_string(),
                    "duration_seconds": clip.duration,
                    "video_stream_index": clip.video_stream_index,
                    "width": clip.natural_size.width,
                    "height": clip.natural_size.height,
                    "display_width": oriented.width,
                    "display_height": oriented.height,
                    "rotation_degrees": u32::from(clip.orientation.quarter_turns) * 90,
                    "mirrored": clip.orientation.mirrored,
                    "nominal_fps": clip.nominal_frame_rate,
                    "codec": clip.codec,
                    "has_audio": clip.has_audio,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Duration: {:.3}s", clip.duration);
                println!(
                    "Video: {} (displayed {}) @ {:.2} fps [{}]",
                    clip.natural_size, oriented, clip.nominal_frame_rate, clip.codec
                );
                println!("Orientation: {:?}", clip.orientation);
                println!("Audio: {}", if clip.has_audio { "present (not exported)" } else { "none" });
            }
        }
        Commands::Gif {
            input,
            start,
            end,
            out_dir,
            fps,
            max_dimension,
            once,
        } => {
            let options = AnimatedImageOptions::new()
                .fps(fps)
                .max_pixel_dimension(max_dimension)
                .loop_forever(!once);
            let range = parse_range(&start, end.as_deref())?;
            let request =
                ExportRequest::new(input, range, out_dir, ExportOptions::AnimatedImage(options));
            export(&cli.global, request)?;
        }
        Commands::Video {
            input,
            start,
            end,
            out_dir,
            fps,
            width,
            height,
            profile,
        } => {
            let profile = CodecProfile::parse(&profile)
                .ok_or(format!("unsupported --profile: {profile}"))?;
            let options = VideoOptions::new()
                .target_fps(fps)
                .max_render_size(width, height)
                .codec_profile(profile);
            let range = parse_range(&start, end.as_deref())?;
            let request = ExportRequest::new(input, range, out_dir, ExportOptions::Video(options));
            export(&cli.global, request)?;
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "clipcast", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        let caller_error = error
            .downcast_ref::<ClipError>()
            .is_some_and(ClipError::is_caller_error);
        std::process::exit(if caller_error { 2 } else { 1 });
    }
}
