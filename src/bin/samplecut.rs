// Command-line front end: runs the audio/video pipelines and their helper commands
// against a project directory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::error;

use samplecut::opts::DEFAULT_TARGET_DBFS;
use samplecut::orchestrator::SourceExtractionReport;
use samplecut::source::MediaLoader;
use samplecut::tool::FfmpegTool;
use samplecut::{
    FailurePolicy, Opts, Orchestrator, Paths, PipelineKind, RunReport, SilencePolicy,
};

#[derive(Parser, Debug)]
#[command(name = "samplecut")]
#[command(about = "Extract loudness-normalized samples from videos using a JSON manifest")]
struct Params {
    #[command(flatten)]
    layout: Layout,

    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Cut normalized audio samples (and export them for the device if requested).
    Audio,

    /// Cut video samples with normalized audio.
    Video,

    /// Extract the audio track of every source video.
    ExtractSources,

    /// List source videos no sample refers to.
    Unused,
}

/// Directory layout. Every path defaults to a conventional name below `--root`.
#[derive(Args, Debug)]
struct Layout {
    /// Project directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[arg(long, global = true)]
    videos_dir: Option<PathBuf>,

    /// Directory holding the audio extracted from each source video.
    #[arg(long, global = true)]
    audio_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    samples_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    video_samples_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    device_dir: Option<PathBuf>,

    #[arg(short = 'm', long, global = true)]
    manifest: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct Tuning {
    /// Loudness every sample is normalized to, in dBFS.
    #[arg(long, global = true, default_value_t = DEFAULT_TARGET_DBFS, allow_negative_numbers = true)]
    target_dbfs: f64,

    /// Video CRF (25 good, 28 medium, 35+ low). `-1` keeps the encoder's default.
    #[arg(short = 'q', long, global = true, default_value_t = -1, allow_negative_numbers = true)]
    quality: i32,

    /// Batches processed in parallel. `0` uses every CPU.
    #[arg(short = 'j', long, global = true, default_value_t = 1)]
    jobs: usize,

    /// Cap the normalization gain (dB). Without it silent samples are left untouched.
    #[arg(long, global = true)]
    max_gain_db: Option<f64>,

    #[arg(long, global = true, value_enum, default_value_t = FailurePolicy::Skip)]
    on_failure: FailurePolicy,

    /// Kill an ffmpeg invocation after this many seconds. `0` disables the limit.
    #[arg(long, global = true, default_value_t = 300)]
    timeout_secs: u64,

    /// ffmpeg executable.
    #[arg(long, global = true, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Extension of the extracted source audio files.
    #[arg(long, global = true, default_value = "mp3")]
    source_ext: String,
}

impl Layout {
    fn paths(&self) -> Paths {
        let mut paths = Paths::under(&self.root);
        let overrides = [
            (&self.videos_dir, &mut paths.videos_dir),
            (&self.audio_dir, &mut paths.source_audio_dir),
            (&self.samples_dir, &mut paths.audio_output_dir),
            (&self.video_samples_dir, &mut paths.video_output_dir),
            (&self.device_dir, &mut paths.device_dir),
            (&self.manifest, &mut paths.manifest_path),
        ];
        for (flag, slot) in overrides {
            if let Some(path) = flag {
                slot.clone_from(path);
            }
        }
        paths
    }
}

impl Tuning {
    fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    fn opts(&self) -> Opts {
        Opts {
            target_dbfs: self.target_dbfs,
            video_quality: self.quality,
            jobs: self.jobs,
            silence: match self.max_gain_db {
                Some(max_gain_db) => SilencePolicy::ClampGain { max_gain_db },
                None => SilencePolicy::PassThrough,
            },
            on_failure: self.on_failure,
            tool_timeout: self.timeout(),
            source_audio_extension: self.source_ext.trim_start_matches('.').to_owned(),
        }
    }
}

fn main() -> ExitCode {
    samplecut::init_logging();

    match run(Params::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "samplecut failed");
            ExitCode::FAILURE
        }
    }
}

fn run(params: Params) -> Result<()> {
    let opts = params.tuning.opts();
    let tool = FfmpegTool::new(&params.tuning.ffmpeg).with_timeout(opts.tool_timeout);
    let orchestrator = Orchestrator::with_parts(params.layout.paths(), opts, tool, MediaLoader);

    match params.command {
        Command::Audio => run_pipeline(&orchestrator, PipelineKind::Audio),
        Command::Video => run_pipeline(&orchestrator, PipelineKind::Video),
        Command::ExtractSources => {
            let pb = progress_bar();
            let report = orchestrator
                .extract_sources(&pb)
                .context("source extraction failed")?;
            print_extraction(&report);
            Ok(())
        }
        Command::Unused => {
            let unused = orchestrator
                .unreferenced_sources()
                .context("failed to list unreferenced videos")?;
            println!("{} unused video(s)", unused.len());
            for name in unused {
                println!("  {name}");
            }
            Ok(())
        }
    }
}

fn run_pipeline(
    orchestrator: &Orchestrator<FfmpegTool, MediaLoader>,
    kind: PipelineKind,
) -> Result<()> {
    let pb = progress_bar();
    let report = orchestrator
        .run(kind, &pb)
        .with_context(|| format!("{kind:?} run failed"))?;
    print_report(&report);
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let template = "Processing {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}<{eta}]";
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn print_report(report: &RunReport) {
    if report.cancelled {
        println!("Run cancelled.");
    }

    for failure in &report.failed_batches {
        println!(
            "skipped {} sample(s) from '{}': {}",
            failure.samples, failure.source_name, failure.error
        );
    }
    for failure in &report.failed_samples {
        println!("failed '{}': {}", failure.output_name, failure.error);
    }
    if !report.device_files.is_empty() {
        println!("{} file(s) exported for the device", report.device_files.len());
    }

    println!(
        "Terminated in {} sec! ({} produced, {} failed)",
        report.elapsed_secs_truncated(),
        report.produced.len(),
        report.failed_samples.len()
            + report.failed_batches.iter().map(|b| b.samples).sum::<usize>()
    );
}

fn print_extraction(report: &SourceExtractionReport) {
    for (video, err) in &report.failed {
        println!("failed '{}': {err}", video.display());
    }
    println!(
        "{} source(s) extracted, {} failed",
        report.extracted.len(),
        report.failed.len()
    );
}
