//! Full-run lifecycle for the audio and video pipelines.
//!
//! A run clears the pipeline's output directory, loads the manifest, groups the
//! runnable samples into per-source batches and drives every batch through
//! load -> extract -> export. Batches are independent, so they run on a rayon
//! pool sized by `jobs`; each worker holds at most one decoded source at a time.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::device::export_for_device;
use crate::exporter::{check_tool_result, export_audio, export_video};
use crate::extractor::{ExtractSettings, extract_audio, video_gain};
use crate::fs_util::{clear_dir, list_files, require_dir};
use crate::manifest::{Manifest, PipelineKind, Sample};
use crate::opts::{FailurePolicy, Opts};
use crate::planner::{Batch, plan_batches};
use crate::progress::Progress;
use crate::source::{LoadedSource, MediaLoader, SourceLoader};
use crate::tool::{ExternalTool, FfmpegTool};
use crate::transcode::{VideoClipArgs, extract_source_args};
use crate::{Error, Result};

/// Where a run reads its inputs and writes its outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Source videos.
    pub videos_dir: PathBuf,

    /// Audio extracted from each source video (`<video stem>.<ext>`).
    pub source_audio_dir: PathBuf,

    /// Output of the audio pipeline.
    pub audio_output_dir: PathBuf,

    /// Output of the video pipeline.
    pub video_output_dir: PathBuf,

    /// Numbered copies for the playback device.
    pub device_dir: PathBuf,

    pub manifest_path: PathBuf,
}

impl Paths {
    /// The conventional layout below a single project directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            videos_dir: root.join("videos"),
            source_audio_dir: root.join("audio"),
            audio_output_dir: root.join("samples"),
            video_output_dir: root.join("samples_video"),
            device_dir: root.join("device"),
            manifest_path: root.join("samples.json"),
        }
    }

    /// Extracted audio for the video named `source_name`.
    pub fn source_audio(&self, source_name: &str, extension: &str) -> PathBuf {
        self.source_audio_dir
            .join(Path::new(source_name).with_extension(extension))
    }

    pub fn source_video(&self, source_name: &str) -> PathBuf {
        self.videos_dir.join(source_name)
    }

    /// Directory a pipeline writes to (and clears before running).
    pub fn output_dir(&self, kind: PipelineKind) -> &Path {
        match kind {
            PipelineKind::Audio => &self.audio_output_dir,
            PipelineKind::Video => &self.video_output_dir,
        }
    }

    /// Path of the artifact produced for `sample`.
    ///
    /// Video outputs keep the sample's name but always use the `.mp4` extension.
    pub fn output_for(&self, kind: PipelineKind, sample: &Sample) -> PathBuf {
        match kind {
            PipelineKind::Audio => self.audio_output_dir.join(&sample.output_name),
            PipelineKind::Video => self
                .video_output_dir
                .join(Path::new(&sample.output_name).with_extension("mp4")),
        }
    }
}

/// Lifecycle states of a run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Cleaning,
    Loading,
    Planning,
    Extracting,
    DeviceExport,
    Done,
    Failed,
}

/// A sample that could not be produced. Its batch kept going.
#[derive(Debug)]
pub struct SampleFailure {
    pub source_name: String,
    pub output_name: String,
    pub error: Error,
}

/// A batch whose source could not be loaded. None of its samples were produced.
#[derive(Debug)]
pub struct BatchFailure {
    pub source_name: String,
    pub source_path: PathBuf,
    pub samples: usize,
    pub error: Error,
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub kind: PipelineKind,

    /// Written artifacts, in planned order.
    pub produced: Vec<PathBuf>,

    pub failed_samples: Vec<SampleFailure>,
    pub failed_batches: Vec<BatchFailure>,

    /// Numbered device copies; empty unless device export ran.
    pub device_files: Vec<PathBuf>,

    pub elapsed: Duration,

    /// The run stopped early because its cancel flag was raised.
    pub cancelled: bool,

    /// States the run passed through.
    pub visited: Vec<RunState>,
}

impl RunReport {
    /// Wall-clock duration in seconds, truncated to two decimals.
    pub fn elapsed_secs_truncated(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 100.0).floor() / 100.0
    }

    /// No failures and not cancelled.
    pub fn is_clean(&self) -> bool {
        self.failed_samples.is_empty() && self.failed_batches.is_empty() && !self.cancelled
    }
}

/// Outcome of the `extract-sources` command.
#[derive(Debug, Default)]
pub struct SourceExtractionReport {
    pub extracted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, Error)>,
}

/// Drives runs against one directory layout.
///
/// `T` runs the external transcoder and `L` decodes sources; both default to the
/// real implementations and are swapped out in tests.
pub struct Orchestrator<T: ExternalTool = FfmpegTool, L: SourceLoader = MediaLoader> {
    paths: Paths,
    opts: Opts,
    tool: T,
    loader: L,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Use `ffmpeg` from `PATH` and the Symphonia loader.
    pub fn new(paths: Paths, opts: Opts) -> Self {
        let tool = FfmpegTool::default().with_timeout(opts.tool_timeout);
        Self::with_parts(paths, opts, tool, MediaLoader)
    }
}

impl<T: ExternalTool, L: SourceLoader> Orchestrator<T, L> {
    pub fn with_parts(paths: Paths, opts: Opts, tool: T, loader: L) -> Self {
        Self {
            paths,
            opts,
            tool,
            loader,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raising this flag stops the run before its next batch starts.
    ///
    /// The flag is never reset; a cancelled orchestrator stays cancelled.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    /// Run one pipeline end to end.
    ///
    /// Fatal errors (missing directories, bad manifest, device export I/O, or the
    /// first failure under [`FailurePolicy::Strict`]) are returned as `Err`.
    /// Everything else is collected into the [`RunReport`].
    pub fn run(&self, kind: PipelineKind, progress: &dyn Progress) -> Result<RunReport> {
        let started = Instant::now();
        let mut states = StateLog::default();

        let result = self.run_states(kind, progress, &mut states);
        progress.finish();

        match result {
            Ok(mut report) => {
                report.elapsed = started.elapsed();
                report.visited = states.visited;
                tracing::info!(
                    kind = ?kind,
                    produced = report.produced.len(),
                    failed_samples = report.failed_samples.len(),
                    failed_batches = report.failed_batches.len(),
                    secs = report.elapsed_secs_truncated(),
                    "run finished"
                );
                Ok(report)
            }
            Err(err) => {
                states.enter(RunState::Failed);
                tracing::error!(kind = ?kind, error = %err, "run failed");
                Err(err)
            }
        }
    }

    fn run_states(
        &self,
        kind: PipelineKind,
        progress: &dyn Progress,
        states: &mut StateLog,
    ) -> Result<RunReport> {
        states.enter(RunState::Cleaning);
        require_dir(&self.paths.source_audio_dir)?;
        if kind == PipelineKind::Video {
            require_dir(&self.paths.videos_dir)?;
        }
        clear_dir(self.paths.output_dir(kind))?;

        states.enter(RunState::Loading);
        let manifest = Manifest::load(&self.paths.manifest_path)?;
        let samples = manifest.runnable_samples(kind);

        states.enter(RunState::Planning);
        let batches = plan_batches(samples);
        let total: usize = batches.iter().map(Batch::len).sum();
        progress.set_total(total as u64);
        tracing::info!(
            kind = ?kind,
            batches = batches.len(),
            samples = total,
            "planned run"
        );

        states.enter(RunState::Extracting);
        let settings = ExtractSettings {
            target_dbfs: self.opts.target_dbfs,
            to_mono: manifest.normalize_to_mono,
            silence: self.opts.silence,
        };
        let mut outcomes = self.run_batches(kind, &settings, &batches, progress)?;
        let cancelled = self.cancel.load(Ordering::Relaxed) && outcomes.len() < batches.len();

        if self.opts.on_failure == FailurePolicy::Strict {
            if let Some(pos) = outcomes.iter().position(BatchOutcome::has_failures) {
                if let Some(err) = outcomes.swap_remove(pos).into_first_error() {
                    return Err(err);
                }
            }
        }

        let mut report = RunReport {
            kind,
            produced: Vec::new(),
            failed_samples: Vec::new(),
            failed_batches: Vec::new(),
            device_files: Vec::new(),
            elapsed: Duration::ZERO,
            cancelled,
            visited: Vec::new(),
        };
        for outcome in outcomes {
            report.produced.extend(outcome.produced);
            report.failed_samples.extend(outcome.failed_samples);
            report.failed_batches.extend(outcome.batch_failure);
        }

        if cancelled {
            tracing::warn!("run cancelled; remaining batches skipped");
        } else if kind == PipelineKind::Audio && manifest.export_for_device {
            states.enter(RunState::DeviceExport);
            report.device_files =
                export_for_device(&self.paths.audio_output_dir, &self.paths.device_dir)?;
        }

        states.enter(RunState::Done);
        Ok(report)
    }

    /// Process every batch and return the outcomes in planned order.
    ///
    /// Batches skipped because of cancellation or a strict-mode failure are absent.
    /// Under [`FailurePolicy::Strict`] a batch is only skipped when an earlier one
    /// has failed, so the earliest failing batch always runs.
    fn run_batches(
        &self,
        kind: PipelineKind,
        settings: &ExtractSettings,
        batches: &[Batch],
        progress: &dyn Progress,
    ) -> Result<Vec<BatchOutcome>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.opts.worker_count())
            .build()
            .map_err(|e| Error::msg(format!("failed to build worker pool: {e}")))?;
        let strict = self.opts.on_failure == FailurePolicy::Strict;
        let gate = FailureGate::default();

        let outcomes: Vec<Option<BatchOutcome>> = pool.install(|| {
            batches
                .par_iter()
                .enumerate()
                .map(|(i, batch)| {
                    if self.cancel.load(Ordering::Relaxed) || gate.failed_before(i) {
                        return None;
                    }
                    let outcome = self.run_batch(kind, settings, batch, progress);
                    if strict && outcome.has_failures() {
                        gate.record(i);
                    }
                    Some(outcome)
                })
                .collect()
        });

        Ok(outcomes.into_iter().flatten().collect())
    }

    fn run_batch(
        &self,
        kind: PipelineKind,
        settings: &ExtractSettings,
        batch: &Batch,
        progress: &dyn Progress,
    ) -> BatchOutcome {
        let source_path = self
            .paths
            .source_audio(&batch.source_name, &self.opts.source_audio_extension);
        tracing::info!(
            source = %batch.source_name,
            samples = batch.len(),
            "processing batch"
        );

        let loaded = match kind {
            PipelineKind::Video => {
                let video = self.paths.source_video(&batch.source_name);
                if video.is_file() {
                    self.loader.load(&source_path)
                } else {
                    Err(Error::SourceNotFound(video))
                }
            }
            PipelineKind::Audio => self.loader.load(&source_path),
        };

        let source = match loaded {
            Ok(source) => source,
            Err(error) => {
                tracing::error!(
                    source = %batch.source_name,
                    path = %source_path.display(),
                    error = %error,
                    "batch aborted"
                );
                progress.advance(batch.len() as u64);
                return BatchOutcome::aborted(batch, source_path, error);
            }
        };

        let mut outcome = BatchOutcome::default();
        for sample in &batch.samples {
            let output = self.paths.output_for(kind, sample);
            let result = match kind {
                PipelineKind::Audio => self.produce_audio(&source, sample, settings, &output),
                PipelineKind::Video => self.produce_video(&source, sample, settings, &output),
            };

            match result {
                Ok(()) => outcome.produced.push(output),
                Err(error) => {
                    tracing::warn!(
                        sample = %sample.output_name,
                        source = %sample.source_name,
                        error = %error,
                        "sample failed"
                    );
                    outcome.failed_samples.push(SampleFailure {
                        source_name: sample.source_name.clone(),
                        output_name: sample.output_name.clone(),
                        error,
                    });
                }
            }
            progress.advance(1);
        }

        outcome
    }

    fn produce_audio(
        &self,
        source: &LoadedSource,
        sample: &Sample,
        settings: &ExtractSettings,
        output: &Path,
    ) -> Result<()> {
        let extracted = extract_audio(source, sample, settings)?;
        export_audio(&extracted.signal, output, &self.tool)
    }

    fn produce_video(
        &self,
        source: &LoadedSource,
        sample: &Sample,
        settings: &ExtractSettings,
        output: &Path,
    ) -> Result<()> {
        let gain = video_gain(source, sample, settings)?;
        let input = self.paths.source_video(&sample.source_name);
        let clip = VideoClipArgs {
            input: &input,
            output,
            start: sample.start,
            end: sample.end,
            gain_db: gain.gain_db,
            mono: settings.to_mono,
            quality: self.opts.video_quality,
        };
        export_video(&clip, &self.tool)
    }

    /// Extract the audio track of every source video into the source audio directory.
    ///
    /// Per-video failures are collected; only a missing videos directory is fatal.
    pub fn extract_sources(&self, progress: &dyn Progress) -> Result<SourceExtractionReport> {
        require_dir(&self.paths.videos_dir)?;
        fs::create_dir_all(&self.paths.source_audio_dir)?;

        let videos = list_files(&self.paths.videos_dir)?;
        progress.set_total(videos.len() as u64);

        let mut report = SourceExtractionReport::default();
        for video in videos {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }

            let Some(name) = video.file_name().and_then(|n| n.to_str()) else {
                progress.advance(1);
                continue;
            };
            let audio = self
                .paths
                .source_audio(name, &self.opts.source_audio_extension);

            let result = check_tool_result(
                &audio,
                self.tool.run(&extract_source_args(&video, &audio)),
            );
            match result {
                Ok(()) => report.extracted.push(audio),
                Err(err) => {
                    tracing::warn!(video = %video.display(), error = %err, "source extraction failed");
                    report.failed.push((video, err));
                }
            }
            progress.advance(1);
        }

        progress.finish();
        Ok(report)
    }

    /// File names in the videos directory that no manifest sample refers to,
    /// enabled or not. Sorted by name.
    pub fn unreferenced_sources(&self) -> Result<Vec<String>> {
        let manifest = Manifest::load(&self.paths.manifest_path)?;
        let videos = list_files(&self.paths.videos_dir)?;

        Ok(videos
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .filter(|name| !manifest.samples.iter().any(|s| s.source_name == *name))
            .map(str::to_owned)
            .collect())
    }
}

#[derive(Default)]
struct StateLog {
    visited: Vec<RunState>,
}

impl StateLog {
    fn enter(&mut self, state: RunState) {
        let from = self.visited.last().copied().unwrap_or(RunState::Idle);
        if self.visited.is_empty() {
            self.visited.push(RunState::Idle);
        }
        tracing::debug!(from = ?from, to = ?state, "run state");
        self.visited.push(state);
    }
}

/// Lowest index of a batch that failed under the strict policy.
struct FailureGate {
    first_failed: AtomicUsize,
}

impl Default for FailureGate {
    fn default() -> Self {
        Self {
            first_failed: AtomicUsize::new(usize::MAX),
        }
    }
}

impl FailureGate {
    fn record(&self, index: usize) {
        self.first_failed.fetch_min(index, Ordering::SeqCst);
    }

    fn failed_before(&self, index: usize) -> bool {
        self.first_failed.load(Ordering::SeqCst) < index
    }
}

#[derive(Debug, Default)]
struct BatchOutcome {
    produced: Vec<PathBuf>,
    failed_samples: Vec<SampleFailure>,
    batch_failure: Option<BatchFailure>,
}

impl BatchOutcome {
    fn aborted(batch: &Batch, source_path: PathBuf, error: Error) -> Self {
        Self {
            batch_failure: Some(BatchFailure {
                source_name: batch.source_name.clone(),
                source_path,
                samples: batch.len(),
                error,
            }),
            ..Self::default()
        }
    }

    fn has_failures(&self) -> bool {
        self.batch_failure.is_some() || !self.failed_samples.is_empty()
    }

    fn into_first_error(self) -> Option<Error> {
        match self.batch_failure {
            Some(failure) => Some(failure.error),
            None => self.failed_samples.into_iter().next().map(|f| f.error),
        }
    }
}
