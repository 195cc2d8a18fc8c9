use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use serde_json::json;
use tempfile::TempDir;

use samplecut::progress::{NoProgress, Progress};
use samplecut::source::MediaLoader;
use samplecut::tool::{ExternalTool, ToolOutput};
use samplecut::wav::read_wav;
use samplecut::{Error, FailurePolicy, Opts, Orchestrator, Paths, PipelineKind, RunState};

/// Stands in for ffmpeg: records every invocation and exits with a fixed code.
#[derive(Default)]
struct RecordingTool {
    exit_code: i32,
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingTool {
    fn failing() -> Self {
        Self {
            exit_code: 1,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl ExternalTool for RecordingTool {
    fn run(&self, args: &[OsString]) -> samplecut::Result<ToolOutput> {
        self.calls.lock().unwrap().push(
            args.iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        );
        Ok(ToolOutput {
            exit_code: Some(self.exit_code),
            stdout: String::new(),
            stderr: if self.exit_code == 0 {
                String::new()
            } else {
                "Conversion failed!\n".into()
            },
        })
    }
}

#[derive(Default)]
struct CountingProgress {
    total: AtomicU64,
    done: AtomicU64,
}

impl Progress for CountingProgress {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    fn advance(&self, delta: u64) {
        self.done.fetch_add(delta, Ordering::SeqCst);
    }

    fn finish(&self) {}
}

struct Project {
    _dir: TempDir,
    paths: Paths,
}

impl Project {
    /// A project with every directory present and the given manifest.
    fn new(manifest: serde_json::Value) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let paths = Paths::under(dir.path());
        for d in [
            &paths.videos_dir,
            &paths.source_audio_dir,
            &paths.audio_output_dir,
            &paths.video_output_dir,
        ] {
            fs::create_dir_all(d)?;
        }
        fs::write(&paths.manifest_path, serde_json::to_string_pretty(&manifest)?)?;
        Ok(Self { _dir: dir, paths })
    }

    /// Source audio for video `name`, 10 s of a 440 Hz tone.
    fn add_source(&self, name: &str, channels: u16, amplitude: f32) -> Result<PathBuf> {
        let path = self.paths.source_audio(name, "wav");
        write_tone(&path, channels, amplitude, 10.0)?;
        fs::write(self.paths.source_video(name), b"not really a video")?;
        Ok(path)
    }

    fn orchestrator(&self, opts: Opts) -> Orchestrator<RecordingTool, MediaLoader> {
        self.orchestrator_with(opts, RecordingTool::default())
    }

    fn orchestrator_with(
        &self,
        opts: Opts,
        tool: RecordingTool,
    ) -> Orchestrator<RecordingTool, MediaLoader> {
        Orchestrator::with_parts(self.paths.clone(), opts, tool, MediaLoader)
    }
}

fn wav_opts() -> Opts {
    Opts {
        source_audio_extension: "wav".into(),
        ..Opts::default()
    }
}

fn write_tone(path: &Path, channels: u16, amplitude: f32, secs: f32) -> Result<()> {
    let rate = 8_000;
    let spec = WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    let frames = (rate as f32 * secs) as usize;
    for i in 0..frames {
        let t = i as f32 / rate as f32;
        let v = amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        for ch in 0..channels {
            // Right channel quieter so downmixing changes the level.
            let v = if ch == 0 { v } else { v * 0.5 };
            writer.write_sample((v * i16::MAX as f32) as i16)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

fn sample(video: &str, out: &str, start: f64, end: f64) -> serde_json::Value {
    json!({
        "video_name": video,
        "audio_name": out,
        "start": start,
        "end": end,
        "enable": true,
        "video_only": false,
    })
}

fn manifest(mono: bool, device: bool, samples: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "convert_to_mono": mono,
        "enable_all": false,
        "create_arduino_file": device,
        "audio_samples": samples,
    })
}

fn three_samples() -> Vec<serde_json::Value> {
    vec![
        sample("v1.mp4", "a.wav", 0.0, 2.0),
        sample("v2.mp4", "b.wav", 1.0, 3.0),
        sample("v1.mp4", "c.wav", 5.0, 7.0),
    ]
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect()
}

#[test]
fn audio_run_produces_normalized_samples() -> Result<()> {
    let project = Project::new(manifest(true, false, three_samples()))?;
    project.add_source("v1.mp4", 2, 0.8)?;
    project.add_source("v2.mp4", 1, 0.05)?;
    fs::write(project.paths.audio_output_dir.join("stale.wav"), b"old")?;

    let orchestrator = project.orchestrator(wav_opts());
    let progress = CountingProgress::default();
    let report = orchestrator.run(PipelineKind::Audio, &progress)?;

    assert!(report.is_clean());
    // Planned order: v1's batch first, then v2.
    assert_eq!(file_names(&report.produced), ["a.wav", "c.wav", "b.wav"]);
    assert!(!project.paths.audio_output_dir.join("stale.wav").exists());
    assert!(orchestrator.tool().calls().is_empty());

    for out in &report.produced {
        let signal = read_wav(out)?;
        assert_eq!(signal.channels, 1);
        assert!((signal.duration_secs() - 2.0).abs() < 0.01);
        assert!(
            (signal.dbfs() + 16.0).abs() < 0.05,
            "{} at {} dBFS",
            out.display(),
            signal.dbfs()
        );
    }

    assert_eq!(progress.total.load(Ordering::SeqCst), 3);
    assert_eq!(progress.done.load(Ordering::SeqCst), 3);
    assert_eq!(
        report.visited,
        [
            RunState::Idle,
            RunState::Cleaning,
            RunState::Loading,
            RunState::Planning,
            RunState::Extracting,
            RunState::Done,
        ]
    );
    Ok(())
}

#[test]
fn repeated_runs_are_byte_identical() -> Result<()> {
    let project = Project::new(manifest(false, false, three_samples()))?;
    project.add_source("v1.mp4", 2, 0.3)?;
    project.add_source("v2.mp4", 2, 0.3)?;
    let orchestrator = project.orchestrator(wav_opts());

    let first = orchestrator.run(PipelineKind::Audio, &NoProgress)?;
    let first_bytes: Vec<Vec<u8>> =
        first.produced.iter().map(fs::read).collect::<Result<_, _>>()?;

    let second = orchestrator.run(PipelineKind::Audio, &NoProgress)?;
    let second_bytes: Vec<Vec<u8>> =
        second.produced.iter().map(fs::read).collect::<Result<_, _>>()?;

    assert_eq!(first.produced, second.produced);
    assert_eq!(first_bytes, second_bytes);
    Ok(())
}

#[test]
fn parallel_workers_match_sequential_output() -> Result<()> {
    let samples: Vec<_> = (0..6)
        .map(|i| {
            let start = i as f64;
            sample(&format!("v{}.mp4", i % 3), &format!("s{i}.wav"), start, start + 1.5)
        })
        .collect();

    let mut outputs = Vec::new();
    for jobs in [1, 4] {
        let project = Project::new(manifest(false, false, samples.clone()))?;
        for v in 0..3 {
            project.add_source(&format!("v{v}.mp4"), 1, 0.1 + v as f32 * 0.2)?;
        }
        let opts = Opts { jobs, ..wav_opts() };
        let report = project.orchestrator(opts).run(PipelineKind::Audio, &NoProgress)?;

        let mut files = Vec::new();
        for path in &report.produced {
            files.push((path.file_name().map(|n| n.to_owned()), fs::read(path)?));
        }
        outputs.push(files);
    }

    assert_eq!(outputs[0].len(), 6);
    assert_eq!(outputs[0], outputs[1]);
    Ok(())
}

#[test]
fn device_export_numbers_outputs_in_name_order() -> Result<()> {
    let project = Project::new(manifest(false, true, three_samples()))?;
    project.add_source("v1.mp4", 1, 0.3)?;
    project.add_source("v2.mp4", 1, 0.3)?;
    fs::create_dir_all(&project.paths.device_dir)?;
    fs::write(project.paths.device_dir.join("0009_old.wav"), b"old")?;

    let report = project
        .orchestrator(wav_opts())
        .run(PipelineKind::Audio, &NoProgress)?;

    assert_eq!(
        file_names(&report.device_files),
        ["0001_a.wav", "0002_b.wav", "0003_c.wav"]
    );
    assert!(!project.paths.device_dir.join("0009_old.wav").exists());
    assert_eq!(
        fs::read(project.paths.device_dir.join("0002_b.wav"))?,
        fs::read(project.paths.audio_output_dir.join("b.wav"))?
    );
    assert!(report.visited.contains(&RunState::DeviceExport));
    Ok(())
}

#[test]
fn missing_source_aborts_only_its_batch() -> Result<()> {
    let mut samples = three_samples();
    samples.push(sample("gone.mp4", "d.wav", 0.0, 1.0));
    samples.push(sample("gone.mp4", "e.wav", 2.0, 3.0));
    let project = Project::new(manifest(false, false, samples))?;
    project.add_source("v1.mp4", 1, 0.3)?;
    project.add_source("v2.mp4", 1, 0.3)?;

    let progress = CountingProgress::default();
    let report = project
        .orchestrator(wav_opts())
        .run(PipelineKind::Audio, &progress)?;

    assert_eq!(report.produced.len(), 3);
    assert_eq!(report.failed_batches.len(), 1);
    let failure = &report.failed_batches[0];
    assert_eq!(failure.source_name, "gone.mp4");
    assert_eq!(failure.samples, 2);
    assert!(matches!(failure.error, Error::SourceNotFound(_)));
    // Aborted samples still count so the bar completes.
    assert_eq!(progress.done.load(Ordering::SeqCst), 5);
    assert!(!report.is_clean());
    Ok(())
}

#[test]
fn out_of_bounds_sample_fails_alone() -> Result<()> {
    let project = Project::new(manifest(
        false,
        false,
        vec![
            sample("v1.mp4", "a.wav", 0.0, 1.0),
            sample("v1.mp4", "late.wav", 30.0, 31.0),
            sample("v1.mp4", "clamped.wav", 9.0, 12.0),
        ],
    ))?;
    project.add_source("v1.mp4", 1, 0.3)?;

    let report = project
        .orchestrator(wav_opts())
        .run(PipelineKind::Audio, &NoProgress)?;

    assert_eq!(file_names(&report.produced), ["a.wav", "clamped.wav"]);
    assert_eq!(report.failed_samples.len(), 1);
    assert_eq!(report.failed_samples[0].output_name, "late.wav");
    assert!(matches!(
        report.failed_samples[0].error,
        Error::SliceOutOfBounds { .. }
    ));

    let clamped = read_wav(&project.paths.audio_output_dir.join("clamped.wav"))?;
    assert!((clamped.duration_secs() - 1.0).abs() < 0.01);
    Ok(())
}

#[test]
fn strict_policy_fails_the_run() -> Result<()> {
    let project = Project::new(manifest(
        false,
        false,
        vec![sample("gone.mp4", "a.wav", 0.0, 1.0)],
    ))?;
    let opts = Opts {
        on_failure: FailurePolicy::Strict,
        ..wav_opts()
    };

    let err = project
        .orchestrator(opts)
        .run(PipelineKind::Audio, &NoProgress)
        .unwrap_err();
    assert!(matches!(err, Error::SourceNotFound(_)));
    Ok(())
}

#[test]
fn strict_policy_stops_after_a_failed_sample() -> Result<()> {
    let project = Project::new(manifest(
        false,
        false,
        vec![
            sample("v1.mp4", "a.mp3", 0.0, 1.0),
            sample("v1.mp4", "late.mp3", 30.0, 31.0),
            sample("v2.mp4", "b.mp3", 0.0, 1.0),
        ],
    ))?;
    project.add_source("v1.mp4", 1, 0.3)?;
    project.add_source("v2.mp4", 1, 0.3)?;
    let opts = Opts {
        on_failure: FailurePolicy::Strict,
        ..wav_opts()
    };

    let orchestrator = project.orchestrator(opts);
    let err = orchestrator
        .run(PipelineKind::Audio, &NoProgress)
        .unwrap_err();

    assert!(matches!(err, Error::SliceOutOfBounds { .. }));
    // Only a.mp3 reached the tool; the v2 batch never started.
    assert_eq!(orchestrator.tool().calls().len(), 1);
    Ok(())
}

#[test]
fn strict_policy_stops_after_a_tool_failure() -> Result<()> {
    let project = Project::new(manifest(
        false,
        false,
        vec![
            sample("v1.mp4", "a.mp3", 0.0, 1.0),
            sample("v2.mp4", "b.mp3", 0.0, 1.0),
        ],
    ))?;
    project.add_source("v1.mp4", 1, 0.3)?;
    project.add_source("v2.mp4", 1, 0.3)?;
    let opts = Opts {
        on_failure: FailurePolicy::Strict,
        ..wav_opts()
    };

    let orchestrator = project.orchestrator_with(opts, RecordingTool::failing());
    let err = orchestrator
        .run(PipelineKind::Audio, &NoProgress)
        .unwrap_err();

    assert!(matches!(err, Error::Export { .. }));
    assert_eq!(orchestrator.tool().calls().len(), 1);
    Ok(())
}

#[test]
fn strict_parallel_run_reports_earliest_failure() -> Result<()> {
    let project = Project::new(manifest(
        false,
        false,
        vec![
            sample("gone.mp4", "a.wav", 0.0, 1.0),
            sample("v1.mp4", "late.wav", 30.0, 31.0),
            sample("v2.mp4", "b.wav", 0.0, 1.0),
        ],
    ))?;
    project.add_source("v1.mp4", 1, 0.3)?;
    project.add_source("v2.mp4", 1, 0.3)?;
    let opts = Opts {
        on_failure: FailurePolicy::Strict,
        jobs: 4,
        ..wav_opts()
    };

    for _ in 0..5 {
        let err = project
            .orchestrator(opts.clone())
            .run(PipelineKind::Audio, &NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
    }
    Ok(())
}

#[test]
fn invalid_range_fails_before_any_extraction() -> Result<()> {
    let project = Project::new(manifest(
        false,
        false,
        vec![
            sample("v1.mp4", "a.wav", 0.0, 1.0),
            sample("v1.mp4", "b.wav", 2.0, 1.0),
        ],
    ))?;
    project.add_source("v1.mp4", 1, 0.3)?;

    let orchestrator = project.orchestrator(wav_opts());
    let err = orchestrator
        .run(PipelineKind::Audio, &NoProgress)
        .unwrap_err();

    assert!(matches!(err, Error::InvalidRange { .. }));
    assert!(orchestrator.tool().calls().is_empty());
    assert_eq!(fs::read_dir(&project.paths.audio_output_dir)?.count(), 0);
    Ok(())
}

#[test]
fn malformed_manifest_is_fatal() -> Result<()> {
    let project = Project::new(json!({ "audio_samples": [] }))?;
    let err = project
        .orchestrator(wav_opts())
        .run(PipelineKind::Audio, &NoProgress)
        .unwrap_err();
    assert!(matches!(err, Error::MalformedManifest(_)));
    Ok(())
}

#[test]
fn missing_output_directory_is_fatal() -> Result<()> {
    let project = Project::new(manifest(false, false, three_samples()))?;
    fs::remove_dir(&project.paths.audio_output_dir)?;

    let err = project
        .orchestrator(wav_opts())
        .run(PipelineKind::Audio, &NoProgress)
        .unwrap_err();
    assert!(
        matches!(&err, Error::MissingDirectory(p) if *p == project.paths.audio_output_dir)
    );
    Ok(())
}

#[test]
fn cancelled_run_skips_batches_and_device_export() -> Result<()> {
    let project = Project::new(manifest(false, true, three_samples()))?;
    project.add_source("v1.mp4", 1, 0.3)?;
    project.add_source("v2.mp4", 1, 0.3)?;

    let orchestrator = project.orchestrator(wav_opts());
    orchestrator.cancel_flag().store(true, Ordering::SeqCst);
    let report = orchestrator.run(PipelineKind::Audio, &NoProgress)?;

    assert!(report.cancelled);
    assert!(report.produced.is_empty());
    assert!(report.device_files.is_empty());
    assert!(!project.paths.device_dir.exists());
    Ok(())
}

#[test]
fn encoded_audio_outputs_go_through_the_tool() -> Result<()> {
    let project = Project::new(manifest(
        false,
        false,
        vec![sample("v1.mp4", "a.mp3", 0.0, 1.0)],
    ))?;
    project.add_source("v1.mp4", 1, 0.3)?;

    let orchestrator = project.orchestrator(wav_opts());
    let report = orchestrator.run(PipelineKind::Audio, &NoProgress)?;

    let calls = orchestrator.tool().calls();
    assert_eq!(calls.len(), 1);
    let out = project.paths.audio_output_dir.join("a.mp3");
    assert_eq!(calls[0][..2], ["-y", "-i"]);
    assert_eq!(calls[0][3..5], ["-b:a", "192K"]);
    assert_eq!(calls[0].last().map(PathBuf::from), Some(out.clone()));
    assert_eq!(report.produced, [out]);
    Ok(())
}

#[test]
fn video_run_delegates_clips_to_the_tool() -> Result<()> {
    let mut samples = three_samples();
    samples.push(json!({
        "video_name": "v2.mp4",
        "audio_name": "only_video.mp3",
        "start": 4.0,
        "end": 6.5,
        "enable": true,
        "video_only": true,
    }));
    let project = Project::new(manifest(true, true, samples))?;
    project.add_source("v1.mp4", 1, 0.05)?;
    project.add_source("v2.mp4", 1, 0.05)?;

    let opts = Opts {
        video_quality: 28,
        ..wav_opts()
    };
    let orchestrator = project.orchestrator(opts);
    let report = orchestrator.run(PipelineKind::Video, &NoProgress)?;

    assert!(report.is_clean());
    assert_eq!(
        file_names(&report.produced),
        ["a.mp4", "c.mp4", "b.mp4", "only_video.mp4"]
    );
    // Device export belongs to the audio pipeline.
    assert!(report.device_files.is_empty());

    let calls = orchestrator.tool().calls();
    assert_eq!(calls.len(), 4);

    let first = &calls[0];
    let video = project.paths.source_video("v1.mp4");
    assert_eq!(first[..6], ["-y", "-ss", "0", "-to", "2", "-i"]);
    assert_eq!(PathBuf::from(&first[6]), video);
    assert_eq!(first[7], "-filter:a");
    assert!(first[8].starts_with("volume=") && first[8].ends_with("dB"));
    assert_eq!(first[9..13], ["-ac", "1", "-crf", "28"]);
    assert_eq!(
        PathBuf::from(&first[13]),
        project.paths.video_output_dir.join("a.mp4")
    );

    let last = &calls[3];
    assert_eq!(last[1..5], ["-ss", "4", "-to", "6.5"]);
    Ok(())
}

#[test]
fn video_tool_failures_are_per_sample() -> Result<()> {
    let project = Project::new(manifest(false, false, three_samples()))?;
    project.add_source("v1.mp4", 1, 0.3)?;
    project.add_source("v2.mp4", 1, 0.3)?;

    let orchestrator = project.orchestrator_with(wav_opts(), RecordingTool::failing());
    let report = orchestrator.run(PipelineKind::Video, &NoProgress)?;

    assert!(report.produced.is_empty());
    assert_eq!(report.failed_samples.len(), 3);
    assert!(
        report
            .failed_samples
            .iter()
            .all(|f| matches!(f.error, Error::Export { .. }))
    );
    assert_eq!(orchestrator.tool().calls().len(), 3);
    Ok(())
}

#[test]
fn video_run_requires_the_source_video() -> Result<()> {
    let project = Project::new(manifest(false, false, three_samples()))?;
    project.add_source("v1.mp4", 1, 0.3)?;
    project.add_source("v2.mp4", 1, 0.3)?;
    fs::remove_file(project.paths.source_video("v2.mp4"))?;

    let report = project
        .orchestrator(wav_opts())
        .run(PipelineKind::Video, &NoProgress)?;

    assert_eq!(report.produced.len(), 2);
    assert_eq!(report.failed_batches.len(), 1);
    assert!(matches!(
        &report.failed_batches[0].error,
        Error::SourceNotFound(p) if p.ends_with("videos/v2.mp4")
    ));
    Ok(())
}

#[test]
fn extract_sources_runs_once_per_video() -> Result<()> {
    let project = Project::new(manifest(false, false, three_samples()))?;
    fs::remove_dir(&project.paths.source_audio_dir)?;
    for name in ["b.mp4", "a.mp4"] {
        fs::write(project.paths.videos_dir.join(name), b"")?;
    }

    let orchestrator = project.orchestrator(Opts::default());
    let report = orchestrator.extract_sources(&NoProgress)?;

    assert!(project.paths.source_audio_dir.is_dir());
    assert!(report.failed.is_empty());
    assert_eq!(file_names(&report.extracted), ["a.mp3", "b.mp3"]);

    let calls = orchestrator.tool().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0][..2], ["-y", "-i"]);
    assert!(calls[0][2].ends_with("a.mp4"));
    assert_eq!(calls[0][3..6], ["-b:a", "192K", "-vn"]);
    assert!(calls[0][6].ends_with("a.mp3"));
    Ok(())
}

#[test]
fn unreferenced_sources_lists_unused_videos() -> Result<()> {
    let mut samples = three_samples();
    samples.push(json!({
        "video_name": "v3.mp4",
        "audio_name": "disabled.wav",
        "start": 0.0,
        "end": 1.0,
        "enable": false,
        "video_only": false,
    }));
    let project = Project::new(manifest(false, false, samples))?;
    for name in ["v1.mp4", "v3.mp4", "unused_b.mp4", "unused_a.mp4"] {
        fs::write(project.paths.videos_dir.join(name), b"")?;
    }

    let unused = project
        .orchestrator(Opts::default())
        .unreferenced_sources()?;
    assert_eq!(unused, ["unused_a.mp4", "unused_b.mp4"]);
    Ok(())
}
