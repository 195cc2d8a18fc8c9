use std::time::Duration;

use crate::loudness::SilencePolicy;

/// Loudness every extracted sample is normalized to, in dBFS.
pub const DEFAULT_TARGET_DBFS: f64 = -16.0;

/// Upper bound on a single external tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// How a run reacts when a batch (or a sample inside it) fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum FailurePolicy {
    /// Skip the failed batch or sample, keep going, and summarize at the end.
    #[default]
    Skip,

    /// Stop taking new batches after the first failure and fail the run.
    Strict,
}

/// Options that control how a run is performed.
///
/// This is library-level configuration, not CLI flags directly. The CLI maps
/// user input into this type so other frontends (tests, scripts) can build it
/// programmatically.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Loudness target in dBFS.
    pub target_dbfs: f64,

    /// Video re-encode quality passed to the transcoder as CRF.
    ///
    /// `<= 0` keeps the transcoder's default (near-passthrough) quality; higher
    /// values trade quality for size (25 good, 28 medium, 35+ low).
    pub video_quality: i32,

    /// Worker threads processing batches in parallel. `0` means one per CPU.
    pub jobs: usize,

    pub silence: SilencePolicy,

    pub on_failure: FailurePolicy,

    /// Kill external tool invocations that run longer than this. `None` waits forever.
    pub tool_timeout: Option<Duration>,

    /// Extension of the per-video source audio files (`<video stem>.<ext>`).
    pub source_audio_extension: String,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            target_dbfs: DEFAULT_TARGET_DBFS,
            video_quality: -1,
            jobs: 1,
            silence: SilencePolicy::default(),
            on_failure: FailurePolicy::default(),
            tool_timeout: Some(DEFAULT_TOOL_TIMEOUT),
            source_audio_extension: "mp3".to_owned(),
        }
    }
}

impl Opts {
    /// Resolved worker count (never zero).
    pub fn worker_count(&self) -> usize {
        match self.jobs {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}
