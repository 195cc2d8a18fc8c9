//! `samplecut`: batch extraction of loudness-normalized samples from source videos.
//!
//! A JSON manifest names every clip (source video, output name, time range). A run:
//! - groups the clips by source so every source is decoded once
//! - slices each clip and normalizes it to a target dBFS
//! - writes one artifact per clip (audio file, or a re-encoded video clip)
//! - optionally copies the audio outputs, numbered, for a playback device
//!
//! Most consumers only need [`Orchestrator`], [`Paths`] and [`Opts`].

// Errors and the crate-wide result alias.
mod error;
pub use error::{Error, Result};

// High-level API.
pub mod opts;
pub mod orchestrator;
pub mod progress;

// Manifest model and planning.
pub mod manifest;
pub mod planner;

// Decoding and signal processing.
mod audio_pipeline;
pub mod decoder;
pub mod signal;
pub mod source;
pub mod wav;

// Per-sample extraction.
pub mod extractor;
pub mod loudness;

// Output artifacts and the external transcoder.
pub mod device;
pub mod exporter;
pub mod fs_util;
pub mod tool;
pub mod transcode;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

#[cfg(feature = "logging")]
pub use logging::init as init_logging;

pub use loudness::SilencePolicy;
pub use manifest::{Manifest, PipelineKind, Sample};
pub use opts::{FailurePolicy, Opts};
pub use orchestrator::{Orchestrator, Paths, RunReport, RunState};
