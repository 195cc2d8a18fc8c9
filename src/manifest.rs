//! The sample manifest: global flags plus an ordered list of clip requests.
//!
//! The persisted form is a JSON object whose key names predate this crate
//! (`video_name`, `audio_name`, `create_arduino_file`, ...). We keep those on the
//! wire and expose descriptive names in Rust.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which artifacts a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Normalized audio clips; `video_only` samples are skipped.
    Audio,

    /// Video clips with normalized audio; every enabled sample participates.
    Video,
}

/// One clip request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sample {
    /// Source video file name the clip is cut from.
    #[serde(rename = "video_name")]
    pub source_name: String,

    /// File name of the produced artifact.
    #[serde(rename = "audio_name")]
    pub output_name: String,

    /// Range start in seconds (inclusive).
    pub start: f64,

    /// Range end in seconds (exclusive).
    pub end: f64,

    #[serde(rename = "enable")]
    pub enabled: bool,

    pub video_only: bool,
}

impl Sample {
    pub fn duration_secs(&self) -> f64 {
        self.end - self.start
    }

    fn validate(&self) -> Result<()> {
        if self.source_name.trim().is_empty() {
            return Err(Error::MalformedManifest(format!(
                "sample '{}' has an empty video_name",
                self.output_name
            )));
        }
        if self.output_name.trim().is_empty() {
            return Err(Error::MalformedManifest(format!(
                "a sample cut from '{}' has an empty audio_name",
                self.source_name
            )));
        }

        let ordered = self.start.is_finite()
            && self.end.is_finite()
            && self.start >= 0.0
            && self.end > self.start;
        if !ordered {
            return Err(Error::InvalidRange {
                output_name: self.output_name.clone(),
                start: self.start,
                end: self.end,
            });
        }

        Ok(())
    }
}

/// The full run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Downmix every extracted sample to a single channel.
    #[serde(rename = "convert_to_mono")]
    pub normalize_to_mono: bool,

    /// Run every sample regardless of its `enabled` flag.
    #[serde(rename = "enable_all")]
    pub include_disabled: bool,

    /// Copy the audio outputs into the device directory after extraction.
    #[serde(rename = "create_arduino_file")]
    pub export_for_device: bool,

    #[serde(rename = "audio_samples")]
    pub samples: Vec<Sample>,
}

impl Manifest {
    /// Parse and validate manifest JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read, parse and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::MalformedManifest(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Serialize back to the persisted JSON form (four-space indentation).
    pub fn to_json(&self) -> Result<String> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        String::from_utf8(out).map_err(|e| Error::msg(e.to_string()))
    }

    /// Check structural invariants: at least one sample, and every range ordered.
    pub fn validate(&self) -> Result<()> {
        if self.samples.is_empty() {
            return Err(Error::MalformedManifest(
                "audio_samples must contain at least one sample".into(),
            ));
        }

        self.samples.iter().try_for_each(Sample::validate)
    }

    /// The samples a run of `kind` should process, in manifest order.
    pub fn runnable_samples(&self, kind: PipelineKind) -> Vec<Sample> {
        self.samples
            .iter()
            .filter(|s| self.include_disabled || s.enabled)
            .filter(|s| kind == PipelineKind::Video || !s.video_only)
            .cloned()
            .collect()
    }
}
