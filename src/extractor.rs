//! Per-sample extraction: slice, optional downmix, loudness normalization.

use crate::loudness::{self, Normalization, SilencePolicy};
use crate::manifest::Sample;
use crate::signal::Signal;
use crate::source::LoadedSource;
use crate::Result;

/// Settings shared by every sample of a run.
#[derive(Debug, Clone, Copy)]
pub struct ExtractSettings {
    pub target_dbfs: f64,
    pub to_mono: bool,
    pub silence: SilencePolicy,
}

/// A processed slice ready for export.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub signal: Signal,
    pub normalization: Normalization,
}

/// Cut `sample` out of `source` and normalize it to the target loudness.
pub fn extract_audio(
    source: &LoadedSource,
    sample: &Sample,
    settings: &ExtractSettings,
) -> Result<Extracted> {
    let mut signal = prepared_slice(source, sample, settings)?;
    let normalization = loudness::normalize(&mut signal, settings.target_dbfs, settings.silence);

    log_normalization(sample, &normalization);
    Ok(Extracted {
        signal,
        normalization,
    })
}

/// Gain the transcoder should apply to the video clip for `sample`.
///
/// Measured on the paired audio source exactly as [`extract_audio`] would, but
/// without touching the samples.
pub fn video_gain(
    source: &LoadedSource,
    sample: &Sample,
    settings: &ExtractSettings,
) -> Result<Normalization> {
    let signal = prepared_slice(source, sample, settings)?;
    let normalization = loudness::measure(&signal, settings.target_dbfs, settings.silence);

    log_normalization(sample, &normalization);
    Ok(normalization)
}

fn prepared_slice(
    source: &LoadedSource,
    sample: &Sample,
    settings: &ExtractSettings,
) -> Result<Signal> {
    let slice = source.slice(sample.start, sample.end)?;
    Ok(if settings.to_mono {
        slice.to_mono()
    } else {
        slice
    })
}

fn log_normalization(sample: &Sample, norm: &Normalization) {
    if norm.is_silent() {
        tracing::warn!(
            sample = %sample.output_name,
            gain_db = norm.gain_db,
            "slice is silent; loudness cannot be normalized"
        );
    } else {
        tracing::debug!(
            sample = %sample.output_name,
            measured_dbfs = norm.measured_dbfs,
            gain_db = norm.gain_db,
            "normalized"
        );
    }
}
