//! Interleaved PCM held in memory, plus the sample-level operations the
//! extractor needs: slicing, downmixing, loudness measurement and gain.

use crate::{Error, Result};

/// Decoded audio: interleaved `f32` samples in `[-1.0, 1.0]` at `sample_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Signal {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Number of frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Copy out the half-open range `[start, end)` given in seconds.
    ///
    /// Bounds are truncated to whole milliseconds before being mapped to frames.
    /// An `end` past the end of the signal is clamped; a `start` at or past the
    /// end is an error.
    pub fn slice(&self, start: f64, end: f64) -> Result<Signal> {
        let total = self.frames();
        let start_frame = self.frame_at(start);
        if start_frame >= total {
            return Err(Error::SliceOutOfBounds {
                start,
                end,
                source_secs: self.duration_secs(),
            });
        }

        let wanted_end = self.frame_at(end);
        let end_frame = wanted_end.min(total).max(start_frame);
        if wanted_end > total {
            tracing::warn!(
                start,
                end,
                source_secs = self.duration_secs(),
                "range ends past the end of the source; clamping"
            );
        }

        let ch = self.channels as usize;
        Ok(Signal {
            samples: self.samples[start_frame * ch..end_frame * ch].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    fn frame_at(&self, secs: f64) -> usize {
        // Float math saturates on the cast instead of overflowing for huge times.
        let ms = (secs * 1000.0).trunc();
        (ms * self.sample_rate as f64 / 1000.0).floor().max(0.0) as usize
    }

    /// Downmix to one channel by averaging channels with equal weight.
    pub fn to_mono(&self) -> Signal {
        if self.channels <= 1 {
            return self.clone();
        }

        let ch = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect();

        Signal {
            samples,
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    /// Root-mean-square level over every interleaved sample.
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / self.samples.len() as f64).sqrt()
    }

    /// Loudness in dBFS. Silent or empty signals measure `-inf`.
    pub fn dbfs(&self) -> f64 {
        let rms = self.rms();
        if rms == 0.0 {
            return f64::NEG_INFINITY;
        }
        20.0 * rms.log10()
    }

    /// Scale every sample by `gain_db` decibels. Values are not clipped here.
    pub fn apply_gain_db(&mut self, gain_db: f64) {
        let factor = 10f64.powf(gain_db / 20.0).min(f32::MAX as f64) as f32;
        for s in &mut self.samples {
            *s *= factor;
        }
    }
}
