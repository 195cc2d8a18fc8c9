//! Gain computation for loudness normalization.
//!
//! Loudness is plain dBFS (average power over the slice), not LUFS. The gain to
//! reach a target is `target - measured`. Silent slices measure `-inf`, which
//! would turn into an infinite gain; [`SilencePolicy`] decides what happens then.

use crate::signal::Signal;

/// What to do when a slice is too quiet to normalize safely.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SilencePolicy {
    /// Leave silent slices untouched (0 dB gain). Non-silent slices are
    /// normalized without limit.
    #[default]
    PassThrough,

    /// Never apply more than `max_gain_db`. Silent slices get exactly this gain,
    /// which leaves them silent.
    ClampGain { max_gain_db: f64 },
}

/// Measured loudness and the gain chosen for one slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub measured_dbfs: f64,
    pub gain_db: f64,
}

impl Normalization {
    pub fn is_silent(&self) -> bool {
        self.measured_dbfs == f64::NEG_INFINITY
    }
}

/// Gain in dB that moves `measured_dbfs` to `target_dbfs`. Always finite.
pub fn gain_to_target(measured_dbfs: f64, target_dbfs: f64, policy: SilencePolicy) -> f64 {
    match policy {
        SilencePolicy::PassThrough => {
            if measured_dbfs.is_finite() {
                target_dbfs - measured_dbfs
            } else {
                0.0
            }
        }
        SilencePolicy::ClampGain { max_gain_db } => {
            if measured_dbfs.is_finite() {
                (target_dbfs - measured_dbfs).min(max_gain_db)
            } else {
                max_gain_db
            }
        }
    }
}

/// Measure `signal` and the gain that would bring it to `target_dbfs`.
pub fn measure(signal: &Signal, target_dbfs: f64, policy: SilencePolicy) -> Normalization {
    let measured_dbfs = signal.dbfs();
    Normalization {
        measured_dbfs,
        gain_db: gain_to_target(measured_dbfs, target_dbfs, policy),
    }
}

/// Measure and apply the normalization gain in place.
pub fn normalize(signal: &mut Signal, target_dbfs: f64, policy: SilencePolicy) -> Normalization {
    let norm = measure(signal, target_dbfs, policy);
    if norm.gain_db != 0.0 {
        signal.apply_gain_db(norm.gain_db);
    }
    norm
}
