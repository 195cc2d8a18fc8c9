//! PCM accumulation for whole-file decoding.
//!
//! Responsibilities:
//! - Convert Symphonia-decoded buffers of any sample format into interleaved `f32`
//! - Keep the original sample rate and channel layout (no resampling, no downmix)
//! - Reject streams whose format changes mid-file

use anyhow::{Result, bail};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};

use crate::signal::Signal;

/// Collects decoded packets into one interleaved buffer.
pub struct PcmAccumulator {
    // Scratch buffer reused across packets; rebuilt when a packet outgrows it.
    sample_buf: Option<SampleBuffer<f32>>,
    sample_buf_frames: usize,

    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,

    // Set once the first packet has been seen; later packets must match.
    locked: bool,
}

impl PcmAccumulator {
    /// `sample_rate` and `channels` come from the track's codec parameters and are
    /// used when the stream turns out to hold no packets at all.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_buf: None,
            sample_buf_frames: 0,
            samples: Vec::new(),
            sample_rate,
            channels,
            locked: false,
        }
    }

    pub fn push(&mut self, decoded: AudioBufferRef<'_>) -> Result<()> {
        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            bail!("decoded audio had zero channels");
        }

        if self.locked {
            if spec.rate != self.sample_rate || channels != self.channels as usize {
                bail!(
                    "stream format changed mid-file ({} Hz/{} ch -> {} Hz/{} ch)",
                    self.sample_rate,
                    self.channels,
                    spec.rate,
                    channels
                );
            }
        } else {
            self.sample_rate = spec.rate;
            self.channels = channels as u16;
            self.locked = true;
        }

        if decoded.frames() == 0 {
            return Ok(());
        }

        let capacity = decoded.capacity();
        if self.sample_buf.is_none() || self.sample_buf_frames < capacity {
            self.sample_buf = Some(SampleBuffer::<f32>::new(capacity as u64, spec));
            self.sample_buf_frames = capacity;
        }

        if let Some(buf) = self.sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            self.samples.extend_from_slice(buf.samples());
        }

        Ok(())
    }

    pub fn finish(self) -> Result<Signal> {
        if self.sample_rate == 0 {
            bail!("audio track has no sample rate");
        }
        if self.channels == 0 {
            bail!("audio track has no channels");
        }
        Ok(Signal::new(self.samples, self.sample_rate, self.channels))
    }
}
