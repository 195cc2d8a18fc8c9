use std::io::{Read, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::Result;
use crate::signal::Signal;

/// Spec used for every WAV we write: 16-bit integer PCM.
pub fn pcm16_spec(signal: &Signal) -> WavSpec {
    WavSpec {
        channels: signal.channels,
        sample_rate: signal.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write `signal` as a 16-bit PCM WAV file.
///
/// Samples outside `[-1.0, 1.0]` (e.g. after a large positive gain) are clipped.
pub fn write_wav(path: &Path, signal: &Signal) -> Result<()> {
    let writer = WavWriter::create(path, pcm16_spec(signal))?;
    write_samples(writer, signal)
}

/// Same as [`write_wav`] but into any seekable writer.
pub fn write_wav_to<W>(w: W, signal: &Signal) -> Result<()>
where
    W: Write + Seek,
{
    let writer = WavWriter::new(w, pcm16_spec(signal))?;
    write_samples(writer, signal)
}

fn write_samples<W>(mut writer: WavWriter<W>, signal: &Signal) -> Result<()>
where
    W: Write + Seek,
{
    for &s in &signal.samples {
        writer.write_sample(quantize(s))?;
    }
    writer.finalize()?;
    Ok(())
}

fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Load a WAV file back into a [`Signal`], normalizing integer PCM to `[-1.0, 1.0]`.
pub fn read_wav(path: &Path) -> Result<Signal> {
    let reader = WavReader::open(path)?;
    read_samples(reader)
}

fn read_samples<R: Read>(mut reader: WavReader<R>) -> Result<Signal> {
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<Vec<_>>>()?,
        SampleFormat::Int => {
            let max = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<hound::Result<Vec<_>>>()?
        }
    };

    Ok(Signal::new(samples, spec.sample_rate, spec.channels))
}
