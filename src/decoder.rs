// src/decoder.rs

//! Decode an entire media file into memory with Symphonia.
//!
//! Sources are short-lived and sliced many times per batch, so we decode them
//! fully up front instead of streaming. The selected track is the first one with
//! a known codec and sample rate; packets from other tracks (video, subtitles)
//! are skipped.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio_pipeline::PcmAccumulator;
use crate::signal::Signal;

/// Decode the audio track of the file at `path`.
pub fn decode_file(path: &Path) -> Result<Signal> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str());
    decode_source(Box::new(file), ext)
}

/// Decode the audio track of an arbitrary seekable source.
///
/// `hint_extension` (e.g. "mp3", "wav", "mp4") improves format detection.
pub fn decode_source(source: Box<dyn MediaSource>, hint_extension: Option<&str>) -> Result<Signal> {
    let (mut format, track) = open_media(source, hint_extension)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!(e))
        .context("failed to create decoder for audio track")?;

    let mut pcm = PcmAccumulator::new(
        track.codec_params.sample_rate.unwrap_or(0),
        track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0),
    );

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            // Symphonia reports end-of-stream as an IO error.
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(anyhow!(e)).context("failed reading packet"),
        };

        if packet.track_id() != track.id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(buf) => pcm.push(buf)?,
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::debug!(reason = msg, "skipping undecodable packet");
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(anyhow!(e)).context("decoder failure"),
        }
    }

    pcm.finish()
}

fn open_media(
    source: Box<dyn MediaSource>,
    hint_extension: Option<&str>,
) -> Result<(Box<dyn FormatReader>, Track)> {
    let mss = MediaSourceStream::new(
        source,
        MediaSourceStreamOptions {
            buffer_len: 256 * 1024,
        },
    );

    let mut hint = Hint::new();
    if let Some(ext) = hint_extension {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| anyhow!(e))
        .context("failed to detect media format")?;

    let format = detected.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .cloned()
        .ok_or_else(|| anyhow!("no audio track found"))?;

    Ok((format, track))
}
