//! ffmpeg argument builders.

use std::ffi::OsString;
use std::path::Path;

/// Gains smaller than this (in dB) are not worth a volume filter.
pub const MIN_AUDIBLE_GAIN_DB: f64 = 0.1;

/// Bitrate for audio produced by the transcoder.
pub const AUDIO_BITRATE: &str = "192K";

/// One video clip request for the transcoder.
#[derive(Debug, Clone)]
pub struct VideoClipArgs<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub start: f64,
    pub end: f64,
    pub gain_db: f64,
    pub mono: bool,
    /// CRF value; `<= 0` leaves the encoder's default quality.
    pub quality: i32,
}

impl VideoClipArgs<'_> {
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-ss".into(),
            format_secs(self.start).into(),
            "-to".into(),
            format_secs(self.end).into(),
            "-i".into(),
            self.input.into(),
        ];

        if self.gain_db.abs() >= MIN_AUDIBLE_GAIN_DB {
            args.push("-filter:a".into());
            args.push(format!("volume={:.3}dB", self.gain_db).into());
        }

        if self.mono {
            args.push("-ac".into());
            args.push("1".into());
        }

        if self.quality > 0 {
            args.push("-crf".into());
            args.push(self.quality.to_string().into());
        }

        args.push(self.output.into());
        args
    }
}

/// Encode an intermediate WAV into whatever format `output`'s extension implies.
pub fn encode_audio_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-b:a".into(),
        AUDIO_BITRATE.into(),
        output.into(),
    ]
}

/// Pull the audio track out of a source video.
pub fn extract_source_args(video: &Path, audio: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        video.into(),
        "-b:a".into(),
        AUDIO_BITRATE.into(),
        "-vn".into(),
        audio.into(),
    ]
}

fn format_secs(secs: f64) -> String {
    // Millisecond precision; trailing zeros trimmed so `2.0` prints as `2`.
    let s = format!("{secs:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_owned()
}
