//! Writing processed samples to their output artifacts.

use std::path::Path;

use crate::signal::Signal;
use crate::tool::{ExternalTool, ToolOutput};
use crate::transcode::{VideoClipArgs, encode_audio_args};
use crate::wav::write_wav;
use crate::{Error, Result};

/// How an audio output is produced, chosen from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Written directly as 16-bit PCM.
    Wav,

    /// Written as a temporary WAV, then encoded by the external tool.
    Transcoded,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("wav") || ext.eq_ignore_ascii_case("wave") => {
                Self::Wav
            }
            _ => Self::Transcoded,
        }
    }
}

/// Write an extracted audio sample to `output`.
pub fn export_audio(signal: &Signal, output: &Path, tool: &dyn ExternalTool) -> Result<()> {
    match OutputFormat::from_path(output) {
        OutputFormat::Wav => {
            write_wav(output, signal).map_err(|e| Error::export(output, e.to_string()))
        }
        OutputFormat::Transcoded => {
            let tmp = tempfile::Builder::new()
                .prefix("samplecut-")
                .suffix(".wav")
                .tempfile()
                .map_err(|e| Error::export(output, format!("failed to create temp file: {e}")))?;

            write_wav(tmp.path(), signal).map_err(|e| Error::export(output, e.to_string()))?;

            let result = tool.run(&encode_audio_args(tmp.path(), output));
            check_tool_result(output, result)
        }
    }
}

/// Cut, re-gain and re-encode a video clip with the external tool.
pub fn export_video(clip: &VideoClipArgs<'_>, tool: &dyn ExternalTool) -> Result<()> {
    check_tool_result(clip.output, tool.run(&clip.to_args()))
}

pub(crate) fn check_tool_result(output: &Path, result: Result<ToolOutput>) -> Result<()> {
    match result {
        Ok(out) if out.success() => Ok(()),
        Ok(out) => Err(Error::export(
            output,
            format!(
                "transcoder exited with {}: {}",
                out.exit_code
                    .map(|c| format!("status {c}"))
                    .unwrap_or_else(|| "a signal".to_owned()),
                out.stderr_tail(3)
            ),
        )),
        Err(err @ Error::ToolTimeout { .. }) => Err(err),
        Err(err) => Err(Error::export(output, err.to_string())),
    }
}
