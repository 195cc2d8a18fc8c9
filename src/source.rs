//! Loading a batch's source audio.

use std::path::{Path, PathBuf};

use crate::decoder::decode_file;
use crate::signal::Signal;
use crate::{Error, Result};

/// A source decoded into memory for the lifetime of one batch.
#[derive(Debug)]
pub struct LoadedSource {
    path: PathBuf,
    signal: Signal,
}

impl LoadedSource {
    pub fn new(path: impl Into<PathBuf>, signal: Signal) -> Self {
        Self {
            path: path.into(),
            signal,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    /// Copy out `[start, end)` in seconds.
    pub fn slice(&self, start: f64, end: f64) -> Result<Signal> {
        self.signal.slice(start, end)
    }
}

/// Opens sources for the orchestrator.
///
/// Implementations must be shareable across worker threads; each call returns an
/// independent [`LoadedSource`].
pub trait SourceLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<LoadedSource>;
}

/// Decodes any container/codec Symphonia understands.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaLoader;

impl SourceLoader for MediaLoader {
    fn load(&self, path: &Path) -> Result<LoadedSource> {
        if !path.is_file() {
            return Err(Error::SourceNotFound(path.to_path_buf()));
        }

        let signal = decode_file(path).map_err(|e| Error::Decode {
            path: path.to_path_buf(),
            message: format!("{e:#}"),
        })?;

        tracing::debug!(
            path = %path.display(),
            sample_rate = signal.sample_rate,
            channels = signal.channels,
            secs = signal.duration_secs(),
            "loaded source"
        );

        Ok(LoadedSource::new(path, signal))
    }
}
