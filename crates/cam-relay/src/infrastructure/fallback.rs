//! Placeholder image loading.
//!
//! The fallback JPEG is read once at startup into its own frame buffer and
//! never changes afterwards.  A missing, empty or oversized file is fatal:
//! without it there is nothing to serve while the camera is silent.

use std::path::{Path, PathBuf};

use cam_core::FrameBuffer;
use thiserror::Error;
use tracing::info;

/// Error type for fallback image loading.
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("cannot read fallback image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fallback image {path} is empty")]
    Empty { path: PathBuf },

    #[error("fallback image {path} is {size} bytes, larger than the {capacity}-byte frame buffer")]
    TooLarge {
        path: PathBuf,
        size: usize,
        capacity: usize,
    },
}

/// Reads the image at `path` into a buffer of `capacity` bytes.
///
/// # Errors
///
/// See [`FallbackError`].
pub fn load_fallback(path: &Path, capacity: usize) -> Result<FrameBuffer, FallbackError> {
    let bytes = std::fs::read(path).map_err(|source| FallbackError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.is_empty() {
        return Err(FallbackError::Empty {
            path: path.to_path_buf(),
        });
    }

    let buffer = FrameBuffer::from_slice(&bytes, capacity).map_err(|_| FallbackError::TooLarge {
        path: path.to_path_buf(),
        size: bytes.len(),
        capacity,
    })?;

    info!("loaded fallback image {} ({} bytes)", path.display(), buffer.len());
    Ok(buffer)
}
