//! Crate-wide error types.
//!
//! Each subsystem defines its own closed error enum; this module only
//! stitches them together for callers that want a single type to match on
//! (operator binaries mostly just propagate via `anyhow` instead).

use thiserror::Error;

use crate::album::AlbumError;
use crate::catalog::CatalogError;
use crate::import::ImportError;
use crate::mpeg::MpegError;
use crate::nml::NmlError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Mpeg(#[from] MpegError),
    #[error(transparent)]
    Album(#[from] AlbumError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Nml(#[from] NmlError),
    #[error("tag error: {0}")]
    Tag(#[from] crate::tags::TagError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
