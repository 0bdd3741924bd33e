//! Transactional archive commit: per-file standardization and write
//! ([`importer`]), staging + atomic batch rename + catalog insert
//! ([`transaction`]), and the dry-run/real-commit orchestration
//! ([`driver`]) — base spec §4.6, §4.8, §4.11.

pub mod driver;
pub mod importer;
pub mod transaction;

use std::path::PathBuf;

use thiserror::Error;

use crate::album::AlbumError;
use crate::catalog::CatalogError;
use crate::mpeg::MpegError;
use crate::paths::TimestampError;
use crate::tags::TagError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("archive target path already exists: {}", .0.display())]
    TargetExists(PathBuf),
    #[error("tag consistency check failed: {0:?}")]
    CheckFailed(Vec<String>),
    #[error("post-write verification failed: {0:?}")]
    PostWriteCheckFailed(Vec<String>),
    #[error(
        "staged tree {} and archive root {} are not on the same filesystem; cross-filesystem rename is a configuration error",
        .from.display(), .to.display()
    )]
    CrossFilesystemRename { from: PathBuf, to: PathBuf },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Mpeg(#[from] MpegError),
    #[error(transparent)]
    Tag(#[from] TagError),
    #[error(transparent)]
    Album(#[from] AlbumError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
}
