//! Content-addressed ingest and archival engine for the CHIRP radio music
//! library: MPEG framing and fingerprinting, the ID3v2.4 tag model, artist
//! and title normalization, album assembly, the transactional archive
//! commit, the relational catalog, and incremental Traktor NML export.
//!
//! See each module's docs for its slice of the pipeline; [`import::driver`]
//! is the entry point that ties dropbox scanning, tag standardization, and
//! the catalog together into a periodic import cycle.

pub mod album;
pub mod artist;
pub mod catalog;
pub mod checker;
pub mod dropbox;
pub mod error;
pub mod import;
pub mod model;
pub mod mpeg;
pub mod nml;
pub mod paths;
pub mod tags;

pub use error::{Error, Result};
