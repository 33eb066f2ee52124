use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed work list line {line}: {content:?} (expected '<min>,<max>')")]
    MalformedTask { line: usize, content: String },

    #[error("Page ranges {first} and {second} overlap")]
    RangeConflict { first: String, second: String },

    #[error("Could not launch worker for pages {range}: {source}")]
    Launch {
        range: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Dedup failed for {path}: {reason}")]
    DedupIo { path: PathBuf, reason: String },

    #[error("Archive failed for {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),
}
