//! The one error type callers of the extraction crates see.
//!
//! Decode-level failures ([`yex_types::ParseError`]) and I/O failures convert
//! into it; everything else is a named condition with enough context to print
//! a useful one-line diagnostic. Recoverable conditions (stray chunks below
//! the give-up threshold, refused ownership changes) are not errors and are
//! reported through `tracing` at their call sites instead.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use thiserror::Error;
use yex_types::{ObjectId, ParseError};

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("image read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record decode failed: {0}")]
    Parse(#[from] ParseError),

    #[error("not a yaffs2 image")]
    NotAnImage,

    #[error("unable to determine the flash layout from the image head")]
    LayoutUnknown,

    #[error("broken image: {reason}")]
    BrokenImage { reason: String },

    #[error("too many chunks without a preceding object header ({count}), giving up")]
    TooManyStrayChunks { count: u32 },

    #[error("object {id} has unusable name {name:?}")]
    InvalidObjectName { id: ObjectId, name: String },

    #[error("object {id} appears more than once in the image")]
    DuplicateObject { id: ObjectId },

    #[error("object {id} refers to unknown parent {parent}")]
    MissingParent { id: ObjectId, parent: ObjectId },

    #[error("object {id} has parent {parent}, which is not a directory")]
    ParentNotDirectory { id: ObjectId, parent: ObjectId },

    #[error("object {id} links to unknown object {target}")]
    MissingLinkTarget { id: ObjectId, target: ObjectId },

    #[error("root object header does not describe a directory")]
    RootNotDirectory,

    #[error("{op} {} failed: {source}", path.display())]
    HostOp {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ExtractError {
    /// Shorthand for stream-structure violations.
    #[must_use]
    pub fn broken(reason: impl Into<String>) -> Self {
        Self::BrokenImage {
            reason: reason.into(),
        }
    }
}
