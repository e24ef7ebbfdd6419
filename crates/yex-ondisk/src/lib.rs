//! On-flash record decoding.
//!
//! An image is a bare sequence of chunks, each a data area followed by a
//! spare area. [`tags`] decodes the packed tag at the head of every spare
//! area; [`header`] decodes the object header record that fills the data
//! area of header chunks. Both layers are pure: they take byte slices and
//! return values or [`yex_types::ParseError`], with no I/O and no policy.

#![forbid(unsafe_code)]

pub mod header;
pub mod tags;

pub use header::{ObjectHeader, ObjectType};
pub use tags::{ChunkKind, PackedTag};
