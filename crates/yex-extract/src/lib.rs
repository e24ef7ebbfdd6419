//! Image extraction engine.
//!
//! A run makes one forward pass: [`layout::detect_layout`] recovers the
//! chunk geometry from the image head, [`reader::ChunkReader`] hands out
//! records, and [`engine`] folds them into an [`table::ObjectTable`] while
//! materializing entries through a [`yex_host::HostFs`]. [`engine::list`]
//! drives the same pass against a discarding host and returns
//! [`listing::ListEntry`] rows instead.

#![forbid(unsafe_code)]

pub mod engine;
pub mod layout;
pub mod listing;
pub mod reader;
pub mod table;

pub use engine::{extract, list, Report};
pub use layout::detect_layout;
pub use listing::ListEntry;
pub use reader::{ChunkReader, Record};
pub use table::{Object, ObjectTable};
pub use yex_error::{ExtractError, Result};
