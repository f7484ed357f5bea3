//! Streaming extraction of normalized trip records from cached archives.
//!
//! One pass per archive: zip members are decoded as CSV row by row, pushed
//! through the schema normalizer, and handed to the caller's sink together
//! with the period they belong to. Nothing is held in memory beyond the
//! current row; annual bundles spill their nested monthly zips to an
//! unnamed temp file because zip readers need to seek.
//!
//! The pass is single-use and cancellable: the sink returns
//! [`std::ops::ControlFlow`], and a `Break` stops the stream between two
//! records with no other side effects.

mod error;
mod stream;

pub use error::{Error, Result};
pub use stream::{ExtractStats, stream_archive};
