//! Archive cache management: streaming downloads with incremental
//! verification and atomic placement.
//!
//! A cache entry is the archive file itself, named deterministically from
//! its descriptor. Downloads stream to a `.part` staging path while being
//! hashed, validate, then rename into place, so readers never observe a
//! partially written archive. Concurrent requests for the same entry
//! coalesce into one transfer.

mod cache;
mod error;
mod http;
mod policy;

pub use cache::{CacheManager, PurgeReport};
pub use error::{Error, Result};
pub use http::{ByteStream, HttpClient, HttpError, HttpResponse, ReqwestClient};
pub use policy::FetchPolicy;
