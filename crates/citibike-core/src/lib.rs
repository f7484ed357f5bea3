//! Pure domain logic for the Citi Bike trip-data sampler.
//!
//! Everything in this crate is side-effect free: mapping a month range to
//! the heterogeneous remote archives that cover it, the unified trip-record
//! schema and the header tables that normalize each archive epoch onto it,
//! the deterministic per-record sampling draw, and the provenance types
//! that accompany every result. Network and filesystem effects live in
//! `citibike-fetch` and `citibike-extract`.

mod config;
mod error;
mod period;
mod record;
mod report;
mod resolve;
mod sample;
mod schema;
mod table;

pub use config::Config;
pub use error::{InvalidFraction, ParsePeriodError, SchemaError, UnresolvableRange};
pub use period::{DateRange, ParseRangeError, Period};
pub use record::{RideableType, RiderKind, RowOutcome, SkipReason, TripRecord};
pub use report::{ArchiveFailure, DownloadReport, Provenance, SampleOutcome};
pub use resolve::{ArchiveDescriptor, LayoutKind, resolve};
pub use sample::{RecordSampler, SampleRequest};
pub use schema::ColumnMap;
pub use table::{Column, TripTable, UnknownColumn};
