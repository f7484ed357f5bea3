//! Download, cache and deterministically sample Citi Bike trip data.
//!
//! The programmatic surface callers embed:
//!
//! ```no_run
//! # async fn demo() -> citibike::engine::Result<()> {
//! use citibike::Engine;
//! use citibike_core::{Config, DateRange, SampleRequest};
//!
//! let engine = Engine::from_config(Config::from_env());
//! let range = DateRange::parse("2024-01", Some("2024-03")).unwrap();
//! let outcome = engine
//!     .sample(&SampleRequest::new(range, 0.01, 42), false)
//!     .await?;
//! println!("{} rides", outcome.table.len());
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod writer;

pub use engine::Engine;
pub use writer::{OutputFormat, write_table};
