use thiserror::Error;

use crate::period::Period;

/// A range endpoint that could not be parsed into a year/month period.
#[derive(Debug, Error)]
#[error("invalid period '{input}': expected 'YYYY' or 'YYYY-MM'")]
pub struct ParsePeriodError {
    pub input: String,
}

/// A date range that cannot be mapped onto any published archive.
#[derive(Debug, Error)]
pub enum UnresolvableRange {
    #[error("start period {start} is after end period {end}")]
    StartAfterEnd { start: Period, end: Period },

    #[error("period {period} predates the first published archive ({first})")]
    BeforeFirstPublished { period: Period, first: Period },

    #[error("period {period} is not in the past (current month is {now})")]
    NotInPast { period: Period, now: Period },
}

/// A sampling fraction outside the accepted `(0, 1]` interval.
#[derive(Debug, Error)]
#[error("sampling fraction must be in (0, 1], got {fraction}")]
pub struct InvalidFraction {
    pub fraction: f64,
}

/// A CSV header row that matches no known archive dialect.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("shard header names no '{field}' column in any accepted dialect")]
    MissingColumn { field: &'static str },
}
