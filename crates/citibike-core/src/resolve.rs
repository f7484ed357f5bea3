//! Mapping a month range onto the published archive layout.
//!
//! Citi Bike switched publication layouts at the start of 2024: every year
//! up to and including 2023 is one annual bundle, every month from 2024-01
//! onwards is its own archive. A range straddling the cutoff resolves to a
//! mix of both kinds, each annual bundle listed once no matter how many of
//! its months the range requests.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::UnresolvableRange;
use crate::period::{DateRange, Period};

/// First period ever published under either layout.
pub const FIRST_PUBLISHED: Period = Period {
    year: 2020,
    month: 1,
};

/// Last year published as a single annual bundle.
pub const LAST_BUNDLED_YEAR: u16 = 2023;

/// Default remote location of the public archive bucket.
pub const DEFAULT_BASE_URL: &str = "https://s3.amazonaws.com/tripdata";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutKind {
    Annual,
    Monthly,
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutKind::Annual => write!(f, "annual"),
            LayoutKind::Monthly => write!(f, "monthly"),
        }
    }
}

/// A resolved, addressable reference to one remote archive.
///
/// `months` is the subset of the archive's months the request actually
/// covers: always a single month for [`LayoutKind::Monthly`], between one
/// and twelve months of `year` for [`LayoutKind::Annual`]. Descriptors are
/// immutable once resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    pub kind: LayoutKind,
    pub year: u16,
    pub months: Vec<u8>,
    /// Expected byte size, when known ahead of the transfer.
    pub expected_size: Option<u64>,
    /// Expected SHA-256 of the archive, when known.
    pub checksum: Option<[u8; 32]>,
}

impl ArchiveDescriptor {
    fn annual(year: u16, months: Vec<u8>) -> Self {
        Self {
            kind: LayoutKind::Annual,
            year,
            months,
            expected_size: None,
            checksum: None,
        }
    }

    fn monthly(period: Period) -> Self {
        Self {
            kind: LayoutKind::Monthly,
            year: period.year,
            months: vec![period.month],
            expected_size: None,
            checksum: None,
        }
    }

    /// The archive's file name, identical remotely and in the local cache.
    pub fn file_name(&self) -> String {
        match self.kind {
            LayoutKind::Annual => format!("{}-citibike-tripdata.zip", self.year),
            LayoutKind::Monthly => {
                format!("{}{:02}-citibike-tripdata.zip", self.year, self.months[0])
            }
        }
    }

    pub fn remote_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.file_name())
    }

    pub fn local_path(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(self.file_name())
    }

    /// The periods this descriptor was resolved to cover, ascending.
    pub fn periods(&self) -> Vec<Period> {
        self.months
            .iter()
            .map(|&m| Period::new(self.year, m))
            .collect()
    }
}

impl fmt::Display for ArchiveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} layout)", self.file_name(), self.kind)
    }
}

/// Resolve a range to the ordered archives covering it.
///
/// Pure: `now` is passed in so callers (and tests) control the clock.
/// Periods must lie on or after [`FIRST_PUBLISHED`] and strictly before the
/// current month; archives for the running month do not exist yet.
pub fn resolve(
    range: DateRange,
    now: Period,
) -> Result<Vec<ArchiveDescriptor>, UnresolvableRange> {
    if range.start() < FIRST_PUBLISHED {
        return Err(UnresolvableRange::BeforeFirstPublished {
            period: range.start(),
            first: FIRST_PUBLISHED,
        });
    }
    if range.end() >= now {
        return Err(UnresolvableRange::NotInPast {
            period: range.end(),
            now,
        });
    }

    let mut descriptors = Vec::new();
    let mut annual_months: Vec<u8> = Vec::new();
    let mut annual_year: Option<u16> = None;

    for period in range.months() {
        if period.year <= LAST_BUNDLED_YEAR {
            if annual_year != Some(period.year) {
                if let Some(year) = annual_year.take() {
                    descriptors.push(ArchiveDescriptor::annual(
                        year,
                        std::mem::take(&mut annual_months),
                    ));
                }
                annual_year = Some(period.year);
            }
            annual_months.push(period.month);
        } else {
            // Crossing into the monthly epoch: flush the pending annual
            // bundle first so the output stays chronological.
            if let Some(year) = annual_year.take() {
                descriptors.push(ArchiveDescriptor::annual(
                    year,
                    std::mem::take(&mut annual_months),
                ));
            }
            descriptors.push(ArchiveDescriptor::monthly(period));
        }
    }
    if let Some(year) = annual_year {
        descriptors.push(ArchiveDescriptor::annual(year, annual_months));
    }

    Ok(descriptors)
}
