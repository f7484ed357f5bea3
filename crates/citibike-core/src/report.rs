//! Provenance and failure reporting attached to every pipeline result.

use serde::{Deserialize, Serialize};

use crate::period::Period;
use crate::table::TripTable;

/// Counters describing how a result was produced. Merges additively.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub archives_consulted: usize,
    pub records_seen: u64,
    pub records_skipped: u64,
    pub records_emitted: u64,
}

impl Provenance {
    pub fn merge(&mut self, other: Provenance) {
        self.archives_consulted += other.archives_consulted;
        self.records_seen += other.records_seen;
        self.records_skipped += other.records_skipped;
        self.records_emitted += other.records_emitted;
    }

    /// Actual emitted proportion; zero when nothing was seen.
    pub fn achieved_fraction(&self) -> f64 {
        if self.records_seen == 0 {
            0.0
        } else {
            self.records_emitted as f64 / self.records_seen as f64
        }
    }
}

/// One archive that could not be fetched or read. Sibling archives are
/// unaffected unless the caller asked for fail-fast.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveFailure {
    /// Archive file name, e.g. `202406-citibike-tripdata.zip`.
    pub archive: String,
    /// The requested periods this failure leaves uncovered.
    pub periods: Vec<Period>,
    pub reason: String,
}

/// A sampled (or fully loaded) table plus how it came to be.
#[derive(Clone, Debug, Default)]
pub struct SampleOutcome {
    pub table: TripTable,
    pub provenance: Provenance,
    pub failures: Vec<ArchiveFailure>,
}

/// Result of a download-only run: no extraction, no sampling.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DownloadReport {
    /// Archives fetched over the network this run.
    pub fetched: Vec<String>,
    /// Archives already present and valid in the cache.
    pub already_cached: Vec<String>,
    pub failures: Vec<ArchiveFailure>,
}
