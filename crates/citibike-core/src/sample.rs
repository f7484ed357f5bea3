//! Deterministic Bernoulli sampling over the normalized record stream.
//!
//! The inclusion decision for a record depends only on the user seed, the
//! record's period, and its position within that period's stream, never on
//! which archive kind delivered it, how many archives the request touched,
//! or where the range boundaries sit. Sampling the same months in two
//! separate requests therefore admits exactly the same records.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::InvalidFraction;
use crate::period::{DateRange, Period};
use crate::table::Column;

/// Domain tag so the draw stream cannot collide with any other SHA-256 use.
const DRAW_TAG: &[u8] = b"citibike-sample-v1";

/// What to sample: the range, the target fraction, the seed, and an
/// optional column projection applied at export time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SampleRequest {
    pub range: DateRange,
    pub fraction: f64,
    pub seed: u64,
    pub columns: Option<Vec<Column>>,
}

impl SampleRequest {
    pub fn new(range: DateRange, fraction: f64, seed: u64) -> Self {
        Self {
            range,
            fraction,
            seed,
            columns: None,
        }
    }
}

/// One independent pseudo-random draw per record.
///
/// A record is admitted when the first eight bytes of
/// `SHA-256(tag ‖ seed ‖ year ‖ month ‖ position)`, read as a `u64`, fall
/// below `fraction · 2^64`. The threshold is held as a `u128` so that
/// `fraction = 1.0` admits every record exactly.
#[derive(Clone, Copy, Debug)]
pub struct RecordSampler {
    seed: u64,
    threshold: u128,
}

impl RecordSampler {
    pub fn new(seed: u64, fraction: f64) -> Result<Self, InvalidFraction> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(InvalidFraction { fraction });
        }
        let threshold = (fraction * (u64::MAX as f64 + 1.0)) as u128;
        Ok(Self { seed, threshold })
    }

    /// Decide inclusion for the record at `position` within `period`'s
    /// stream. Positions are period-relative and zero-based.
    pub fn admit(&self, period: Period, position: u64) -> bool {
        let mut hasher = Sha256::new();
        hasher.update(DRAW_TAG);
        hasher.update(self.seed.to_le_bytes());
        hasher.update(u32::from(period.year).to_le_bytes());
        hasher.update([period.month]);
        hasher.update(position.to_le_bytes());
        let digest = hasher.finalize();

        let mut draw = [0u8; 8];
        draw.copy_from_slice(&digest[..8]);
        u128::from(u64::from_le_bytes(draw)) < self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JUNE: Period = Period {
        year: 2024,
        month: 6,
    };

    #[test]
    fn test_fraction_bounds() {
        assert!(RecordSampler::new(1, 0.0).is_err());
        assert!(RecordSampler::new(1, -0.5).is_err());
        assert!(RecordSampler::new(1, 1.5).is_err());
        assert!(RecordSampler::new(1, f64::NAN).is_err());
        assert!(RecordSampler::new(1, 1.0).is_ok());
        assert!(RecordSampler::new(1, 1e-9).is_ok());
    }

    #[test]
    fn test_full_fraction_admits_everything() {
        let s = RecordSampler::new(7, 1.0).unwrap();
        assert!((0..10_000).all(|i| s.admit(JUNE, i)));
    }

    #[test]
    fn test_deterministic_across_instances() {
        let a = RecordSampler::new(42, 0.3).unwrap();
        let b = RecordSampler::new(42, 0.3).unwrap();
        for i in 0..1_000 {
            assert_eq!(a.admit(JUNE, i), b.admit(JUNE, i));
        }
    }

    #[test]
    fn test_seed_changes_the_draws() {
        let a = RecordSampler::new(42, 0.5).unwrap();
        let b = RecordSampler::new(23, 0.5).unwrap();
        let differing = (0..1_000).filter(|&i| a.admit(JUNE, i) != b.admit(JUNE, i)).count();
        assert!(differing > 0);
    }

    #[test]
    fn test_periods_draw_independently() {
        let s = RecordSampler::new(42, 0.5).unwrap();
        let july = Period::new(2024, 7);
        let differing = (0..1_000).filter(|&i| s.admit(JUNE, i) != s.admit(july, i)).count();
        assert!(differing > 0);
    }

    #[test]
    fn test_achieved_fraction_converges() {
        let fraction = 0.01;
        let s = RecordSampler::new(99, fraction).unwrap();
        let n = 100_000u64;
        let admitted = (0..n).filter(|&i| s.admit(JUNE, i)).count() as f64;
        let achieved = admitted / n as f64;
        assert!((achieved - fraction).abs() < 0.01, "achieved {achieved}");
    }
}
