use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ParsePeriodError, UnresolvableRange};

/// A calendar month, the finest granularity the archives are published at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: u16,
    pub month: u8,
}

impl Period {
    pub fn new(year: u16, month: u8) -> Self {
        debug_assert!((1..=12).contains(&month));
        Self { year, month }
    }

    /// The current calendar month according to the local clock.
    pub fn current() -> Self {
        use chrono::Datelike;
        let today = chrono::Local::now().date_naive();
        Self::new(today.year() as u16, today.month() as u8)
    }

    /// The month immediately after this one.
    pub fn next(self) -> Self {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// An inclusive month range, normalized to month granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: Period,
    end: Period,
}

impl DateRange {
    pub fn new(start: Period, end: Period) -> Result<Self, UnresolvableRange> {
        if start > end {
            return Err(UnresolvableRange::StartAfterEnd { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse flexible `--start`/`--end` endpoints.
    ///
    /// A bare year widens to the whole year (`"2021"` means 2021-01 as a
    /// start and 2021-12 as an end); an omitted end equals the start.
    pub fn parse(start: &str, end: Option<&str>) -> Result<Self, ParseRangeError> {
        let s = Endpoint::parse(start)?;
        let e = match end {
            Some(end) => Endpoint::parse(end)?,
            None => s,
        };
        Ok(Self::new(s.start(), e.end())?)
    }

    pub fn start(&self) -> Period {
        self.start
    }

    pub fn end(&self) -> Period {
        self.end
    }

    pub fn contains(&self, p: Period) -> bool {
        self.start <= p && p <= self.end
    }

    /// Iterate every month in the range, ascending.
    pub fn months(&self) -> impl Iterator<Item = Period> + use<> {
        let end = self.end;
        let mut cursor = Some(self.start);
        std::iter::from_fn(move || {
            let p = cursor?;
            cursor = if p < end { Some(p.next()) } else { None };
            Some(p)
        })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One parse error type covering both endpoint syntax and range ordering.
#[derive(Debug, thiserror::Error)]
pub enum ParseRangeError {
    #[error(transparent)]
    Period(#[from] ParsePeriodError),
    #[error(transparent)]
    Range(#[from] UnresolvableRange),
}

/// A parsed endpoint: either a single month or a whole year, which widens
/// differently depending on which side of the range it sits on.
#[derive(Clone, Copy)]
enum Endpoint {
    Month(Period),
    Year(u16),
}

impl Endpoint {
    fn parse(input: &str) -> Result<Self, ParsePeriodError> {
        let err = || ParsePeriodError {
            input: input.to_string(),
        };
        let input = input.trim();
        match input.split_once('-') {
            None => {
                let year: u16 = input.parse().map_err(|_| err())?;
                if input.len() != 4 {
                    return Err(err());
                }
                Ok(Self::Year(year))
            }
            Some((y, m)) => {
                let year: u16 = y.parse().map_err(|_| err())?;
                let month: u8 = m.parse().map_err(|_| err())?;
                if y.len() != 4 || !(1..=12).contains(&month) {
                    return Err(err());
                }
                Ok(Self::Month(Period::new(year, month)))
            }
        }
    }

    fn start(self) -> Period {
        match self {
            Self::Month(p) => p,
            Self::Year(y) => Period::new(y, 1),
        }
    }

    fn end(self) -> Period {
        match self {
            Self::Month(p) => p,
            Self::Year(y) => Period::new(y, 12),
        }
    }
}

impl FromStr for Period {
    type Err = ParsePeriodError;

    /// Strict `YYYY-MM` form, for contexts where a bare year is ambiguous.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Endpoint::parse(s)? {
            Endpoint::Month(p) => Ok(p),
            Endpoint::Year(_) => Err(ParsePeriodError {
                input: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_year_widens() {
        let r = DateRange::parse("2021", None).unwrap();
        assert_eq!(r.start(), Period::new(2021, 1));
        assert_eq!(r.end(), Period::new(2021, 12));
    }

    #[test]
    fn test_month_endpoints() {
        let r = DateRange::parse("2020-5", Some("2021-05")).unwrap();
        assert_eq!(r.start(), Period::new(2020, 5));
        assert_eq!(r.end(), Period::new(2021, 5));
    }

    #[test]
    fn test_year_to_month_range() {
        let r = DateRange::parse("2022", Some("2024-02")).unwrap();
        assert_eq!(r.start(), Period::new(2022, 1));
        assert_eq!(r.end(), Period::new(2024, 2));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        for bad in ["202", "20211", "2021-13", "2021-0", "2021-", "x", ""] {
            assert!(DateRange::parse(bad, None).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_start_after_end_rejected() {
        let err = DateRange::parse("2022-03", Some("2022-02")).unwrap_err();
        assert!(matches!(
            err,
            ParseRangeError::Range(UnresolvableRange::StartAfterEnd { .. })
        ));
    }

    #[test]
    fn test_month_iteration_crosses_year() {
        let r = DateRange::parse("2023-11", Some("2024-02")).unwrap();
        let months: Vec<Period> = r.months().collect();
        assert_eq!(
            months,
            vec![
                Period::new(2023, 11),
                Period::new(2023, 12),
                Period::new(2024, 1),
                Period::new(2024, 2),
            ]
        );
    }

    #[test]
    fn test_single_month_iteration() {
        let r = DateRange::parse("2024-06", Some("2024-06")).unwrap();
        assert_eq!(r.months().count(), 1);
    }

    #[test]
    fn test_period_ordering() {
        assert!(Period::new(2023, 12) < Period::new(2024, 1));
        assert_eq!(Period::new(2023, 12).next(), Period::new(2024, 1));
    }
}
