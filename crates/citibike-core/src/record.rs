use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Bike hardware category. Absent entirely from the oldest shards, which
/// map to [`RideableType::Unknown`] rather than dropping the column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideableType {
    Classic,
    Electric,
    Docked,
    Unknown,
}

impl RideableType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "classic_bike" => Self::Classic,
            "electric_bike" => Self::Electric,
            "docked_bike" => Self::Docked,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic_bike",
            Self::Electric => "electric_bike",
            Self::Docked => "docked_bike",
            Self::Unknown => "unknown",
        }
    }
}

/// Rider category. Modern shards say `member`/`casual`; legacy shards say
/// `Subscriber`/`Customer` under a `usertype` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiderKind {
    Member,
    Casual,
    Unknown,
}

impl RiderKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "member" | "Subscriber" => Self::Member,
            "casual" | "Customer" => Self::Casual,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Casual => "casual",
            Self::Unknown => "unknown",
        }
    }
}

/// One trip under the unified schema, stable across both archive epochs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub ride_id: String,
    pub rideable_type: RideableType,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
    pub start_station_name: Option<String>,
    pub start_station_id: Option<String>,
    pub end_station_name: Option<String>,
    pub end_station_id: Option<String>,
    pub start_lat: Option<f64>,
    pub start_lng: Option<f64>,
    pub end_lat: Option<f64>,
    pub end_lng: Option<f64>,
    pub rider: RiderKind,
}

/// Why a raw row was dropped during normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    MissingRideId,
    BadStartTimestamp,
    BadEndTimestamp,
    TruncatedRow,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRideId => write!(f, "missing ride identifier"),
            Self::BadStartTimestamp => write!(f, "unparsable start timestamp"),
            Self::BadEndTimestamp => write!(f, "unparsable end timestamp"),
            Self::TruncatedRow => write!(f, "row shorter than its header"),
        }
    }
}

/// Per-row normalization outcome. Malformed rows are values, not errors:
/// the streaming loop stays free of control-flow-as-exceptions and the
/// caller counts skips into provenance.
#[derive(Clone, Debug, PartialEq)]
pub enum RowOutcome {
    Parsed(TripRecord),
    Skipped(SkipReason),
}
