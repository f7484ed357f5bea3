//! Table-driven normalization of raw shard headers onto the unified schema.
//!
//! Each unified field lists the source column names it accepts. Monthly
//! archives (2024+) only ever carry the modern header set; annual bundles
//! also contain early shards with the legacy headers (`starttime`,
//! `usertype`, `start station latitude`, ...), so their table carries both
//! spellings. A field no dialect provides is filled with its unknown
//! sentinel, never dropped from the schema.

use chrono::NaiveDateTime;

use crate::error::SchemaError;
use crate::record::{RideableType, RiderKind, RowOutcome, SkipReason, TripRecord};
use crate::resolve::LayoutKind;

/// Accepted source spellings per unified field, most recent first.
struct FieldNames {
    field: &'static str,
    modern: &'static str,
    legacy: Option<&'static str>,
    required: bool,
}

const FIELDS: &[FieldNames] = &[
    FieldNames { field: "ride_id", modern: "ride_id", legacy: Some("bikeid"), required: true },
    FieldNames { field: "rideable_type", modern: "rideable_type", legacy: None, required: false },
    FieldNames { field: "started_at", modern: "started_at", legacy: Some("starttime"), required: true },
    FieldNames { field: "ended_at", modern: "ended_at", legacy: Some("stoptime"), required: true },
    FieldNames { field: "start_station_name", modern: "start_station_name", legacy: Some("start station name"), required: false },
    FieldNames { field: "start_station_id", modern: "start_station_id", legacy: Some("start station id"), required: false },
    FieldNames { field: "end_station_name", modern: "end_station_name", legacy: Some("end station name"), required: false },
    FieldNames { field: "end_station_id", modern: "end_station_id", legacy: Some("end station id"), required: false },
    FieldNames { field: "start_lat", modern: "start_lat", legacy: Some("start station latitude"), required: false },
    FieldNames { field: "start_lng", modern: "start_lng", legacy: Some("start station longitude"), required: false },
    FieldNames { field: "end_lat", modern: "end_lat", legacy: Some("end station latitude"), required: false },
    FieldNames { field: "end_lng", modern: "end_lng", legacy: Some("end station longitude"), required: false },
    FieldNames { field: "member_casual", modern: "member_casual", legacy: Some("usertype"), required: false },
];

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A resolved header mapping for one CSV shard: unified field → source
/// column index. Built once per shard, then applied to every row.
#[derive(Debug)]
pub struct ColumnMap {
    ride_id: usize,
    rideable_type: Option<usize>,
    started_at: usize,
    ended_at: usize,
    start_station_name: Option<usize>,
    start_station_id: Option<usize>,
    end_station_name: Option<usize>,
    end_station_id: Option<usize>,
    start_lat: Option<usize>,
    start_lng: Option<usize>,
    end_lat: Option<usize>,
    end_lng: Option<usize>,
    rider: Option<usize>,
}

impl ColumnMap {
    /// Resolve a shard's header row against the dialects `kind` allows.
    pub fn from_headers<'a, I>(kind: LayoutKind, headers: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let headers: Vec<String> = headers
            .into_iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_ascii_lowercase())
            .collect();

        let locate = |names: &FieldNames| -> Option<usize> {
            if let Some(i) = headers.iter().position(|h| h == names.modern) {
                return Some(i);
            }
            match (kind, names.legacy) {
                (LayoutKind::Annual, Some(legacy)) => headers.iter().position(|h| h == legacy),
                _ => None,
            }
        };

        let mut resolved = [None; 13];
        for (slot, names) in resolved.iter_mut().zip(FIELDS) {
            *slot = locate(names);
            if slot.is_none() && names.required {
                return Err(SchemaError::MissingColumn { field: names.field });
            }
        }

        Ok(Self {
            ride_id: resolved[0].unwrap_or_default(),
            rideable_type: resolved[1],
            started_at: resolved[2].unwrap_or_default(),
            ended_at: resolved[3].unwrap_or_default(),
            start_station_name: resolved[4],
            start_station_id: resolved[5],
            end_station_name: resolved[6],
            end_station_id: resolved[7],
            start_lat: resolved[8],
            start_lng: resolved[9],
            end_lat: resolved[10],
            end_lng: resolved[11],
            rider: resolved[12],
        })
    }

    /// Normalize one raw row. `row` resolves a source column index to its
    /// string value, or `None` past the end of a truncated row.
    pub fn normalize<'r>(&self, row: impl Fn(usize) -> Option<&'r str>) -> RowOutcome {
        let text = |idx: Option<usize>| -> Option<String> {
            let value = idx.and_then(&row)?.trim();
            (!value.is_empty()).then(|| value.to_string())
        };
        let float = |idx: Option<usize>| -> Option<f64> {
            idx.and_then(&row).and_then(|v| v.trim().parse().ok())
        };

        let Some(ride_id) = text(Some(self.ride_id)) else {
            let reason = match row(self.ride_id) {
                None => SkipReason::TruncatedRow,
                Some(_) => SkipReason::MissingRideId,
            };
            return RowOutcome::Skipped(reason);
        };
        let Some(started_at) = row(self.started_at).and_then(parse_timestamp) else {
            return RowOutcome::Skipped(SkipReason::BadStartTimestamp);
        };
        let Some(ended_at) = row(self.ended_at).and_then(parse_timestamp) else {
            return RowOutcome::Skipped(SkipReason::BadEndTimestamp);
        };

        RowOutcome::Parsed(TripRecord {
            ride_id,
            rideable_type: self
                .rideable_type
                .and_then(&row)
                .map(RideableType::parse)
                .unwrap_or(RideableType::Unknown),
            started_at,
            ended_at,
            start_station_name: text(self.start_station_name),
            start_station_id: text(self.start_station_id),
            end_station_name: text(self.end_station_name),
            end_station_id: text(self.end_station_id),
            start_lat: float(self.start_lat),
            start_lng: float(self.start_lng),
            end_lat: float(self.end_lat),
            end_lng: float(self.end_lng),
            rider: self
                .rider
                .and_then(&row)
                .map(RiderKind::parse)
                .unwrap_or(RiderKind::Unknown),
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODERN: &[&str] = &[
        "ride_id",
        "rideable_type",
        "started_at",
        "ended_at",
        "start_station_name",
        "start_station_id",
        "end_station_name",
        "end_station_id",
        "start_lat",
        "start_lng",
        "end_lat",
        "end_lng",
        "member_casual",
    ];

    const LEGACY: &[&str] = &[
        "tripduration",
        "starttime",
        "stoptime",
        "start station id",
        "start station name",
        "start station latitude",
        "start station longitude",
        "end station id",
        "end station name",
        "end station latitude",
        "end station longitude",
        "bikeid",
        "usertype",
        "birth year",
        "gender",
    ];

    fn row_fn<'r>(values: &'r [&'r str]) -> impl Fn(usize) -> Option<&'r str> {
        move |i| values.get(i).copied()
    }

    #[test]
    fn test_modern_headers_resolve() {
        let map = ColumnMap::from_headers(LayoutKind::Monthly, MODERN.iter().copied()).unwrap();
        let values = [
            "A1B2", "electric_bike", "2024-06-01 08:15:00.123", "2024-06-01 08:40:10.456",
            "W 21 St", "6140.05", "E 33 St", "6230.02", "40.741", "-73.994", "40.744",
            "-73.980", "member",
        ];
        let RowOutcome::Parsed(rec) = map.normalize(row_fn(&values)) else {
            panic!("expected parsed row");
        };
        assert_eq!(rec.ride_id, "A1B2");
        assert_eq!(rec.rideable_type, RideableType::Electric);
        assert_eq!(rec.rider, RiderKind::Member);
        assert_eq!(rec.start_lat, Some(40.741));
        assert_eq!(rec.start_station_name.as_deref(), Some("W 21 St"));
    }

    #[test]
    fn test_legacy_headers_resolve_in_annual_epoch() {
        let map = ColumnMap::from_headers(LayoutKind::Annual, LEGACY.iter().copied()).unwrap();
        let values = [
            "320", "2020-03-01 07:00:00", "2020-03-01 07:05:20", "72", "W 52 St",
            "40.767", "-73.993", "505", "6 Ave", "40.749", "-73.988", "39341",
            "Subscriber", "1989", "1",
        ];
        let RowOutcome::Parsed(rec) = map.normalize(row_fn(&values)) else {
            panic!("expected parsed row");
        };
        assert_eq!(rec.ride_id, "39341");
        assert_eq!(rec.rideable_type, RideableType::Unknown);
        assert_eq!(rec.rider, RiderKind::Member);
        assert_eq!(rec.end_station_name.as_deref(), Some("6 Ave"));
        assert_eq!(rec.end_lng, Some(-73.988));
    }

    #[test]
    fn test_legacy_headers_rejected_in_monthly_epoch() {
        let err = ColumnMap::from_headers(LayoutKind::Monthly, LEGACY.iter().copied()).unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { field: "ride_id" }));
    }

    #[test]
    fn test_missing_required_column() {
        let headers = ["ride_id", "started_at"];
        let err =
            ColumnMap::from_headers(LayoutKind::Monthly, headers.iter().copied()).unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { field: "ended_at" }));
    }

    #[test]
    fn test_bad_timestamp_skipped() {
        let map = ColumnMap::from_headers(LayoutKind::Monthly, MODERN.iter().copied()).unwrap();
        let values = [
            "A1B2", "classic_bike", "yesterday", "2024-06-01 08:40:10", "", "", "", "",
            "", "", "", "", "casual",
        ];
        assert_eq!(
            map.normalize(row_fn(&values)),
            RowOutcome::Skipped(SkipReason::BadStartTimestamp)
        );
    }

    #[test]
    fn test_missing_identifier_skipped() {
        let map = ColumnMap::from_headers(LayoutKind::Monthly, MODERN.iter().copied()).unwrap();
        let values = [
            "", "classic_bike", "2024-06-01 08:15:00", "2024-06-01 08:40:10", "", "", "",
            "", "", "", "", "", "casual",
        ];
        assert_eq!(
            map.normalize(row_fn(&values)),
            RowOutcome::Skipped(SkipReason::MissingRideId)
        );
    }

    #[test]
    fn test_truncated_row_skipped() {
        let map = ColumnMap::from_headers(LayoutKind::Monthly, MODERN.iter().copied()).unwrap();
        let outcome = map.normalize(|_| None);
        assert_eq!(outcome, RowOutcome::Skipped(SkipReason::TruncatedRow));
    }

    #[test]
    fn test_unknown_sentinels_not_dropped() {
        // Legacy shard lacking rideable_type still yields the full schema.
        let map = ColumnMap::from_headers(LayoutKind::Annual, LEGACY.iter().copied()).unwrap();
        let values = [
            "60", "2020-01-05 12:00:00", "2020-01-05 12:01:00", "", "", "", "", "", "",
            "", "", "77", "Weird", "", "",
        ];
        let RowOutcome::Parsed(rec) = map.normalize(row_fn(&values)) else {
            panic!("expected parsed row");
        };
        assert_eq!(rec.rideable_type, RideableType::Unknown);
        assert_eq!(rec.rider, RiderKind::Unknown);
        assert_eq!(rec.start_station_name, None);
    }

    #[test]
    fn test_fractional_and_plain_timestamps() {
        assert!(parse_timestamp("2024-06-01 08:15:00").is_some());
        assert!(parse_timestamp("2024-06-01 08:15:00.123").is_some());
        assert!(parse_timestamp("2024-06-01T08:15:00").is_some());
        assert!(parse_timestamp("08:15:00").is_none());
    }
}
