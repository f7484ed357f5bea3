//! The abstract tabular contract: ordered rows under a fixed, named and
//! typed column schema, with one bridge to Arrow that every concrete
//! writer (CSV, Parquet, Feather) goes through.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, StringBuilder, TimestampMillisecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::record::TripRecord;

/// The unified columns, in canonical order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Column {
    RideId,
    RideableType,
    StartedAt,
    EndedAt,
    StartStationName,
    StartStationId,
    EndStationName,
    EndStationId,
    StartLat,
    StartLng,
    EndLat,
    EndLng,
    MemberCasual,
}

impl Column {
    pub const ALL: [Column; 13] = [
        Column::RideId,
        Column::RideableType,
        Column::StartedAt,
        Column::EndedAt,
        Column::StartStationName,
        Column::StartStationId,
        Column::EndStationName,
        Column::EndStationId,
        Column::StartLat,
        Column::StartLng,
        Column::EndLat,
        Column::EndLng,
        Column::MemberCasual,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::RideId => "ride_id",
            Column::RideableType => "rideable_type",
            Column::StartedAt => "started_at",
            Column::EndedAt => "ended_at",
            Column::StartStationName => "start_station_name",
            Column::StartStationId => "start_station_id",
            Column::EndStationName => "end_station_name",
            Column::EndStationId => "end_station_id",
            Column::StartLat => "start_lat",
            Column::StartLng => "start_lng",
            Column::EndLat => "end_lat",
            Column::EndLng => "end_lng",
            Column::MemberCasual => "member_casual",
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Column::RideId
            | Column::RideableType
            | Column::StartStationName
            | Column::StartStationId
            | Column::EndStationName
            | Column::EndStationId
            | Column::MemberCasual => DataType::Utf8,
            Column::StartedAt | Column::EndedAt => {
                DataType::Timestamp(TimeUnit::Millisecond, None)
            }
            Column::StartLat | Column::StartLng | Column::EndLat | Column::EndLng => {
                DataType::Float64
            }
        }
    }

    fn nullable(&self) -> bool {
        !matches!(
            self,
            Column::RideId | Column::RideableType | Column::StartedAt | Column::EndedAt
                | Column::MemberCasual
        )
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = UnknownColumn;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::ALL
            .into_iter()
            .find(|c| c.name() == s.trim())
            .ok_or_else(|| UnknownColumn {
                name: s.to_string(),
            })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown column '{name}'")]
pub struct UnknownColumn {
    pub name: String,
}

/// Ordered trip records plus the schema bridge to Arrow.
#[derive(Clone, Debug, Default)]
pub struct TripTable {
    rows: Vec<TripRecord>,
}

impl TripTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<TripRecord>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, record: TripRecord) {
        self.rows.push(record);
    }

    pub fn append(&mut self, mut other: TripTable) {
        self.rows.append(&mut other.rows);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[TripRecord] {
        &self.rows
    }

    /// The Arrow schema for a column selection (all columns when `None`).
    pub fn schema(columns: Option<&[Column]>) -> Arc<Schema> {
        let columns = columns.unwrap_or(&Column::ALL);
        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(c.name(), c.data_type(), c.nullable()))
            .collect();
        Arc::new(Schema::new(fields))
    }

    /// Materialize the table as one Arrow `RecordBatch`.
    pub fn to_record_batch(&self, columns: Option<&[Column]>) -> Result<RecordBatch, ArrowError> {
        let selected = columns.unwrap_or(&Column::ALL);
        let arrays: Vec<ArrayRef> = selected.iter().map(|c| self.column_array(*c)).collect();
        RecordBatch::try_new(Self::schema(columns), arrays)
    }

    fn column_array(&self, column: Column) -> ArrayRef {
        match column.data_type() {
            DataType::Utf8 => {
                let mut builder = StringBuilder::new();
                for r in &self.rows {
                    match column {
                        Column::RideId => builder.append_value(&r.ride_id),
                        Column::RideableType => builder.append_value(r.rideable_type.as_str()),
                        Column::StartStationName => {
                            builder.append_option(r.start_station_name.as_deref())
                        }
                        Column::StartStationId => {
                            builder.append_option(r.start_station_id.as_deref())
                        }
                        Column::EndStationName => {
                            builder.append_option(r.end_station_name.as_deref())
                        }
                        Column::EndStationId => builder.append_option(r.end_station_id.as_deref()),
                        Column::MemberCasual => builder.append_value(r.rider.as_str()),
                        _ => unreachable!("non-utf8 column routed to string builder"),
                    }
                }
                Arc::new(builder.finish())
            }
            DataType::Timestamp(..) => {
                let mut builder = TimestampMillisecondBuilder::new();
                for r in &self.rows {
                    let ts = match column {
                        Column::StartedAt => r.started_at,
                        _ => r.ended_at,
                    };
                    builder.append_value(ts.and_utc().timestamp_millis());
                }
                Arc::new(builder.finish())
            }
            _ => {
                let mut builder = Float64Builder::new();
                for r in &self.rows {
                    let v = match column {
                        Column::StartLat => r.start_lat,
                        Column::StartLng => r.start_lng,
                        Column::EndLat => r.end_lat,
                        _ => r.end_lng,
                    };
                    builder.append_option(v);
                }
                Arc::new(builder.finish())
            }
        }
    }
}
