//! Concrete table writers, selected by the output file's suffix.

use std::fs::File;
use std::path::Path;

use arrow::error::ArrowError;
use citibike_core::{Column, TripTable};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot infer output format from '{path}': expected a .csv, .parquet or .feather suffix")]
    UnknownFormat { path: String },
    #[error("arrow write error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("cannot create {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Output encodings keyed off the file suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Parquet,
    Feather,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("parquet") => Ok(Self::Parquet),
            Some("feather") | Some("arrow") => Ok(Self::Feather),
            _ => Err(Error::UnknownFormat {
                path: path.display().to_string(),
            }),
        }
    }
}

/// Write the table to `path` in the suffix-selected format, projecting
/// onto `columns` when given.
pub fn write_table(path: &Path, table: &TripTable, columns: Option<&[Column]>) -> Result<()> {
    let format = OutputFormat::from_path(path)?;
    let batch = table.to_record_batch(columns)?;
    let file = File::create(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;

    match format {
        OutputFormat::Csv => {
            let mut writer = arrow::csv::WriterBuilder::new()
                .with_header(true)
                .build(file);
            writer.write(&batch)?;
        }
        OutputFormat::Parquet => {
            let props = WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build();
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
            writer.write(&batch)?;
            writer.close()?;
        }
        OutputFormat::Feather => {
            let mut writer = arrow::ipc::writer::FileWriter::try_new(file, &batch.schema())?;
            writer.write(&batch)?;
            writer.finish()?;
        }
    }
    info!(path = %path.display(), rows = table.len(), ?format, "table written");
    Ok(())
}
