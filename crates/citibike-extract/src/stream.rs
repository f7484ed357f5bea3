use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::ControlFlow;
use std::path::Path;

use citibike_core::{ArchiveDescriptor, ColumnMap, LayoutKind, Period, RowOutcome};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{Error, Result};

/// Row counters for one extraction pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// CSV shards decoded.
    pub shards: usize,
    /// Structurally valid rows delivered as `Parsed`.
    pub rows_seen: u64,
    /// Malformed rows delivered as `Skipped`.
    pub rows_skipped: u64,
}

/// Stream every normalized record of `descriptor`'s requested months out
/// of the validated archive at `path`.
///
/// The sink receives `(period, outcome)` pairs in period order, shards
/// sorted by member name within a period, rows in shard order. This is the
/// canonical stream order sampling positions are defined against. A
/// `Break` from the sink ends the pass early; the stats cover whatever was
/// delivered up to that point.
pub fn stream_archive<F>(
    path: &Path,
    descriptor: &ArchiveDescriptor,
    sink: &mut F,
) -> Result<ExtractStats>
where
    F: FnMut(Period, RowOutcome) -> ControlFlow<()>,
{
    let archive_name = descriptor.file_name();
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|_| Error::CorruptArchive {
        archive: archive_name.clone(),
    })?;

    let mut stats = ExtractStats::default();
    match descriptor.kind {
        LayoutKind::Monthly => {
            let period = Period::new(descriptor.year, descriptor.months[0]);
            // a Break leaves nothing further to skip in a monthly archive
            let _ =
                stream_shards(&mut archive, descriptor, &archive_name, period, &mut stats, sink)?;
        }
        LayoutKind::Annual => {
            for &month in &descriptor.months {
                let period = Period::new(descriptor.year, month);
                let mut inner = open_inner_month(&mut archive, &archive_name, period)?;
                let flow = stream_shards(
                    &mut inner,
                    descriptor,
                    &archive_name,
                    period,
                    &mut stats,
                    sink,
                )?;
                if flow.is_break() {
                    break;
                }
            }
        }
    }
    debug!(
        archive = %archive_name,
        shards = stats.shards,
        rows = stats.rows_seen,
        skipped = stats.rows_skipped,
        "extraction pass finished"
    );
    Ok(stats)
}

/// Spill one nested monthly zip to an unnamed temp file and open it.
fn open_inner_month(
    archive: &mut ZipArchive<File>,
    archive_name: &str,
    period: Period,
) -> Result<ZipArchive<File>> {
    let member = format!(
        "{0}-citibike-tripdata/{0}{1:02}-citibike-tripdata.zip",
        period.year, period.month
    );
    let mut entry = archive.by_name(&member).map_err(|_| Error::MissingMember {
        archive: archive_name.to_string(),
        member: member.clone(),
    })?;

    let io_err = |source| Error::Io {
        path: member.clone().into(),
        source,
    };
    let mut spill = tempfile::tempfile().map_err(io_err)?;
    std::io::copy(&mut entry, &mut spill).map_err(io_err)?;
    spill.seek(SeekFrom::Start(0)).map_err(io_err)?;

    ZipArchive::new(spill).map_err(|_| Error::CorruptArchive {
        archive: format!("{archive_name}:{member}"),
    })
}

fn stream_shards<R, F>(
    archive: &mut ZipArchive<R>,
    descriptor: &ArchiveDescriptor,
    archive_name: &str,
    period: Period,
    stats: &mut ExtractStats,
    sink: &mut F,
) -> Result<ControlFlow<()>>
where
    R: Read + Seek,
    F: FnMut(Period, RowOutcome) -> ControlFlow<()>,
{
    let mut members: Vec<String> = archive
        .file_names()
        .filter(|name| is_csv_shard(name))
        .map(str::to_string)
        .collect();
    members.sort();
    if members.is_empty() {
        warn!(archive = %archive_name, %period, "no CSV shards in archive");
    }

    for member in members {
        let entry = archive.by_name(&member).map_err(|_| Error::CorruptArchive {
            archive: archive_name.to_string(),
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(entry);

        let shard_err = |source| Error::ShardRead {
            archive: archive_name.to_string(),
            member: member.clone(),
            source,
        };
        let headers = reader.headers().map_err(shard_err)?;
        let map = ColumnMap::from_headers(descriptor.kind, headers.iter()).map_err(|source| {
            Error::Schema {
                archive: archive_name.to_string(),
                member: member.clone(),
                source,
            }
        })?;

        stats.shards += 1;
        let mut row = csv::StringRecord::new();
        loop {
            match reader.read_record(&mut row) {
                Ok(false) => break,
                Ok(true) => {
                    let outcome = map.normalize(|i| row.get(i));
                    match outcome {
                        RowOutcome::Parsed(_) => stats.rows_seen += 1,
                        RowOutcome::Skipped(_) => stats.rows_skipped += 1,
                    }
                    if sink(period, outcome).is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                Err(source) => return Err(shard_err(source)),
            }
        }
    }
    Ok(ControlFlow::Continue(()))
}

/// Trip-data shards end in `.csv`; everything else (resource forks,
/// `__MACOSX` junk, stray readmes) is ignored.
fn is_csv_shard(name: &str) -> bool {
    if !name.ends_with(".csv") || name.starts_with("__MACOSX") {
        return false;
    }
    !Path::new(name)
        .file_name()
        .and_then(|f| f.to_str())
        .is_none_or(|f| f.starts_with('.') || f.starts_with("._"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_shard_filter() {
        assert!(is_csv_shard("202406-citibike-tripdata_1.csv"));
        assert!(is_csv_shard("dir/202406-citibike-tripdata_2.csv"));
        assert!(!is_csv_shard("__MACOSX/202406-citibike-tripdata_1.csv"));
        assert!(!is_csv_shard("dir/._202406-citibike-tripdata_1.csv"));
        assert!(!is_csv_shard("readme.txt"));
        assert!(!is_csv_shard("202406-citibike-tripdata.zip"));
    }
}
