//! The pipeline: resolve, fetch, extract, sample, assemble.
//!
//! Archives are worked on concurrently up to the configured cap, but the
//! assembled table is always in resolver order with each archive's records
//! in stream order, so concurrency never shows up in the output.

use std::ops::ControlFlow;

use citibike_core::{
    ArchiveDescriptor, ArchiveFailure, Config, DateRange, DownloadReport, Period, Provenance,
    RecordSampler, RowOutcome, SampleOutcome, SampleRequest, TripTable, resolve,
};
use citibike_extract::{ExtractStats, stream_archive};
use citibike_fetch::{CacheManager, HttpClient, PurgeReport, ReqwestClient};
use futures_util::StreamExt;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resolve(#[from] citibike_core::UnresolvableRange),
    #[error(transparent)]
    Fraction(#[from] citibike_core::InvalidFraction),
    #[error(transparent)]
    Fetch(#[from] citibike_fetch::Error),
    #[error(transparent)]
    Extract(#[from] citibike_extract::Error),
    #[error("extraction worker panicked")]
    Worker(#[from] tokio::task::JoinError),
}

/// One configured pipeline over a cache directory and an HTTP client.
///
/// Generic over the client so tests drive the whole pipeline against a
/// scripted one; production uses [`ReqwestClient`].
pub struct Engine<C> {
    cache: CacheManager<C>,
    config: Config,
}

impl Engine<ReqwestClient> {
    pub fn from_config(config: Config) -> Self {
        Self::new(ReqwestClient::new(), config)
    }
}

impl<C: HttpClient> Engine<C> {
    pub fn new(client: C, config: Config) -> Self {
        let cache = CacheManager::new(client, config.cache_dir.clone(), config.base_url.clone());
        Self { cache, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager<C> {
        &self.cache
    }

    /// Sample the range per `request`. With `fail_fast` the first archive
    /// failure aborts the run; otherwise failures are collected and the
    /// surviving archives still contribute.
    pub async fn sample(&self, request: &SampleRequest, fail_fast: bool) -> Result<SampleOutcome> {
        let sampler = RecordSampler::new(request.seed, request.fraction)?;
        // At fraction 1.0 skip the draw entirely; same record set either
        // way, but load_all equivalence holds by construction.
        let sampler = (request.fraction < 1.0).then_some(sampler);
        self.collect(request.range, sampler, fail_fast).await
    }

    /// Every structurally valid record in the range, no draw applied.
    pub async fn load_all(&self, range: DateRange, fail_fast: bool) -> Result<SampleOutcome> {
        self.collect(range, None, fail_fast).await
    }

    /// Fetch-only pass over the range. `on_done` fires once per archive as
    /// it settles, whatever the outcome; the report lists archives in
    /// resolver order.
    pub async fn download<F>(
        &self,
        range: DateRange,
        force: bool,
        on_done: F,
    ) -> Result<DownloadReport>
    where
        F: Fn(&ArchiveDescriptor) + Sync,
    {
        let descriptors = resolve(range, Period::current())?;
        info!(archives = descriptors.len(), force, "download pass");

        let on_done = &on_done;
        let mut jobs = futures_util::stream::iter(descriptors.iter().enumerate().map(
            |(idx, descriptor)| async move {
                let outcome = if !force && self.cache.is_cached(descriptor) {
                    Ok(None)
                } else if force {
                    self.cache
                        .refresh(descriptor)
                        .await
                        .map(Some)
                        .map_err(Error::from)
                } else {
                    self.cache
                        .ensure_local(descriptor)
                        .await
                        .map(Some)
                        .map_err(Error::from)
                };
                on_done(descriptor);
                (idx, outcome)
            },
        ))
        .buffer_unordered(self.config.max_concurrency.max(1));

        let mut settled = Vec::with_capacity(descriptors.len());
        while let Some(entry) = jobs.next().await {
            settled.push(entry);
        }
        drop(jobs);
        settled.sort_by_key(|(idx, _)| *idx);

        let mut report = DownloadReport::default();
        for (idx, outcome) in settled {
            let descriptor = &descriptors[idx];
            match outcome {
                Ok(None) => report.already_cached.push(descriptor.file_name()),
                Ok(Some(_)) => report.fetched.push(descriptor.file_name()),
                Err(err) => {
                    warn!(archive = %descriptor, %err, "download failed");
                    report.failures.push(failure_for(descriptor, &err));
                }
            }
        }
        Ok(report)
    }

    /// Report and optionally delete everything under the cache directory.
    pub fn purge(&self, dry_run: bool) -> Result<PurgeReport> {
        Ok(self.cache.purge(dry_run)?)
    }

    async fn collect(
        &self,
        range: DateRange,
        sampler: Option<RecordSampler>,
        fail_fast: bool,
    ) -> Result<SampleOutcome> {
        let descriptors = resolve(range, Period::current())?;
        info!(archives = descriptors.len(), %range, "range resolved");

        let mut jobs = futures_util::stream::iter(descriptors.iter().enumerate().map(
            |(idx, descriptor)| async move {
                (idx, self.extract_one(descriptor, sampler).await)
            },
        ))
        .buffer_unordered(self.config.max_concurrency.max(1));

        let mut tables: Vec<Option<TripTable>> = vec![None; descriptors.len()];
        let mut provenance = Provenance::default();
        let mut failures = Vec::new();
        while let Some((idx, outcome)) = jobs.next().await {
            let descriptor = &descriptors[idx];
            match outcome {
                Ok((table, stats)) => {
                    debug!(archive = %descriptor, rows = stats.rows_seen, kept = table.len(), "archive extracted");
                    provenance.merge(Provenance {
                        archives_consulted: 1,
                        records_seen: stats.rows_seen,
                        records_skipped: stats.rows_skipped,
                        records_emitted: table.len() as u64,
                    });
                    tables[idx] = Some(table);
                }
                Err(err) if fail_fast => return Err(err),
                Err(err) => {
                    warn!(archive = %descriptor, %err, "archive dropped from result");
                    failures.push(failure_for(descriptor, &err));
                }
            }
        }
        drop(jobs);

        let mut table = TripTable::new();
        for part in tables.into_iter().flatten() {
            table.append(part);
        }
        Ok(SampleOutcome {
            table,
            provenance,
            failures,
        })
    }

    /// Fetch one archive and run the blocking extraction pass off the
    /// async runtime. Positions restart at zero on every period change so
    /// the draw for a record never depends on which archive carried it.
    async fn extract_one(
        &self,
        descriptor: &ArchiveDescriptor,
        sampler: Option<RecordSampler>,
    ) -> Result<(TripTable, ExtractStats)> {
        let path = self.cache.ensure_local(descriptor).await?;
        let descriptor = descriptor.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut table = TripTable::new();
            let mut current: Option<Period> = None;
            let mut position = 0u64;
            let stats = stream_archive(&path, &descriptor, &mut |period, outcome| {
                if current != Some(period) {
                    current = Some(period);
                    position = 0;
                }
                if let RowOutcome::Parsed(record) = outcome {
                    let admitted = sampler.is_none_or(|s| s.admit(period, position));
                    position += 1;
                    if admitted {
                        table.push(record);
                    }
                }
                ControlFlow::Continue(())
            })?;
            Ok::<_, citibike_extract::Error>((table, stats))
        });
        Ok(handle.await??)
    }
}

fn failure_for(descriptor: &ArchiveDescriptor, err: &Error) -> ArchiveFailure {
    ArchiveFailure {
        archive: descriptor.file_name(),
        periods: descriptor.periods(),
        reason: err.to_string(),
    }
}
