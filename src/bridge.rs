use std::{future::Future, time::Duration};

use anyhow::{Context as _, Result};
use indexmap::IndexMap;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::{
    api::{ApiError, StorageApi},
    catalog::Catalog,
    message::{Skip, SkipReason, map_message},
    model::NewMeasurement,
    retry::RetryPolicy,
    source::MessageSource,
};

#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    pub retry: RetryPolicy,

    /// Reload the catalog once it is older than this. `None` keeps the
    /// snapshot taken at startup.
    pub refresh_interval: Option<Duration>,

    /// Reload the catalog when a message misses it, at most this often.
    pub min_refresh_interval: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct BridgeStats {
    pub received: u64,

    pub submitted: u64,

    pub skipped: IndexMap<SkipReason, u64>,

    pub retries: u64,

    pub dead_lettered: u64,

    pub catalog_refreshes: u64,

    pub catalog_refresh_failures: u64,
}

impl BridgeStats {
    pub fn skipped(&self, reason: SkipReason) -> u64 {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn log_summary(&self) {
        info!(
            received = self.received,
            submitted = self.submitted,
            skipped = self.total_skipped(),
            ignored_error_messages = self.skipped(SkipReason::ErrorMessage),
            malformed = self.skipped(SkipReason::MalformedMessage),
            unknown_mtype = self.skipped(SkipReason::UnknownMeasurementType),
            unknown_sensor = self.skipped(SkipReason::UnknownSensor),
            unsupported_mtype = self.skipped(SkipReason::UnsupportedTypeForSensor),
            retries = self.retries,
            dead_lettered = self.dead_lettered,
            catalog_refreshes = self.catalog_refreshes,
            catalog_refresh_failures = self.catalog_refresh_failures,
            "bridge statistics"
        );
    }
}

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Submitted,
    Skipped(SkipReason),
    DeadLettered,
}

pub struct Bridge<A> {
    api: A,

    catalog: Catalog,

    options: BridgeOptions,

    stats: BridgeStats,

    /// Time of the last catalog load attempt.
    loaded_at: Instant,
}

impl<A: StorageApi> Bridge<A> {
    pub fn new(catalog: Catalog, api: A, options: BridgeOptions) -> Self {
        Self {
            api,
            catalog,
            options,
            stats: BridgeStats::default(),
            loaded_at: Instant::now(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Consumes messages one at a time until the source fails.
    pub async fn run<S: MessageSource>(&mut self, source: &mut S) -> Result<()> {
        self.run_until(source, std::future::pending()).await
    }

    /// Like [`Bridge::run`], but also returns `Ok` once `shutdown` completes.
    ///
    /// `shutdown` is only checked while waiting for the next message. A
    /// message already received is processed to completion first, retries
    /// included, so it always ends up submitted, skipped or dead-lettered.
    pub async fn run_until<S: MessageSource>(
        &mut self,
        source: &mut S,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let raw = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("exiting");
                    return Ok(());
                }
                raw = source.recv() => raw.context("failed to receive a message")?,
            };

            self.process(&raw).await;
        }
    }

    /// Processes one raw message to completion, submission retries included.
    pub async fn process(&mut self, raw: &[u8]) -> Outcome {
        self.stats.received += 1;

        debug!(message = %String::from_utf8_lossy(raw), "received message");

        if self
            .options
            .refresh_interval
            .is_some_and(|interval| self.loaded_at.elapsed() >= interval)
        {
            self.refresh_catalog().await;
        }

        let mapped = match map_message(&self.catalog, raw) {
            Err(skip) if skip.reason().is_catalog_miss() && self.miss_refresh_due() => {
                debug!(reason = %skip.reason(), "catalog miss, reloading the catalog");
                self.refresh_catalog().await;
                map_message(&self.catalog, raw)
            }
            mapped => mapped,
        };

        match mapped {
            Ok(measurement) => self.submit(&measurement).await,
            Err(skip) => {
                self.record_skip(&skip);
                Outcome::Skipped(skip.reason())
            }
        }
    }

    /// Replaces the catalog with a fresh one. On failure the previous
    /// snapshot stays in use.
    pub async fn refresh_catalog(&mut self) {
        self.loaded_at = Instant::now();

        match Catalog::load(&self.api).await {
            Ok(catalog) => {
                if catalog.type_names() != self.catalog.type_names() {
                    info!(
                        "the list of supported types was updated to: {}",
                        catalog.type_names().join(", ")
                    );
                }
                if catalog.sensor_count() != self.catalog.sensor_count() {
                    info!(
                        sensors = catalog.sensor_count(),
                        previous = self.catalog.sensor_count(),
                        "the number of sensors changed"
                    );
                }

                self.catalog = catalog;
                self.stats.catalog_refreshes += 1;
            }
            Err(err) => {
                self.stats.catalog_refresh_failures += 1;
                warn!("unable to refresh the catalog, keeping the previous one: {err:#}");
            }
        }
    }

    fn miss_refresh_due(&self) -> bool {
        self.options
            .min_refresh_interval
            .is_some_and(|interval| self.loaded_at.elapsed() >= interval)
    }

    fn record_skip(&mut self, skip: &Skip) {
        let reason = skip.reason();
        *self.stats.skipped.entry(reason).or_default() += 1;

        match reason {
            SkipReason::ErrorMessage => debug!(%reason, "skipping, since this is an error message"),
            _ => info!(%reason, "skipping message: {skip}"),
        }
    }

    async fn submit(&mut self, measurement: &NewMeasurement) -> Outcome {
        let retry = self.options.retry;
        let mut attempt = 1;

        loop {
            match self.api.post_measurement(measurement).await {
                Ok(created) => {
                    self.stats.submitted += 1;
                    debug!(
                        id = created.id,
                        sensor_id = %created.sensor_id,
                        mtype_id = %created.mtype_id,
                        "measurement stored"
                    );
                    return Outcome::Submitted;
                }
                // The API accepted the record, only its echo is unreadable.
                Err(err @ ApiError::Decode { .. }) => {
                    self.stats.submitted += 1;
                    let err = anyhow::Error::from(err);
                    warn!("measurement stored, but the reply was not understood: {err:#}");
                    return Outcome::Submitted;
                }
                Err(err) if err.is_retryable() && retry.allows_retry(attempt) => {
                    let delay = retry.delay_for(attempt);
                    self.stats.retries += 1;
                    let err = anyhow::Error::from(err);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "failed to post measurement, retrying: {err:#}"
                    );

                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.stats.dead_lettered += 1;
                    let err = anyhow::Error::from(err);
                    warn!(
                        attempts = attempt,
                        sensor_id = %measurement.sensor_id,
                        mtype_id = %measurement.mtype_id,
                        timestamp = measurement.timestamp,
                        value = measurement.value,
                        "dropping measurement: {err:#}"
                    );
                    return Outcome::DeadLettered;
                }
            }
        }
    }
}

/// Loads the catalog, then subscribes and bridges messages until the source
/// fails or `shutdown` completes.
///
/// The subscription is only opened once the catalog is loaded, a failed load
/// returns before `subscribe` is called.
pub async fn start<A, S, F, Fut>(
    api: A,
    options: BridgeOptions,
    subscribe: F,
    shutdown: impl Future<Output = ()>,
) -> Result<BridgeStats>
where
    A: StorageApi,
    S: MessageSource,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<S>>,
{
    let catalog = Catalog::load(&api)
        .await
        .context("failed to load the catalog")?;

    info!(
        "API supports {} measurement types: {}",
        catalog.type_count(),
        catalog.type_names().join(", ")
    );
    info!("API supports {} sensors", catalog.sensor_count());

    let mut source = subscribe().await.context("failed to subscribe")?;

    info!("begin publishing messages with measurement data to the API");

    let mut bridge = Bridge::new(catalog, api, options);

    let result = bridge.run_until(&mut source, shutdown).await;

    bridge.stats().log_summary();

    result.map(|()| bridge.stats)
}
