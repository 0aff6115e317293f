use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use api::{ApiError, BeaconApi, Validator};
use common::config::ValidatorSpec;

use crate::chunks::plan_chunks;
use crate::labels::{label_values, LabelSchema};
use crate::metrics::ValidatorMetrics;

/// Periodic sweep driver.
///
/// One poller owns the sweep loop for the process lifetime. Every check
/// interval (and once immediately at startup) it walks the precomputed
/// chunks in order, fetching each one and updating the gauge families.
/// Consecutive chunk requests are paced by the API rate budget; the
/// pacing wait and the check-interval wait are the only suspension
/// points, and both yield to the shutdown signal.
pub struct Poller {
    api: Arc<dyn BeaconApi>,
    specs: HashMap<String, ValidatorSpec>,
    chunks: Vec<Vec<String>>,
    schema: LabelSchema,
    metrics: ValidatorMetrics,
    check_interval: Duration,
    request_delay: Duration,
}

impl Poller {
    pub fn new(
        specs: &[ValidatorSpec],
        check_interval: Duration,
        api: Arc<dyn BeaconApi>,
        registry: &Registry,
    ) -> Result<Self, prometheus::Error> {
        let keys: Vec<String> = specs.iter().map(|spec| spec.pubkey.clone()).collect();
        let chunks = plan_chunks(&keys, api.batch_size());
        let schema = LabelSchema::discover(specs);
        let metrics = ValidatorMetrics::new(schema.names(), registry)?;
        let request_delay = Duration::from_secs(60) / api.max_requests_per_minute();

        let min_sweep = request_delay * chunks.len().saturating_sub(1) as u32;
        if min_sweep >= check_interval {
            warn!(
                chunks = chunks.len(),
                request_delay_ms = request_delay.as_millis() as u64,
                check_interval_secs = check_interval.as_secs(),
                "Minimum sweep duration reaches the check interval; sweeps may overlap"
            );
        }

        Ok(Self {
            api,
            specs: specs
                .iter()
                .map(|spec| (spec.pubkey.clone(), spec.clone()))
                .collect(),
            chunks,
            schema,
            metrics,
            check_interval,
            request_delay,
        })
    }

    /// Drive sweeps until the shutdown signal fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            validators = self.specs.len(),
            chunks = self.chunks.len(),
            "Poller started"
        );

        loop {
            self.sweep(&mut shutdown).await;

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = sleep(self.check_interval) => {
                    debug!(check_interval_secs = self.check_interval.as_secs(), "Tick");
                }
            }
        }

        info!("Poller stopped");
    }

    /// One pass over every chunk, in order.
    ///
    /// A failed chunk is logged and the sweep continues; the pacing
    /// delay is only applied between consecutive requests, never after
    /// the last one.
    async fn sweep(&self, shutdown: &mut watch::Receiver<bool>) {
        for (i, chunk) in self.chunks.iter().enumerate() {
            debug!(chunk = i, "Processing pubkeys");

            if let Err(e) = self.poll_chunk(chunk).await {
                error!(error = %e, pubkeys = ?chunk, "Error updating validators");
            }

            if i + 1 < self.chunks.len() {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return,
                    _ = sleep(self.request_delay) => {}
                }
            }
        }
    }

    async fn poll_chunk(&self, chunk: &[String]) -> Result<(), ApiError> {
        if chunk.is_empty() {
            return Ok(());
        }

        if chunk.len() == 1 {
            let snapshot = self.api.get_validator(&chunk[0]).await?;
            self.update(&snapshot);
        } else {
            let snapshots = self.api.get_validators(chunk).await?;
            for pubkey in chunk {
                if let Some(snapshot) = snapshots.get(pubkey) {
                    self.update(snapshot);
                }
            }
        }

        Ok(())
    }

    fn update(&self, snapshot: &Validator) {
        let Some(spec) = self.specs.get(&snapshot.pubkey) else {
            debug!(pubkey = %snapshot.pubkey, "Snapshot for unconfigured validator");
            return;
        };

        let labels = label_values(&self.schema, snapshot, spec);
        self.metrics.update_from(snapshot, &labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::{timeout, Instant};

    struct MockCall {
        pubkeys: Vec<String>,
        at: Instant,
    }

    struct MockApi {
        batch_size: usize,
        max_requests_per_minute: u32,
        validators: HashMap<String, Validator>,
        fail_for: Option<String>,
        calls: Mutex<Vec<MockCall>>,
    }

    impl MockApi {
        fn new(batch_size: usize, max_requests_per_minute: u32, pubkeys: &[&str]) -> Self {
            let validators = pubkeys
                .iter()
                .map(|pubkey| (pubkey.to_string(), snapshot(pubkey)))
                .collect();

            Self {
                batch_size,
                max_requests_per_minute,
                validators,
                fail_for: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_for(mut self, pubkey: &str) -> Self {
            self.fail_for = Some(pubkey.to_string());
            self
        }

        fn without(mut self, pubkey: &str) -> Self {
            self.validators.remove(pubkey);
            self
        }

        fn record(&self, pubkeys: Vec<String>) {
            self.calls.lock().unwrap().push(MockCall {
                pubkeys,
                at: Instant::now(),
            });
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BeaconApi for MockApi {
        async fn get_validator(&self, pubkey: &str) -> Result<Validator, ApiError> {
            self.record(vec![pubkey.to_string()]);

            if self.fail_for.as_deref() == Some(pubkey) {
                return Err(ApiError::Status {
                    status: "ERROR".to_string(),
                });
            }

            self.validators.get(pubkey).cloned().ok_or(ApiError::Status {
                status: "ERROR".to_string(),
            })
        }

        async fn get_validators(
            &self,
            pubkeys: &[String],
        ) -> Result<HashMap<String, Validator>, ApiError> {
            self.record(pubkeys.to_vec());

            if let Some(fail) = &self.fail_for {
                if pubkeys.contains(fail) {
                    return Err(ApiError::Status {
                        status: "ERROR".to_string(),
                    });
                }
            }

            Ok(pubkeys
                .iter()
                .filter_map(|pubkey| {
                    self.validators
                        .get(pubkey)
                        .map(|validator| (pubkey.clone(), validator.clone()))
                })
                .collect())
        }

        fn batch_size(&self) -> usize {
            self.batch_size
        }

        fn max_requests_per_minute(&self) -> u32 {
            self.max_requests_per_minute
        }
    }

    fn snapshot(pubkey: &str) -> Validator {
        Validator {
            pubkey: pubkey.to_string(),
            balance: 32_000_000_000,
            status: "active_online".to_string(),
            withdrawal_credentials: "0x010000000000000000000000abcdef00".to_string(),
            last_attestation_slot: 100,
            total_withdrawals: 7,
            ..Validator::default()
        }
    }

    fn specs(pubkeys: &[&str]) -> Vec<ValidatorSpec> {
        pubkeys
            .iter()
            .map(|pubkey| ValidatorSpec {
                pubkey: pubkey.to_string(),
                ..ValidatorSpec::default()
            })
            .collect()
    }

    fn gauge_values(registry: &Registry, family: &str) -> HashMap<String, f64> {
        registry
            .gather()
            .iter()
            .filter(|f| f.get_name() == family)
            .flat_map(|f| f.get_metric().iter())
            .map(|m| {
                let pubkey = m
                    .get_label()
                    .iter()
                    .find(|l| l.get_name() == "pubkey")
                    .map(|l| l.get_value().to_string())
                    .unwrap_or_default();
                (pubkey, m.get_gauge().get_value())
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_sweep() {
        let api = Arc::new(MockApi::new(2, 120, &["0xaa", "0xbb", "0xcc"]));
        let registry = Registry::new();
        let poller = Poller::new(
            &specs(&["0xaa", "0xbb", "0xcc"]),
            Duration::from_secs(3600),
            api.clone(),
            &registry,
        )
        .unwrap();
        let (_tx, mut rx) = watch::channel(false);

        let started = Instant::now();
        poller.sweep(&mut rx).await;

        // One batched call for the first chunk, one single call for the
        // remainder, paced 500ms apart for a 120/min budget with no
        // trailing delay.
        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].pubkeys, vec!["0xaa", "0xbb"]);
        assert_eq!(calls[1].pubkeys, vec!["0xcc"]);
        assert_eq!(
            calls[1].at.duration_since(calls[0].at),
            Duration::from_millis(500)
        );
        assert_eq!(started.elapsed(), Duration::from_millis(500));

        for family in [
            "balance",
            "exited",
            "credentials_code",
            "last_attestation_slot",
            "total_withdrawals",
        ] {
            let values = gauge_values(&registry, family);
            assert_eq!(values.len(), 3, "family {family}");
        }
        assert_eq!(gauge_values(&registry, "balance")["0xcc"], 32_000_000_000.0);
        assert_eq!(gauge_values(&registry, "credentials_code")["0xaa"], 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_chunk_delay_matches_rate_budget() {
        let api = Arc::new(MockApi::new(3, 60, &["0xaa", "0xbb", "0xcc", "0xdd"]));
        let registry = Registry::new();
        let poller = Poller::new(
            &specs(&["0xaa", "0xbb", "0xcc", "0xdd"]),
            Duration::from_secs(3600),
            api.clone(),
            &registry,
        )
        .unwrap();
        let (_tx, mut rx) = watch::channel(false);

        poller.sweep(&mut rx).await;

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1].at.duration_since(calls[0].at),
            Duration::from_secs(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chunk_does_not_abort_sweep() {
        let api = Arc::new(
            MockApi::new(2, 120, &["0xaa", "0xbb", "0xcc", "0xdd"]).failing_for("0xaa"),
        );
        let registry = Registry::new();
        let poller = Poller::new(
            &specs(&["0xaa", "0xbb", "0xcc", "0xdd"]),
            Duration::from_secs(3600),
            api.clone(),
            &registry,
        )
        .unwrap();
        let (_tx, mut rx) = watch::channel(false);

        poller.sweep(&mut rx).await;

        assert_eq!(api.call_count(), 2);

        let balances = gauge_values(&registry, "balance");
        assert!(!balances.contains_key("0xaa"));
        assert!(!balances.contains_key("0xbb"));
        assert_eq!(balances["0xcc"], 32_000_000_000.0);
        assert_eq!(balances["0xdd"], 32_000_000_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_missing_from_batch_is_skipped() {
        let api = Arc::new(MockApi::new(2, 120, &["0xaa", "0xbb"]).without("0xbb"));
        let registry = Registry::new();
        let poller = Poller::new(
            &specs(&["0xaa", "0xbb"]),
            Duration::from_secs(3600),
            api.clone(),
            &registry,
        )
        .unwrap();
        let (_tx, mut rx) = watch::channel(false);

        poller.sweep(&mut rx).await;

        let balances = gauge_values(&registry, "balance");
        assert_eq!(balances.len(), 1);
        assert!(balances.contains_key("0xaa"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_sweeps_are_idempotent() {
        let api = Arc::new(MockApi::new(2, 120, &["0xaa", "0xbb", "0xcc"]));
        let registry = Registry::new();
        let poller = Poller::new(
            &specs(&["0xaa", "0xbb", "0xcc"]),
            Duration::from_secs(3600),
            api.clone(),
            &registry,
        )
        .unwrap();
        let (_tx, mut rx) = watch::channel(false);

        poller.sweep(&mut rx).await;
        let first = gauge_values(&registry, "balance");

        poller.sweep(&mut rx).await;
        let second = gauge_values(&registry, "balance");

        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweeps_immediately_at_startup() {
        let api = Arc::new(MockApi::new(2, 120, &["0xaa", "0xbb"]));
        let registry = Registry::new();
        let poller = Poller::new(
            &specs(&["0xaa", "0xbb"]),
            Duration::from_secs(86400),
            api.clone(),
            &registry,
        )
        .unwrap();
        let (tx, rx) = watch::channel(false);

        let base = Instant::now();
        let handle = tokio::spawn(poller.run(rx));

        while api.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        {
            let calls = api.calls.lock().unwrap();
            assert_eq!(calls[0].at, base);
        }

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_preempts_inter_chunk_delay() {
        // Real time: with a 1/min budget the inter-chunk wait is a full
        // minute, so a prompt exit proves cancellation won the race.
        let api = Arc::new(MockApi::new(1, 1, &["0xaa", "0xbb"]));
        let registry = Registry::new();
        let poller = Poller::new(
            &specs(&["0xaa", "0xbb"]),
            Duration::from_secs(86400),
            api.clone(),
            &registry,
        )
        .unwrap();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(poller.run(rx));

        while api.call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tx.send(true).unwrap();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop after shutdown")
            .unwrap();

        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_identity_list_polls_nothing() {
        let api = Arc::new(MockApi::new(2, 120, &[]));
        let registry = Registry::new();
        let poller = Poller::new(&[], Duration::from_secs(3600), api.clone(), &registry).unwrap();
        let (_tx, mut rx) = watch::channel(false);

        poller.sweep(&mut rx).await;

        assert_eq!(api.call_count(), 0);
    }
}
