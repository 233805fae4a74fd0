use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::watch;

use crate::error::RankingError;
use crate::fetch::DirectoryFetcher;
use crate::notify::{NotificationEmitter, NotificationRecord};
use crate::records::{Institution, InstitutionStore};
use crate::services::{
    carry_history, RankingEngine, Rankings, RefreshOutcome, RefreshPipeline, RefreshSummary,
};

/// What one run did at each stage.
#[derive(Debug, Default)]
pub struct RunReport {
    /// The run was skipped because the halt flag was set when it started.
    pub halted: bool,
    pub fetched: usize,
    pub selected: usize,
    pub refresh: RefreshSummary,
    pub persisted: usize,
    pub notified: usize,
    pub directory_error: Option<String>,
    pub store_error: Option<String>,
    /// `None` when the run ended before the report stage.
    pub rankings: Option<Result<Rankings, RankingError>>,
}

/// Clamp the directory to the first `batch_size` institutions.
pub fn select_batch(mut directory: Vec<Institution>, batch_size: usize) -> Vec<Institution> {
    let size = directory.len().min(batch_size);
    directory.truncate(size);
    directory
}

pub struct Orchestrator {
    directory: DirectoryFetcher,
    pipeline: RefreshPipeline,
    store: Arc<dyn InstitutionStore>,
    emitter: NotificationEmitter,
    rankings: RankingEngine,
    batch_size: usize,
    halt: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        directory: DirectoryFetcher,
        pipeline: RefreshPipeline,
        store: Arc<dyn InstitutionStore>,
        emitter: NotificationEmitter,
        batch_size: usize,
    ) -> Self {
        Self {
            directory,
            pipeline,
            rankings: RankingEngine::new(Arc::clone(&store)),
            store,
            emitter,
            batch_size,
            halt: watch::channel(false).1,
        }
    }

    pub fn with_halt(mut self, halt: watch::Receiver<bool>) -> Self {
        self.halt = halt;
        self
    }

    pub fn ranking_engine(&self) -> RankingEngine {
        self.rankings.clone()
    }

    /// FETCH_DIRECTORY, SELECT_BATCH, REFRESH, PERSIST, NOTIFY, REPORT. Faults are logged and
    /// recorded on the report, never returned.
    pub async fn run_once(&self) -> RunReport {
        let mut report = RunReport::default();
        if *self.halt.borrow() {
            info!("Loader halted; skipping run.");
            report.halted = true;
            return report;
        }

        let directory = match self.directory.fetch_all().await {
            Ok(directory) => directory,
            Err(err) => {
                error!("Failed to fetch institution directory: {err}");
                report.directory_error = Some(err.to_string());
                Vec::new()
            }
        };
        report.fetched = directory.len();

        let batch = select_batch(directory, self.batch_size);
        report.selected = batch.len();
        debug!("Selected {} of {} institutions", report.selected, report.fetched);

        let batch = self.hydrate(batch).await;
        let run = self.pipeline.run(batch, &self.halt).await;
        report.refresh = run.summary;

        let refreshed: Vec<Institution> = run
            .outcomes
            .into_iter()
            .filter_map(RefreshOutcome::into_institution)
            .collect();

        if !refreshed.is_empty() {
            match self.store.upsert_all(&refreshed).await {
                Ok(count) => {
                    info!("Persisted {count} institutions.");
                    report.persisted = count;
                }
                Err(err) => {
                    error!("Failed to persist refreshed institutions: {err}");
                    report.store_error = Some(err.to_string());
                    return report;
                }
            }

            let records = refreshed
                .iter()
                .map(|institution| NotificationRecord::info(institution.symbol.clone()))
                .collect();
            if self.emitter.emit_many(records).await {
                report.notified = refreshed.len();
            }
        }

        report.rankings = Some(self.report_rankings().await);
        report
    }

    /// Log both leaderboards computed from the persisted set.
    pub async fn report_rankings(&self) -> Result<Rankings, RankingError> {
        log_rankings(&self.rankings).await
    }

    async fn hydrate(&self, batch: Vec<Institution>) -> Vec<Institution> {
        let symbols: Vec<String> = batch.iter().map(|i| i.symbol.clone()).collect();
        let persisted = match self.store.find_by_symbols(&symbols).await {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!("Could not read persisted history, refreshing without it: {err}");
                Default::default()
            }
        };

        batch
            .into_iter()
            .map(|fresh| {
                let previous = persisted.get(&fresh.symbol);
                carry_history(fresh, previous)
            })
            .collect()
    }
}

pub(crate) async fn log_rankings(engine: &RankingEngine) -> Result<Rankings, RankingError> {
    let rankings = engine.rankings().await;
    match &rankings {
        Ok(rankings) => info!("{rankings}"),
        Err(RankingError::NoData) => info!("No institutions persisted yet; nothing to rank."),
        Err(err) => warn!("Failed to compute rankings: {err}"),
    }
    rankings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, StoreError};
    use crate::fetch::{ProviderEndpoints, QuoteFetcher, RawResponse, RetryPolicy};
    use crate::notify::{NoticeKind, NoticeStatus};
    use crate::records::MemoryStore;
    use crate::testing::{RecordingChannel, ScriptedTransport};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::time::Duration;

    const SYMBOLS_URL: &str = "https://iex.test/stable/ref-data/symbols?token=tok";

    fn quote_url(symbol: &str) -> String {
        format!("https://iex.test/stable/stock/{symbol}/quote?token=tok")
    }

    struct Harness {
        transport: Arc<ScriptedTransport>,
        channel: Arc<RecordingChannel>,
        store: Arc<MemoryStore>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                transport: Arc::new(ScriptedTransport::default()),
                channel: Arc::new(RecordingChannel::default()),
                store: Arc::new(MemoryStore::new()),
            }
        }

        fn orchestrator(&self, batch_size: usize) -> Orchestrator {
            orchestrator_with_store(self, self.store.clone(), batch_size)
        }

        fn directory(&self, symbols: &[&str]) {
            let entries: Vec<String> = symbols
                .iter()
                .map(|s| format!(r#"{{"symbol":"{s}","isEnabled":true}}"#))
                .collect();
            self.transport.push(
                SYMBOLS_URL,
                Ok(RawResponse::json(StatusCode::OK, format!("[{}]", entries.join(",")))),
            );
        }

        fn quote(&self, symbol: &str, volume: f64) {
            self.transport.push(
                &quote_url(symbol),
                Ok(RawResponse::json(
                    StatusCode::OK,
                    format!(r#"{{"symbol":"{symbol}","volume":{volume},"changePercent":0.01}}"#),
                )),
            );
        }
    }

    fn orchestrator_with_store(
        harness: &Harness,
        store: Arc<dyn InstitutionStore>,
        batch_size: usize,
    ) -> Orchestrator {
        let endpoints = Arc::new(ProviderEndpoints::new("https://iex.test", "tok"));
        let emitter = NotificationEmitter::new(harness.channel.clone());
        let fetcher = QuoteFetcher::new(
            harness.transport.clone(),
            Arc::clone(&endpoints),
            RetryPolicy::new(5, Duration::from_millis(1_000)),
            emitter.clone(),
        );
        Orchestrator::new(
            DirectoryFetcher::new(harness.transport.clone(), endpoints),
            RefreshPipeline::with_concurrency_limit(fetcher, 4),
            store,
            emitter,
            batch_size,
        )
    }

    struct BrokenStore;

    #[async_trait]
    impl InstitutionStore for BrokenStore {
        async fn upsert_all(&self, _: &[Institution]) -> Result<usize, StoreError> {
            Err(StoreError::Io {
                path: "broken.json".into(),
                source: std::io::Error::other("disk full"),
            })
        }

        async fn find_all(&self) -> Result<Vec<Institution>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn batch_smaller_than_limit_is_kept_whole() {
        let directory: Vec<Institution> = (0..30)
            .map(|idx| Institution::new(format!("S{idx}")))
            .collect();

        assert_eq!(select_batch(directory.clone(), 50).len(), 30);
        let clamped = select_batch(directory, 10);
        assert_eq!(clamped.len(), 10);
        assert_eq!(clamped[9].symbol, "S9");
    }

    #[tokio::test(start_paused = true)]
    async fn run_persists_notifies_and_ranks() {
        let harness = Harness::new();
        harness.directory(&["AAPL", "MSFT", "IBM"]);
        harness.quote("AAPL", 300.0);
        harness.quote("MSFT", 200.0);
        // IBM answers 404 and stays without history.

        let report = harness.orchestrator(50).run_once().await;

        assert_eq!(report.fetched, 3);
        assert_eq!(report.selected, 3);
        assert_eq!(report.refresh.updated, 2);
        assert_eq!(report.refresh.unchanged, 1);
        assert_eq!(report.persisted, 3);
        assert_eq!(report.notified, 3);

        let records = harness.channel.records();
        assert_eq!(records.len(), 3);
        assert!(records
            .iter()
            .all(|r| r.kind == NoticeKind::Info && r.status == NoticeStatus::New));

        let rankings = report.rankings.unwrap().unwrap();
        let leaders: Vec<&str> = rankings.by_volume.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(leaders, vec!["AAPL", "MSFT", "IBM"]);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_size_limits_dispatch() {
        let harness = Harness::new();
        harness.directory(&["A", "B", "C"]);
        harness.quote("A", 1.0);
        harness.quote("B", 2.0);

        let report = harness.orchestrator(2).run_once().await;

        assert_eq!(report.fetched, 3);
        assert_eq!(report.selected, 2);
        assert!(!harness
            .transport
            .requested_urls()
            .contains(&quote_url("C")));
    }

    #[tokio::test(start_paused = true)]
    async fn directory_failure_is_a_no_op_run() {
        let harness = Harness::new();
        harness
            .transport
            .push(SYMBOLS_URL, Err(FetchError::Transport("refused".into())));

        let report = harness.orchestrator(50).run_once().await;

        assert!(report.directory_error.is_some());
        assert_eq!(report.selected, 0);
        assert_eq!(report.persisted, 0);
        assert_eq!(harness.transport.calls(), 1);
        assert!(harness.channel.records().is_empty());
        assert!(matches!(report.rankings, Some(Err(RankingError::NoData))));
    }

    #[tokio::test(start_paused = true)]
    async fn history_accumulates_across_runs() {
        let harness = Harness::new();
        let orchestrator = harness.orchestrator(50);

        harness.directory(&["AAPL"]);
        harness.quote("AAPL", 10.0);
        orchestrator.run_once().await;

        harness.directory(&["AAPL"]);
        harness.quote("AAPL", 20.0);
        orchestrator.run_once().await;

        let stored = harness.store.find_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].history_len(), 2);
        assert_eq!(stored[0].latest_volume(), Some(20.0));
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_ends_run_before_notify() {
        let harness = Harness::new();
        harness.directory(&["AAPL"]);
        harness.quote("AAPL", 10.0);

        let report = orchestrator_with_store(&harness, Arc::new(BrokenStore), 50)
            .run_once()
            .await;

        assert!(report.store_error.is_some());
        assert_eq!(report.notified, 0);
        assert!(report.rankings.is_none());
        assert!(harness.channel.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn halted_orchestrator_skips_the_run() {
        let harness = Harness::new();
        harness.directory(&["AAPL"]);
        let (tx, rx) = watch::channel(true);

        let report = harness.orchestrator(50).with_halt(rx).run_once().await;

        assert!(report.halted);
        assert_eq!(harness.transport.calls(), 0);
        drop(tx);
    }
}
