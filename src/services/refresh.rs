use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::error::RefreshError;
use crate::fetch::{ensure_concurrency_limit, QuoteFetcher, REFRESH_CONCURRENCY_LIMIT};
use crate::records::Institution;

use super::ranking::compare_desc;

/// Result for one institution dispatched into the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Refreshed(Institution),
    Failed { symbol: String, error: RefreshError },
}

impl RefreshOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            RefreshOutcome::Refreshed(institution) => &institution.symbol,
            RefreshOutcome::Failed { symbol, .. } => symbol,
        }
    }

    pub fn institution(&self) -> Option<&Institution> {
        match self {
            RefreshOutcome::Refreshed(institution) => Some(institution),
            RefreshOutcome::Failed { .. } => None,
        }
    }

    pub fn into_institution(self) -> Option<Institution> {
        match self {
            RefreshOutcome::Refreshed(institution) => Some(institution),
            RefreshOutcome::Failed { .. } => None,
        }
    }

    fn volume(&self) -> Option<f64> {
        self.institution()
            .and_then(Institution::latest_volume)
            .filter(|v| !v.is_nan())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Institutions handed to the quote fetcher.
    pub dispatched: usize,
    /// Refreshed with a new snapshot.
    pub updated: usize,
    /// Refreshed without new data (client error, non-JSON, empty body).
    pub unchanged: usize,
    pub failed: usize,
    pub skipped_disabled: usize,
    /// Enabled institutions left undispatched because the run was halted.
    pub not_dispatched: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshRun {
    /// Descending by latest volume; absent volume and failures last, ties in input order.
    pub outcomes: Vec<RefreshOutcome>,
    pub summary: RefreshSummary,
}

/// Fans a batch out to the quote fetcher under a fixed concurrency bound.
pub struct RefreshPipeline {
    fetcher: QuoteFetcher,
    concurrency: usize,
}

impl RefreshPipeline {
    pub fn new(fetcher: QuoteFetcher) -> Self {
        Self::with_concurrency_limit(fetcher, REFRESH_CONCURRENCY_LIMIT)
    }

    pub fn with_concurrency_limit(fetcher: QuoteFetcher, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: ensure_concurrency_limit(concurrency),
        }
    }

    /// Refresh every enabled institution in `batch`. Once `halt` reads `true` no further
    /// institution is dispatched; those already in flight run to completion.
    pub async fn run(&self, batch: Vec<Institution>, halt: &watch::Receiver<bool>) -> RefreshRun {
        let (enabled, disabled): (Vec<Institution>, Vec<Institution>) =
            batch.into_iter().partition(|institution| institution.enabled);
        let enabled_count = enabled.len();
        if !disabled.is_empty() {
            debug!("Skipping {} disabled institutions", disabled.len());
        }

        let dispatched = Arc::new(AtomicUsize::new(0));
        let fetcher = &self.fetcher;

        let results: Vec<Option<(usize, RefreshOutcome, bool)>> =
            stream::iter(enabled.into_iter().enumerate())
                .map(|(index, institution)| {
                    let halt = halt.clone();
                    let dispatched = Arc::clone(&dispatched);
                    async move {
                        if *halt.borrow() {
                            return None;
                        }
                        dispatched.fetch_add(1, Ordering::SeqCst);

                        let symbol = institution.symbol.clone();
                        let known = institution.history_len();
                        let (outcome, updated) = match fetcher.refresh(institution).await {
                            Ok(refreshed) => {
                                let updated = refreshed.history_len() > known;
                                (RefreshOutcome::Refreshed(refreshed), updated)
                            }
                            Err(error) => (RefreshOutcome::Failed { symbol, error }, false),
                        };
                        Some((index, outcome, updated))
                    }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut completed: Vec<(usize, RefreshOutcome, bool)> =
            results.into_iter().flatten().collect();
        completed.sort_by(|(left_idx, left, _), (right_idx, right, _)| {
            compare_desc(left.volume(), right.volume()).then(left_idx.cmp(right_idx))
        });

        let dispatched = dispatched.load(Ordering::SeqCst);
        let mut summary = RefreshSummary {
            dispatched,
            skipped_disabled: disabled.len(),
            not_dispatched: enabled_count - dispatched,
            ..RefreshSummary::default()
        };
        let outcomes: Vec<RefreshOutcome> = completed
            .into_iter()
            .map(|(_, outcome, updated)| {
                match (&outcome, updated) {
                    (RefreshOutcome::Failed { .. }, _) => summary.failed += 1,
                    (_, true) => summary.updated += 1,
                    (_, false) => summary.unchanged += 1,
                }
                outcome
            })
            .collect();

        if summary.not_dispatched > 0 {
            warn!(
                "Run halted; {} institutions were not dispatched",
                summary.not_dispatched
            );
        }
        info!(
            "Refreshed {} institutions: {} updated, {} unchanged, {} failed, {} disabled",
            summary.dispatched,
            summary.updated,
            summary.unchanged,
            summary.failed,
            summary.skipped_disabled
        );

        RefreshRun { outcomes, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::{ConnectionCap, ProviderEndpoints, QuoteTransport, RawResponse, RetryPolicy};
    use crate::notify::{NoticeKind, NotificationEmitter};
    use crate::testing::{RecordingChannel, ScriptedTransport, TrackingTransport};
    use reqwest::StatusCode;
    use std::time::Duration;

    fn quote_url(symbol: &str) -> String {
        format!("https://iex.test/stable/stock/{symbol}/quote?token=tok")
    }

    fn pipeline(
        transport: Arc<dyn QuoteTransport>,
        channel: Arc<RecordingChannel>,
        concurrency: usize,
    ) -> RefreshPipeline {
        let fetcher = QuoteFetcher::new(
            transport,
            Arc::new(ProviderEndpoints::new("https://iex.test", "tok")),
            RetryPolicy::new(5, Duration::from_millis(1_000)),
            NotificationEmitter::new(channel),
        );
        RefreshPipeline::with_concurrency_limit(fetcher, concurrency)
    }

    fn batch_of(count: usize) -> Vec<Institution> {
        (0..count)
            .map(|idx| Institution::new(format!("S{idx}")))
            .collect()
    }

    fn quote(transport: &ScriptedTransport, symbol: &str, volume: Option<f64>) {
        let body = match volume {
            Some(v) => format!(r#"{{"symbol":"{symbol}","volume":{v}}}"#),
            None => format!(r#"{{"symbol":"{symbol}","volume":null}}"#),
        };
        transport.push(&quote_url(symbol), Ok(RawResponse::json(StatusCode::OK, body)));
    }

    fn not_halted() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    fn disabled(symbol: &str) -> Institution {
        Institution {
            enabled: false,
            ..Institution::new(symbol)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_institutions_are_never_fetched() {
        let transport = Arc::new(ScriptedTransport::default());
        quote(&transport, "A", Some(1.0));
        quote(&transport, "C", Some(2.0));
        let channel = Arc::new(RecordingChannel::default());

        let run = pipeline(transport.clone(), channel, 4)
            .run(
                vec![Institution::new("A"), disabled("B"), Institution::new("C")],
                &not_halted(),
            )
            .await;

        let requested = transport.requested_urls();
        assert_eq!(requested.len(), 2);
        assert!(!requested.contains(&quote_url("B")));
        assert!(run.outcomes.iter().all(|outcome| outcome.symbol() != "B"));
        assert_eq!(run.summary.skipped_disabled, 1);
        assert_eq!(run.summary.dispatched, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn orders_by_descending_volume_with_absent_last() {
        let transport = Arc::new(ScriptedTransport::default());
        quote(&transport, "LOW", Some(10.0));
        quote(&transport, "NONE1", None);
        quote(&transport, "HIGH", Some(500.0));
        quote(&transport, "NONE2", None);
        quote(&transport, "MID", Some(100.0));
        let channel = Arc::new(RecordingChannel::default());

        let batch = ["LOW", "NONE1", "HIGH", "NONE2", "MID"]
            .into_iter()
            .map(Institution::new)
            .collect();
        let run = pipeline(transport, channel, 3).run(batch, &not_halted()).await;

        let symbols: Vec<&str> = run.outcomes.iter().map(RefreshOutcome::symbol).collect();
        assert_eq!(symbols, vec!["HIGH", "MID", "LOW", "NONE1", "NONE2"]);
        assert_eq!(run.summary.updated, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_does_not_affect_siblings() {
        let transport = Arc::new(ScriptedTransport::default());
        for _ in 0..5 {
            transport.push(
                &quote_url("BAD"),
                Ok(RawResponse::json(StatusCode::TOO_MANY_REQUESTS, "{}")),
            );
        }
        quote(&transport, "GOOD", Some(42.0));
        transport.push(
            &quote_url("GONE"),
            Ok(RawResponse::json(StatusCode::NOT_FOUND, "{}")),
        );
        let channel = Arc::new(RecordingChannel::default());

        let run = pipeline(transport, channel.clone(), 2)
            .run(
                vec![
                    Institution::new("BAD"),
                    Institution::new("GOOD"),
                    Institution::new("GONE"),
                ],
                &not_halted(),
            )
            .await;

        assert_eq!(run.outcomes.len(), 3);
        assert_eq!(run.outcomes[0].symbol(), "GOOD");
        assert!(run
            .outcomes
            .iter()
            .any(|o| matches!(o, RefreshOutcome::Failed { symbol, .. } if symbol == "BAD")));
        assert_eq!(run.summary.updated, 1);
        assert_eq!(run.summary.unchanged, 1);
        assert_eq!(run.summary.failed, 1);

        let sent = channel.records();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NoticeKind::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn halted_run_dispatches_nothing() {
        let transport = Arc::new(ScriptedTransport::default());
        let channel = Arc::new(RecordingChannel::default());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let run = pipeline(transport.clone(), channel, 2)
            .run(vec![Institution::new("A"), Institution::new("B")], &rx)
            .await;

        assert!(run.outcomes.is_empty());
        assert_eq!(transport.calls(), 0);
        assert_eq!(run.summary.not_dispatched, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn halt_mid_run_lets_in_flight_fetches_drain() {
        let transport = Arc::new(ScriptedTransport::default());
        // The first fetch backs off once; the halt lands while it sleeps.
        transport.push(&quote_url("A"), Err(FetchError::Transport("reset".into())));
        quote(&transport, "A", Some(1.0));
        quote(&transport, "B", Some(2.0));
        let channel = Arc::new(RecordingChannel::default());
        let (tx, rx) = watch::channel(false);

        let pipeline = pipeline(transport.clone(), channel, 1);
        let halter = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            tx.send(true).unwrap();
            tx
        });

        let run = pipeline
            .run(vec![Institution::new("A"), Institution::new("B")], &rx)
            .await;
        let _tx = halter.await.unwrap();

        let symbols: Vec<&str> = run.outcomes.iter().map(RefreshOutcome::symbol).collect();
        assert_eq!(symbols, vec!["A"]);
        assert_eq!(run.summary.not_dispatched, 1);
        assert!(!transport.requested_urls().contains(&quote_url("B")));
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_never_exceeds_concurrency_limit() {
        let transport = Arc::new(TrackingTransport::new(Duration::from_millis(100)));
        let channel = Arc::new(RecordingChannel::default());

        let run = pipeline(transport.clone(), channel, 3)
            .run(batch_of(10), &not_halted())
            .await;

        assert_eq!(run.outcomes.len(), 10);
        assert_eq!(run.summary.updated, 10);
        assert_eq!(transport.calls(), 10);
        assert_eq!(transport.peak(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_cap_bounds_requests_below_fan_out() {
        let tracking = Arc::new(TrackingTransport::new(Duration::from_millis(100)));
        let capped = Arc::new(ConnectionCap::new(tracking.clone(), 2));
        let channel = Arc::new(RecordingChannel::default());

        let run = pipeline(capped, channel, 8)
            .run(batch_of(6), &not_halted())
            .await;

        assert_eq!(run.outcomes.len(), 6);
        assert_eq!(tracking.calls(), 6);
        assert_eq!(tracking.peak(), 2);
    }
}
