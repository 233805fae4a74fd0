use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use tokio::io::BufReader;

use crate::config::{load_config, Config};
use crate::error::{Context, RankingError, Result};
use crate::fetch::{
    ConnectionCap, DirectoryFetcher, IexClient, ProviderEndpoints, QuoteFetcher, QuoteTransport,
    RetryPolicy,
};
use crate::notify::{build_channel, NotificationEmitter};
use crate::records::{Institution, InstitutionStore, JsonFileStore};
use crate::services::{RankingEngine, RefreshPipeline};

use super::orchestrator::Orchestrator;
use super::trigger::{self, RunControl};

/// Fully wired loader: the orchestrator plus the control that halts it.
pub struct Loader {
    config: Config,
    orchestrator: Arc<Orchestrator>,
    control: RunControl,
}

impl Loader {
    pub fn from_config_path(path: &Path) -> Result<Self> {
        let config = load_config(path)?;
        Self::new(config)
    }

    pub fn new(config: Config) -> Result<Self> {
        let client = IexClient::new(&config.http)?;
        let http = client.http_client();
        let transport: Arc<dyn QuoteTransport> =
            Arc::new(ConnectionCap::new(Arc::new(client), config.http.max_connections));
        let endpoints = Arc::new(ProviderEndpoints::from_config(&config.provider));

        let store: Arc<dyn InstitutionStore> = Arc::new(JsonFileStore::new(&config.store.path));
        let emitter = NotificationEmitter::new(build_channel(&config.notifications, http));

        let retry = RetryPolicy::from_config(&config.retry);
        let fetcher = QuoteFetcher::new(
            Arc::clone(&transport),
            Arc::clone(&endpoints),
            retry,
            emitter.clone(),
        );
        let pipeline = RefreshPipeline::with_concurrency_limit(fetcher, config.refresh.concurrency);

        let control = RunControl::new();
        let orchestrator = Orchestrator::new(
            DirectoryFetcher::new(transport, endpoints),
            pipeline,
            store,
            emitter,
            config.refresh.batch_size,
        )
        .with_halt(control.subscribe());

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            control,
        })
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn rankings(&self) -> RankingEngine {
        self.orchestrator.ranking_engine()
    }

    /// A single run, then return.
    pub async fn run_once(&self) {
        let report = self.orchestrator.run_once().await;
        info!(
            "Run finished: {} fetched, {} selected, {} persisted, {} notified",
            report.fetched, report.selected, report.persisted, report.notified
        );
    }

    /// Interval runs plus the periodic ranking report until Ctrl-C.
    pub async fn watch(&self) -> Result<()> {
        let schedule = &self.config.schedule;
        info!("Refreshing every {:?}.", schedule.interval);

        let runs = tokio::spawn(trigger::run_on_interval(
            Arc::clone(&self.orchestrator),
            schedule.interval,
            self.control.subscribe(),
        ));
        let reports = schedule.report_interval.map(|period| {
            tokio::spawn(trigger::report_on_interval(
                self.rankings(),
                period,
                self.control.subscribe(),
            ))
        });

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        warn!("Interrupted; letting in-flight fetches drain.");
        self.control.halt();

        runs.await?;
        if let Some(reports) = reports {
            reports.await?;
        }
        Ok(())
    }

    /// Drive runs from auth-status messages on stdin until EOF.
    pub async fn listen(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let started = trigger::listen(Arc::clone(&self.orchestrator), &self.control, stdin).await?;
        info!("Input closed after {started} runs.");
        Ok(())
    }

    /// Print both leaderboards from the persisted set.
    pub async fn print_rankings(&self) -> Result<()> {
        let rankings = match self.rankings().rankings().await {
            Ok(rankings) => rankings,
            Err(RankingError::NoData) => {
                println!("No institutions stored in {}.", self.config.store.path.display());
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        println!("Highest volume:");
        print_leaders(&rankings.by_volume, Institution::latest_volume);
        println!("Greatest change percent:");
        print_leaders(&rankings.by_change_percent, Institution::latest_change_percent);
        Ok(())
    }
}

fn print_leaders(leaders: &[Institution], metric: impl Fn(&Institution) -> Option<f64>) {
    for (rank, institution) in leaders.iter().enumerate() {
        let value = metric(institution).map_or_else(|| "n/a".to_string(), |v| v.to_string());
        println!(
            "{:>2}. {:<8} {:>16}  {}",
            rank + 1,
            institution.symbol,
            value,
            institution.name.as_deref().unwrap_or("")
        );
    }
}
