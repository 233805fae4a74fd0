use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::RankingError;
use crate::records::{Institution, InstitutionStore};

/// Size of every ranking list.
pub const RANKING_SIZE: usize = 5;

/// Numeric metric of the most recent quote snapshot used for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMetric {
    Volume,
    ChangePercent,
}

impl RankingMetric {
    fn value(self, institution: &Institution) -> Option<f64> {
        let value = match self {
            RankingMetric::Volume => institution.latest_volume(),
            RankingMetric::ChangePercent => institution.latest_change_percent(),
        };
        value.filter(|v| !v.is_nan())
    }
}

/// Descending by metric, absent values last. Equal keys compare equal so a stable sort keeps input order.
pub fn compare_desc(left: Option<f64>, right: Option<f64>) -> Ordering {
    match (left, right) {
        (Some(l), Some(r)) => r.partial_cmp(&l).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Top [`RANKING_SIZE`] institutions by `metric`. Fails with [`RankingError::NoData`] on empty input.
pub fn top_by(
    institutions: &[Institution],
    metric: RankingMetric,
) -> Result<Vec<Institution>, RankingError> {
    if institutions.is_empty() {
        return Err(RankingError::NoData);
    }

    let mut ranked: Vec<&Institution> = institutions.iter().collect();
    ranked.sort_by(|a, b| compare_desc(metric.value(a), metric.value(b)));
    Ok(ranked.into_iter().take(RANKING_SIZE).cloned().collect())
}

pub fn top_by_volume(institutions: &[Institution]) -> Result<Vec<Institution>, RankingError> {
    top_by(institutions, RankingMetric::Volume)
}

pub fn top_by_change_percent(
    institutions: &[Institution],
) -> Result<Vec<Institution>, RankingError> {
    top_by(institutions, RankingMetric::ChangePercent)
}

/// Both leaderboards computed from one read of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Rankings {
    pub by_volume: Vec<Institution>,
    pub by_change_percent: Vec<Institution>,
}

impl fmt::Display for Rankings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "The highest stock: ")?;
        write_leaders(f, &self.by_volume, RankingMetric::Volume)?;
        write!(f, " | The greatest change percent: ")?;
        write_leaders(f, &self.by_change_percent, RankingMetric::ChangePercent)
    }
}

fn write_leaders(
    f: &mut fmt::Formatter<'_>,
    leaders: &[Institution],
    metric: RankingMetric,
) -> fmt::Result {
    let entries: Vec<String> = leaders
        .iter()
        .map(|institution| match metric.value(institution) {
            Some(value) => format!("{}={}", institution.symbol, value),
            None => format!("{}=n/a", institution.symbol),
        })
        .collect();
    write!(f, "[{}]", entries.join(", "))
}

/// Recomputes rankings from the full persisted set on every call.
#[derive(Clone)]
pub struct RankingEngine {
    store: Arc<dyn InstitutionStore>,
}

impl RankingEngine {
    pub fn new(store: Arc<dyn InstitutionStore>) -> Self {
        Self { store }
    }

    pub async fn highest_volume(&self) -> Result<Vec<Institution>, RankingError> {
        top_by_volume(&self.store.find_all().await?)
    }

    pub async fn highest_change_percent(&self) -> Result<Vec<Institution>, RankingError> {
        top_by_change_percent(&self.store.find_all().await?)
    }

    pub async fn rankings(&self) -> Result<Rankings, RankingError> {
        let institutions = self.store.find_all().await?;
        Ok(Rankings {
            by_volume: top_by_volume(&institutions)?,
            by_change_percent: top_by_change_percent(&institutions)?,
        })
    }
}
