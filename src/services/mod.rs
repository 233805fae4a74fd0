pub mod history;
pub mod ranking;
pub mod refresh;

pub use history::{carry_history, merge_quote};
pub use ranking::{top_by_change_percent, top_by_volume, RankingEngine, Rankings};
pub use refresh::{RefreshOutcome, RefreshPipeline, RefreshRun, RefreshSummary};
