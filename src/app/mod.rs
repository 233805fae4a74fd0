pub mod bootstrap;
pub mod orchestrator;
pub mod trigger;

pub use bootstrap::Loader;
pub use orchestrator::{select_batch, Orchestrator, RunReport};
pub use trigger::{listen, report_on_interval, run_on_interval, AuthStatus, RunControl};
