mod bootstrap;
mod cli;
mod command;
mod error;
mod freshness;
mod runner;
mod scheduler;
mod target;

pub use bootstrap::{current_step, Bootstrap, BOOTSTRAP_STEP_ENV};
pub use cli::Cli;
pub use command::CommandLine;
pub use error::Error;
pub use freshness::is_stale;
pub use runner::build;
pub use scheduler::Scheduler;
pub use target::{BuildState, Graph, Source, Target, TargetId};

pub type Result<T> = std::result::Result<T, Error>;
