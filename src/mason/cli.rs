use clap::Parser;

/// Mason - a minimal self-rebuilding build engine.
#[derive(Debug, Parser)]
pub struct Cli {
    /// Number of build processes that may run simultaneously
    #[arg(short = 'j', long = "jobs", default_value_t = 1)]
    pub jobs: usize,

    /// Rebuild every target regardless of freshness
    #[arg(short = 'B', long = "always-build")]
    pub always_build: bool,

    /// Remove generated artifacts instead of building
    #[arg(long)]
    pub clean: bool,
}
