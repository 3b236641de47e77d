use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fp-itest-devnet")]
#[command(about = "Run a finality-provider integration environment on the in-process devnet", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Parent directory for the per-run test directory
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Number of finality providers to start
    #[arg(short, long, default_value_t = 1)]
    pub instances: usize,

    /// Log filters, e.g. `info` or `debug,fp_itest_core=trace` (defaults to `logging.filters`)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Also write rolling log files into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Consecutive finalized blocks to wait for before tearing down
    #[arg(short, long, default_value_t = 3)]
    pub finalized_blocks: u64,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn apply_to_env(&self) {
        if let Some(config_path) = &self.config {
            std::env::set_var(fp_itest_core::infrastructure::config::CONFIG_PATH_ENV, config_path);
        }

        if let Some(data_dir) = &self.data_dir {
            std::env::set_var(fp_itest_core::infrastructure::config::DATA_DIR_ENV, data_dir);
        }
    }
}
