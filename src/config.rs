use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Reconciles a batch of loyalty orders against the accrual service and
/// prints the resulting balances as CSV.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Submissions CSV file (`type,login,password,order,amount`)
    pub input: PathBuf,

    /// Base address of the accrual service
    #[arg(short = 'r', long, env = "ACCRUAL_SYSTEM_ADDRESS")]
    pub accrual_address: String,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(short = 'd', long, env = "DATABASE_URI")]
    pub db_path: Option<PathBuf>,

    /// Log level; `RUST_LOG` takes precedence when set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Timeout of a single request to the accrual service, in seconds
    #[arg(long, default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Wait between polls while an order is still being processed, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
