use clap::Parser;
use std::path::PathBuf;

use crate::services::process_snapshot::DEFAULT_PROC_ROOT;
use crate::services::supervisor::DEFAULT_WORKERS;

/// Service Nanny - keeps the services from a YAML file running
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// YAML file with services properties
    #[arg(short, long, env = "NANNY_CONFIG")]
    pub config: PathBuf,

    /// Restart services even if they are already running
    #[arg(short = 'r', long)]
    pub force_restart: bool,

    /// Only check services without restart and list them
    #[arg(short, long)]
    pub list: bool,

    /// Print the list as JSON
    #[arg(long, requires = "list")]
    pub json: bool,

    /// Path to log file
    #[arg(short = 'f', long, env = "NANNY_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Maximum number of concurrent workers
    #[arg(short, long, env = "NANNY_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers_num: usize,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    pub debug: bool,

    #[arg(long, hide = true, default_value = DEFAULT_PROC_ROOT)]
    pub proc_root: PathBuf,
}
