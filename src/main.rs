use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

mod cli;
mod error;
mod logging;
mod models;
mod report;
mod services;

use cli::CommandArgs;
use models::{SupervisionResult, SupervisorConfig};
use services::{report_errors, LogNotifier, RunOptions, SupervisionRun};

const SUPPORTED_OS: &[&str] = &["linux"];

#[tokio::main]
async fn main() -> ExitCode {
    let args = CommandArgs::parse();

    if let Err(e) = logging::init(args.debug, args.log_file.as_deref()) {
        eprintln!("ERROR: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CommandArgs) -> anyhow::Result<ExitCode> {
    check_os()?;

    let time_start = Instant::now();
    let config_path = absolute(&args.config)?;

    let config = match SupervisorConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            let result = SupervisionResult::fatal(e.into());
            return Ok(finish(&result, time_start));
        }
    };
    let SupervisorConfig { services, mailer } = config;

    let options = RunOptions {
        workers: args.workers_num,
        force_restart: args.force_restart,
        proc_root: args.proc_root,
    };
    let supervision = SupervisionRun::new(services, options);

    if args.list {
        let (views, result) = supervision.list().await;
        if result.is_fatal() {
            return Ok(finish(&result, time_start));
        }

        // unlisted services don't fail the listing itself
        for err in &result.run_errors {
            log::warn!("service skipped in list error={}", err);
        }

        if args.json {
            println!("{}", report::render_json(&views)?);
        } else {
            print!("{}", report::render_table(&views));
        }

        log::debug!("list success elapsed_time={:?}", time_start.elapsed());
        return Ok(ExitCode::SUCCESS);
    }

    let mut result = supervision.check_and_restart().await;
    report_errors(&mut result, mailer.as_ref(), &LogNotifier);

    Ok(finish(&result, time_start))
}

/// Logs the run summary and maps it to the process exit status.
fn finish(result: &SupervisionResult, time_start: Instant) -> ExitCode {
    if !result.restarted.is_empty() {
        log::info!("restarted services value={:?}", result.restarted);
    }

    if result.is_healthy() {
        log::info!("checks success elapsed_time={:?}", time_start.elapsed());
        return ExitCode::SUCCESS;
    }

    log::error!(
        "checks completed with errors elapsed_time={:?} errors={} aborted={}",
        time_start.elapsed(),
        result.error_count(),
        result.is_fatal()
    );
    for message in result.messages() {
        log::error!("error details error={}", message);
    }

    ExitCode::FAILURE
}

fn check_os() -> anyhow::Result<()> {
    let os = std::env::consts::OS;
    if !SUPPORTED_OS.contains(&os) {
        anyhow::bail!("os {} unsupported", os);
    }
    Ok(())
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}
