use anyhow::Context;
use std::fs::OpenOptions;
use std::path::Path;

/// Installs the global logger: `info` by default, `debug` with `--debug`,
/// `RUST_LOG` overrides both. Lines go to `log_file` when given.
pub fn init(debug: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_timestamp_micros();

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("error open log file '{}'", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("logger already initialized")?;
    Ok(())
}
