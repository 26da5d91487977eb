use serde::Deserialize;

use crate::error::ServiceError;
use crate::models::ProcessRecord;

/// Interpreter prefix a start command must carry for `python_venv` to apply.
pub const PYTHON_COMMAND_PREFIX: &str = "python";

/// One supervised service as configured in `services_list`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServiceSpec {
    /// Substring searched for in process command lines
    #[serde(rename = "process_name")]
    pub name: String,
    pub description: String,
    /// Disabled services are kept stopped
    pub disabled: bool,
    #[serde(rename = "start_cmd")]
    pub start_command: String,
    #[serde(rename = "cmd_args")]
    pub command_args: Vec<String>,
    #[serde(rename = "stop_cmd")]
    pub stop_command: String,
    /// Virtual environment prepended to a `python ...` start command
    pub python_venv: String,
    pub working_directory: String,
    /// Glob of PID files removed on stop, relative to the working directory
    #[serde(rename = "pid_file")]
    pub pid_file_pattern: String,
    /// Extra `KEY=value` entries for the start command environment
    #[serde(rename = "env_vars")]
    pub environment_overrides: Vec<String>,
    #[serde(rename = "mailing_list")]
    pub notify_list: Vec<String>,

    /// Process assigned by the matcher for the current run
    #[serde(skip)]
    pub matched_process: Option<ProcessRecord>,
    /// Failures accumulated during the current run
    #[serde(skip)]
    pub errors: Vec<ServiceError>,
}

impl ServiceSpec {
    #[cfg(test)]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.matched_process.is_some()
    }

    pub fn matched_pid(&self) -> Option<i32> {
        self.matched_process.as_ref().map(|p| p.pid)
    }

    /// Clears the per-run scratch state.
    pub fn reset_run_state(&mut self) {
        self.matched_process = None;
        self.errors.clear();
    }

    pub fn record(&mut self, err: ServiceError) {
        self.errors.push(err);
    }

    /// Start command with the virtualenv prefix and extra arguments applied.
    pub fn effective_start_command(&self) -> String {
        let mut command = self.start_command.clone();

        if !self.python_venv.is_empty() {
            if command.starts_with(PYTHON_COMMAND_PREFIX) {
                command = format!("{}/bin/{}", self.python_venv, command);
                log::info!(
                    "add 'python_venv' to 'start_cmd' service={} python_venv={} value={}",
                    self.name,
                    self.python_venv,
                    command
                );
            } else {
                log::warn!(
                    "error add 'python_venv' to 'start_cmd' service={}: 'start_cmd' should start with '{}'",
                    self.name,
                    PYTHON_COMMAND_PREFIX
                );
            }
        }

        if !self.command_args.is_empty() {
            command = format!("{} {}", command, self.command_args.join(" "));
            log::debug!(
                "add 'cmd_args' to 'start_cmd' service={} cmd_args={:?} value={}",
                self.name,
                self.command_args,
                command
            );
        }

        command
    }

    /// Environment overrides split into key/value pairs, in configured order.
    pub fn environment_pairs(&self) -> Vec<(&str, &str)> {
        self.environment_overrides
            .iter()
            .filter_map(|entry| match entry.split_once('=') {
                Some(pair) => Some(pair),
                None => {
                    log::warn!(
                        "skip malformed 'env_vars' entry service={} value={}",
                        self.name,
                        entry
                    );
                    None
                }
            })
            .collect()
    }
}
