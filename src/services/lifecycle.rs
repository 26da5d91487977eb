//! Stop/start state machine for a single service.
//!
//! A restart runs inside a [`WorkingDirGuard`], so the PID-file glob and both
//! shell commands resolve relative paths against the service's working
//! directory. Starting is fire-and-forget: success means the shell was
//! spawned, and the next run's matching pass is what confirms the service.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, error, info, warn};
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::error::ServiceError;
use crate::models::ServiceSpec;
use crate::services::workdir::WorkingDirGuard;

pub const SHELL: &str = "bash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unknown,
    Running,
    NotRunning,
    Stopping,
    Stopped,
    Starting,
    Started,
    FailedStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Every step ran; recorded errors, if any, are soft.
    Completed(LifecycleState),
    /// A hard error ended the sequence in the given state.
    Aborted(LifecycleState),
}

impl RestartOutcome {
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, RestartOutcome::Aborted(_))
    }

    pub fn state(&self) -> LifecycleState {
        match self {
            RestartOutcome::Completed(state) | RestartOutcome::Aborted(state) => *state,
        }
    }
}

pub struct ServiceLifecycle<'a> {
    service: &'a mut ServiceSpec,
    state: LifecycleState,
}

impl<'a> ServiceLifecycle<'a> {
    pub fn new(service: &'a mut ServiceSpec) -> Self {
        let state = if service.name.is_empty() {
            LifecycleState::Unknown
        } else if service.is_running() {
            LifecycleState::Running
        } else {
            LifecycleState::NotRunning
        };

        Self { service, state }
    }

    fn transition(&mut self, next: LifecycleState) {
        debug!(
            "service state service={} from={:?} to={:?}",
            self.service.name, self.state, next
        );
        self.state = next;
    }

    /// Stops the service if it runs, then starts it unless it is disabled.
    pub fn restart(mut self, force_restart: bool) -> RestartOutcome {
        debug!("restart service value={}", self.service.name);

        let working_dir = if self.service.working_directory.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.service.working_directory))
        };

        let cwd = match WorkingDirGuard::enter(working_dir.as_deref()) {
            Ok(guard) => guard,
            Err(source) => {
                error!(
                    "got error when try to change working directory service={} value={} error={}",
                    self.service.name, self.service.working_directory, source
                );
                let path = working_dir.unwrap_or_default();
                self.service.record(ServiceError::WorkingDirectory {
                    service: self.service.name.clone(),
                    path,
                    source,
                });
                return RestartOutcome::Aborted(self.state);
            }
        };

        debug!(
            "directory lock taken service={} exclusive={}",
            self.service.name,
            cwd.is_exclusive()
        );

        self.transition(LifecycleState::Stopping);
        if let Err(err) = self.stop() {
            if err.is_soft() {
                warn!(
                    "service has already stopped value={} error={}",
                    self.service.name, err
                );
                self.service.record(err);
            } else {
                error!(
                    "got error when try to stop service value={} error={}",
                    self.service.name, err
                );
                self.service.record(err);
                return RestartOutcome::Aborted(self.state);
            }
        }
        self.transition(LifecycleState::Stopped);

        if self.service.disabled {
            debug!("service disabled. skip start process value={}", self.service.name);
            return RestartOutcome::Completed(self.state);
        }

        self.transition(LifecycleState::Starting);
        if let Err(err) = self.start() {
            error!(
                "got error when try to start service value={} error={}",
                self.service.name, err
            );
            self.service.record(err);
            self.transition(LifecycleState::FailedStart);
            return RestartOutcome::Aborted(self.state);
        }
        self.transition(LifecycleState::Started);

        if force_restart {
            let notice = ServiceError::ForcedRestart {
                service: self.service.name.clone(),
            };
            warn!(
                "got warning when try to start service value={} error={}",
                self.service.name, notice
            );
            self.service.record(notice);
        }

        RestartOutcome::Completed(self.state)
    }

    fn stop(&mut self) -> Result<(), ServiceError> {
        let Some(pid) = self.service.matched_pid() else {
            self.delete_pid_files();

            if self.service.disabled {
                debug!(
                    "service disabled and has already stopped value={}",
                    self.service.name
                );
                return Ok(());
            }

            return Err(ServiceError::AlreadyStopped {
                service: self.service.name.clone(),
            });
        };

        let result = if self.service.stop_command.is_empty() {
            debug!(
                "service doesn't have 'stop_cmd'. kill process service={} pid={}",
                self.service.name, pid
            );
            self.kill(pid)
        } else {
            self.run_stop_command();
            Ok(())
        };

        self.delete_pid_files();

        result
    }

    /// A failing stop command is only logged; the process may still exit on its own.
    fn run_stop_command(&self) {
        debug!(
            "execute stop command for service service={} value={}",
            self.service.name, self.service.stop_command
        );

        match Command::new(SHELL)
            .arg("-c")
            .arg(&self.service.stop_command)
            .stdin(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => error!(
                "stop command exited with error service={} value={} status={}",
                self.service.name, self.service.stop_command, status
            ),
            Err(e) => error!(
                "got error when try to execute stop command service={} value={} error={}",
                self.service.name, self.service.stop_command, e
            ),
        }
    }

    fn kill(&self, pid: i32) -> Result<(), ServiceError> {
        let kill_error = |reason: &str| ServiceError::Kill {
            service: self.service.name.clone(),
            pid,
            reason: reason.to_string(),
        };

        let target = u32::try_from(pid)
            .map(Pid::from_u32)
            .map_err(|_| kill_error("invalid pid"))?;

        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

        let process = system
            .process(target)
            .ok_or_else(|| kill_error("process not found"))?;

        if !process.kill() {
            return Err(kill_error("signal delivery failed"));
        }

        info!("service process killed service={} pid={}", self.service.name, pid);
        Ok(())
    }

    /// Removes PID files matching the configured glob. Failures are recorded, never returned.
    fn delete_pid_files(&mut self) {
        if self.service.pid_file_pattern.is_empty() {
            debug!(
                "service doesn't have pid file path in 'pid_file' property value={}",
                self.service.name
            );
            return;
        }

        let pattern = if Path::new(&self.service.pid_file_pattern).is_absolute() {
            self.service.pid_file_pattern.clone()
        } else {
            format!("./{}", self.service.pid_file_pattern)
        };

        debug!(
            "search pid file for service service={} value={}",
            self.service.name, pattern
        );

        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(source) => {
                warn!(
                    "search pid got error service={} value={} error={}",
                    self.service.name, pattern, source
                );
                self.service.record(ServiceError::PidFilePattern {
                    service: self.service.name.clone(),
                    pattern,
                    source,
                });
                return;
            }
        };

        let mut matched = 0usize;
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(
                        "can't read pid file candidate service={} error={}",
                        self.service.name, e
                    );
                    continue;
                }
            };
            matched += 1;

            debug!(
                "delete pid file service={} value={}",
                self.service.name,
                path.display()
            );

            if let Err(source) = std::fs::remove_file(&path) {
                error!(
                    "got error when try to delete pid file service={} value={} error={}",
                    self.service.name,
                    path.display(),
                    source
                );
                self.service.record(ServiceError::PidFileRemove {
                    service: self.service.name.clone(),
                    path,
                    source,
                });
            }
        }

        if matched == 0 && !self.service.disabled {
            self.service.record(ServiceError::MissingPidFile {
                service: self.service.name.clone(),
            });
        }
    }

    /// Spawns the start command through the shell and detaches from it.
    fn start(&mut self) -> Result<(), ServiceError> {
        if self.service.start_command.is_empty() {
            debug!(
                "service doesn't have start command in 'start_cmd' property value={}",
                self.service.name
            );
            return Err(ServiceError::NoStartCommand {
                service: self.service.name.clone(),
            });
        }

        let command_line = self.service.effective_start_command();

        let mut command = Command::new(SHELL);
        command
            .arg("-c")
            .arg(&command_line)
            .envs(self.service.environment_pairs())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        debug!(
            "execute start command service={} value={} env={:?}",
            self.service.name, command_line, self.service.environment_overrides
        );

        match command.spawn() {
            Ok(child) => {
                info!(
                    "service start command spawned service={} pid={}",
                    self.service.name,
                    child.id()
                );
                Ok(())
            }
            Err(source) => Err(ServiceError::Spawn {
                service: self.service.name.clone(),
                command: command_line,
                source,
            }),
        }
    }
}
