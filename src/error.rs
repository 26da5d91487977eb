use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures recorded against a single service during one run.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Service '{service}' stop failed. Service process PID = 0. Looks like service has already stopped")]
    AlreadyStopped { service: String },

    #[error("Service '{service}' restarted with key --force-restart")]
    ForcedRestart { service: String },

    #[error("Service '{service}' doesn't have PID file which path defined in 'pid_file' property")]
    MissingPidFile { service: String },

    #[error("Service '{service}' has invalid 'pid_file' pattern '{pattern}': {source}")]
    PidFilePattern {
        service: String,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Service '{service}' can't delete PID file '{}': {source}", .path.display())]
    PidFileRemove {
        service: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Service '{service}' can't kill process {pid}: {reason}")]
    Kill {
        service: String,
        pid: i32,
        reason: String,
    },

    #[error("Service '{service}' doesn't have start command in 'start_cmd' property")]
    NoStartCommand { service: String },

    #[error("Service '{service}' start command '{command}' failed: {source}")]
    Spawn {
        service: String,
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Service '{service}' can't change working directory to '{}': {source}", .path.display())]
    WorkingDirectory {
        service: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ServiceError {
    /// Soft errors are reported but never stop the remaining lifecycle steps.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ServiceError::AlreadyStopped { .. }
                | ServiceError::ForcedRestart { .. }
                | ServiceError::MissingPidFile { .. }
                | ServiceError::PidFilePattern { .. }
                | ServiceError::PidFileRemove { .. }
        )
    }

    pub fn service(&self) -> &str {
        match self {
            ServiceError::AlreadyStopped { service }
            | ServiceError::ForcedRestart { service }
            | ServiceError::MissingPidFile { service }
            | ServiceError::PidFilePattern { service, .. }
            | ServiceError::PidFileRemove { service, .. }
            | ServiceError::Kill { service, .. }
            | ServiceError::NoStartCommand { service }
            | ServiceError::Spawn { service, .. }
            | ServiceError::WorkingDirectory { service, .. } => service,
        }
    }
}

/// Configuration file problems. Always fatal to the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML file '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("'{}' is a directory", .0.display())]
    IsDirectory(PathBuf),

    #[error("can't read YAML file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error unmarshal YAML configuration '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors that are not attributable to a single service.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("'Nanny' script error: {0}")]
    Config(#[from] ConfigError),

    #[error("'Nanny' script error: can't resolve hostname")]
    Hostname,

    #[error("'Nanny' script error: can't enumerate processes in '{}': {source}", .root.display())]
    ProcessEnumeration {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'Nanny' script error: services_list[{index}].process_name should contain value")]
    MissingProcessName { index: usize },

    #[error("notification to {recipients:?} not sent: {reason}")]
    Notification {
        recipients: Vec<String>,
        reason: String,
    },
}

impl RunError {
    /// Fatal errors short-circuit the run before any per-service result exists.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RunError::Config(_) | RunError::Hostname | RunError::ProcessEnumeration { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_classification() {
        let soft = ServiceError::AlreadyStopped { service: "worker".into() };
        let forced = ServiceError::ForcedRestart { service: "worker".into() };
        let hard = ServiceError::NoStartCommand { service: "worker".into() };

        assert!(soft.is_soft());
        assert!(forced.is_soft());
        assert!(!hard.is_soft());
        assert_eq!(hard.service(), "worker");
    }

    #[test]
    fn test_messages_name_the_service() {
        let err = ServiceError::NoStartCommand { service: "api".into() };
        assert_eq!(
            err.to_string(),
            "Service 'api' doesn't have start command in 'start_cmd' property"
        );

        let err = RunError::MissingProcessName { index: 3 };
        assert!(err.to_string().contains("services_list[3]"));
        assert!(!err.is_fatal());
        assert!(RunError::Hostname.is_fatal());
    }
}
