use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use crate::error::{RunError, ServiceError};
use crate::models::ServiceSpec;

/// Aggregate outcome of one supervision run.
#[derive(Debug, Default)]
pub struct SupervisionResult {
    /// Errors per service name; services without errors are absent
    pub per_service_errors: BTreeMap<String, Vec<ServiceError>>,
    /// Errors not attributable to a single service
    pub run_errors: Vec<RunError>,
    /// Recipients per service name, for services that have any
    pub notify_lists: BTreeMap<String, Vec<String>>,
    /// Services a restart was attempted for, in configuration order
    pub restarted: Vec<String>,
    pub hostname: Option<String>,
}

impl SupervisionResult {
    /// Result of a run that stopped before producing per-service results.
    pub fn fatal(err: RunError) -> Self {
        Self {
            run_errors: vec![err],
            ..Default::default()
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.per_service_errors.is_empty() && self.run_errors.is_empty()
    }

    /// Whether the run stopped before producing per-service results.
    pub fn is_fatal(&self) -> bool {
        self.run_errors.iter().any(RunError::is_fatal)
    }

    pub fn error_count(&self) -> usize {
        self.run_errors.len() + self.per_service_errors.values().map(Vec::len).sum::<usize>()
    }

    /// Moves the accumulated errors out of `service` into the aggregate.
    pub fn absorb(&mut self, service: &mut ServiceSpec) {
        if !service.notify_list.is_empty() {
            self.notify_lists
                .insert(service.name.clone(), service.notify_list.clone());
        }

        if service.errors.is_empty() {
            return;
        }

        self.per_service_errors
            .entry(service.name.clone())
            .or_default()
            .append(&mut service.errors);
    }

    /// Every error message, run-level first.
    pub fn messages(&self) -> Vec<String> {
        self.run_errors
            .iter()
            .map(ToString::to_string)
            .chain(
                self.per_service_errors
                    .values()
                    .flatten()
                    .map(ToString::to_string),
            )
            .collect()
    }
}

/// Read-only row of the `--list` output.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    pub name: String,
    pub running: bool,
    pub disabled: bool,
    pub pid: i32,
    pub started_at: Option<String>,
    pub uptime: Option<String>,
    pub command_line: Option<String>,
}

impl ServiceView {
    pub fn from_service(service: &ServiceSpec, now: SystemTime) -> Self {
        match &service.matched_process {
            Some(process) => Self {
                name: service.name.clone(),
                running: true,
                disabled: service.disabled,
                pid: process.pid,
                started_at: Some(humantime::format_rfc3339_seconds(process.started_at).to_string()),
                uptime: Some(
                    humantime::format_duration(Duration::from_secs(process.uptime(now).as_secs()))
                        .to_string(),
                ),
                command_line: Some(process.command_line.clone()),
            },
            None => Self {
                name: service.name.clone(),
                running: false,
                disabled: service.disabled,
                pid: 0,
                started_at: None,
                uptime: None,
                command_line: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessRecord;

    #[test]
    fn test_absorb_only_services_with_errors() {
        let mut result = SupervisionResult::default();

        let mut quiet = ServiceSpec::new("quiet");
        result.absorb(&mut quiet);
        assert!(result.is_healthy());

        let mut noisy = ServiceSpec::new("noisy");
        noisy.notify_list = vec!["ops@example.com".into()];
        noisy.record(ServiceError::AlreadyStopped { service: "noisy".into() });
        result.absorb(&mut noisy);

        assert!(!result.is_healthy());
        assert!(noisy.errors.is_empty());
        assert_eq!(result.per_service_errors["noisy"].len(), 1);
        assert_eq!(result.notify_lists["noisy"], vec!["ops@example.com"]);
        assert_eq!(result.error_count(), 1);
    }

    #[test]
    fn test_fatal_result() {
        let result = SupervisionResult::fatal(RunError::Hostname);
        assert!(!result.is_healthy());
        assert!(result.is_fatal());

        let partial = SupervisionResult {
            run_errors: vec![RunError::MissingProcessName { index: 2 }],
            ..Default::default()
        };
        assert!(!partial.is_healthy());
        assert!(!partial.is_fatal());
        assert_eq!(result.messages().len(), 1);
    }

    #[test]
    fn test_view_of_matched_service() {
        let started = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut service = ServiceSpec::new("worker");
        service.matched_process = Some(ProcessRecord {
            pid: 42,
            parent_pid: 1,
            command: "python".into(),
            command_line: "python worker --once".into(),
            started_at: started,
        });

        let view = ServiceView::from_service(&service, started + Duration::from_millis(90_500));
        assert!(view.running);
        assert_eq!(view.pid, 42);
        assert_eq!(view.uptime.as_deref(), Some("1m 30s"));
        assert_eq!(view.started_at.as_deref(), Some("2023-11-14T22:13:20Z"));

        let idle = ServiceView::from_service(&ServiceSpec::new("idle"), started);
        assert!(!idle.running);
        assert_eq!(idle.pid, 0);
        assert!(idle.command_line.is_none());
    }
}
