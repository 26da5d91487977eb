use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use log::{debug, error, info};
use sysinfo::System;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::error::RunError;
use crate::models::{ServiceSpec, ServiceView, SupervisionResult};
use crate::services::lifecycle::{RestartOutcome, ServiceLifecycle};
use crate::services::process_checker::check_service;
use crate::services::process_snapshot::{ProcessSnapshot, DEFAULT_PROC_ROOT};

pub const DEFAULT_WORKERS: usize = 100;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound for snapshot workers and parallel restarts
    pub workers: usize,
    pub force_restart: bool,
    pub proc_root: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            force_restart: false,
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
        }
    }
}

/// Whether a matched (or unmatched) service must go through a restart.
///
/// Enabled services restart when missing or forced; disabled services only
/// when they are found running, so they get stopped.
pub fn needs_restart(service: &ServiceSpec, force_restart: bool) -> bool {
    if service.name.is_empty() {
        return false;
    }

    if service.disabled {
        service.is_running()
    } else {
        !service.is_running() || force_restart
    }
}

/// One snapshot → match → act → aggregate pass over the configured services.
pub struct SupervisionRun {
    options: RunOptions,
    services: Vec<ServiceSpec>,
    run_errors: Vec<RunError>,
    hostname: Option<String>,
}

impl SupervisionRun {
    pub fn new(services: Vec<ServiceSpec>, options: RunOptions) -> Self {
        Self {
            options,
            services,
            run_errors: Vec::new(),
            hostname: None,
        }
    }

    /// Discovery and matching only; no service is touched.
    pub async fn list(mut self) -> (Vec<ServiceView>, SupervisionResult) {
        if let Err(err) = self.collect_data().await {
            error!("got error when try to collect data error={}", err);
            return (Vec::new(), SupervisionResult::fatal(err));
        }

        let now = SystemTime::now();
        let views = self
            .services
            .iter()
            .filter(|s| !s.name.is_empty())
            .map(|s| ServiceView::from_service(s, now))
            .collect();

        (views, self.into_result(Vec::new()))
    }

    pub async fn check_and_restart(mut self) -> SupervisionResult {
        if let Err(err) = self.collect_data().await {
            error!("got error when try to collect data error={}", err);
            return SupervisionResult::fatal(err);
        }

        let restarted = self.restart_services().await;
        self.into_result(restarted)
    }

    async fn collect_data(&mut self) -> Result<(), RunError> {
        for service in &mut self.services {
            service.reset_run_state();
        }
        self.run_errors.clear();

        let hostname = System::host_name().ok_or(RunError::Hostname)?;
        debug!("hostname value={}", hostname);
        self.hostname = Some(hostname);

        let snapshot =
            ProcessSnapshot::collect(&self.options.proc_root, self.options.workers).await?;
        debug!("processes collected value={}", snapshot.processes().len());

        self.match_services(Arc::new(snapshot)).await;
        Ok(())
    }

    async fn match_services(&mut self, snapshot: Arc<ProcessSnapshot>) {
        let services = std::mem::take(&mut self.services);
        let mut slots: Vec<Option<ServiceSpec>> = Vec::with_capacity(services.len());
        let mut tasks = JoinSet::new();

        for (index, mut service) in services.into_iter().enumerate() {
            debug!("run service checks value={}", service.name);

            if service.name.is_empty() {
                let err = RunError::MissingProcessName { index };
                error!("error load process details from yaml error={}", err);
                self.run_errors.push(err);
                slots.push(Some(service));
                continue;
            }

            slots.push(None);
            let snapshot = Arc::clone(&snapshot);
            tasks.spawn(async move {
                check_service(&mut service, &snapshot);
                (index, service)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, service)) => slots[index] = Some(service),
                Err(e) => rethrow(e, "service check"),
            }
        }

        self.services = slots.into_iter().flatten().collect();
    }

    /// Restarts every service that needs it, at most `workers` at a time.
    async fn restart_services(&mut self) -> Vec<String> {
        let force_restart = self.options.force_restart;
        let candidates = self
            .services
            .iter()
            .filter(|s| needs_restart(s, force_restart))
            .count();
        // no point in more permits than restarts
        let permits = Arc::new(Semaphore::new(
            self.options.workers.clamp(1, candidates.max(1)),
        ));

        let services = std::mem::take(&mut self.services);
        let mut slots: Vec<Option<ServiceSpec>> = Vec::with_capacity(services.len());
        let mut restarted = Vec::new();
        let mut tasks = JoinSet::new();

        for (index, mut service) in services.into_iter().enumerate() {
            if !needs_restart(&service, force_restart) {
                slots.push(Some(service));
                continue;
            }

            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("restart skipped service={} error={}", service.name, e);
                    slots.push(Some(service));
                    continue;
                }
            };

            restarted.push(service.name.clone());
            slots.push(None);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let outcome = ServiceLifecycle::new(&mut service).restart(force_restart);
                (index, service, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, service, outcome)) => {
                    log_outcome(&service, outcome);
                    slots[index] = Some(service);
                }
                Err(e) => rethrow(e, "service restart"),
            }
        }

        self.services = slots.into_iter().flatten().collect();
        restarted
    }

    fn into_result(mut self, restarted: Vec<String>) -> SupervisionResult {
        let mut result = SupervisionResult {
            run_errors: std::mem::take(&mut self.run_errors),
            hostname: self.hostname.take(),
            restarted,
            ..Default::default()
        };

        for service in &mut self.services {
            if !service.name.is_empty() {
                result.absorb(service);
            }
        }

        result
    }
}

fn log_outcome(service: &ServiceSpec, outcome: RestartOutcome) {
    if outcome.is_hard_failure() {
        error!(
            "service restart failed service={} state={:?} errors={}",
            service.name,
            outcome.state(),
            service.errors.len()
        );
    } else {
        info!(
            "service restart finished service={} state={:?}",
            service.name,
            outcome.state()
        );
    }
}

fn rethrow(e: JoinError, what: &str) {
    if e.is_panic() {
        std::panic::resume_unwind(e.into_panic());
    }
    error!("{} task cancelled error={}", what, e);
}
