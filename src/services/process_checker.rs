use std::collections::HashMap;

use crate::models::{ProcessRecord, ServiceSpec};
use crate::services::process_snapshot::ProcessSnapshot;

/// Finds the main process whose command line contains `name`.
///
/// Parent and child processes of the same command both match; the lowest PID
/// is assumed to be the root of the tree. The comparison is applied to every
/// candidate, so the result does not depend on map iteration order.
pub fn find_main_process<'a>(
    name: &str,
    processes: &'a HashMap<i32, ProcessRecord>,
) -> Option<&'a ProcessRecord> {
    let mut found: Option<&ProcessRecord> = None;

    for (pid, process) in processes {
        if !process.command_line.contains(name) {
            continue;
        }

        log::debug!("service pid found in process list service={} value={}", name, pid);

        match found {
            Some(current) if current.pid <= process.pid => {}
            _ => found = Some(process),
        }
    }

    found
}

/// All PIDs whose command line contains `name`, sorted.
pub fn matching_pids(name: &str, processes: &HashMap<i32, ProcessRecord>) -> Vec<i32> {
    let mut pids: Vec<i32> = processes
        .values()
        .filter(|p| p.command_line.contains(name))
        .map(|p| p.pid)
        .collect();
    pids.sort_unstable();
    pids
}

/// Assigns the service's matched process from the snapshot. Returns `true` if found.
pub fn check_service(service: &mut ServiceSpec, snapshot: &ProcessSnapshot) -> bool {
    log::debug!(
        "search service pid value={} description={}",
        service.name,
        service.description
    );

    service.matched_process = find_main_process(&service.name, snapshot.processes()).cloned();

    match &service.matched_process {
        Some(process) => {
            log::debug!(
                "service found service={} pid={} ppid={} command={} candidates={:?}",
                service.name,
                process.pid,
                process.parent_pid,
                process.command,
                matching_pids(&service.name, snapshot.processes())
            );
            true
        }
        None => {
            if !service.disabled {
                log::warn!("service not found in process list value={}", service.name);
            }
            false
        }
    }
}
