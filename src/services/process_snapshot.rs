use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::error::RunError;
use crate::models::ProcessRecord;

pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Point-in-time view of the process table, keyed by PID.
#[derive(Debug, Default)]
pub struct ProcessSnapshot {
    processes: HashMap<i32, ProcessRecord>,
}

impl ProcessSnapshot {
    /// Reads every process under `proc_root` with at most `max_workers` workers.
    ///
    /// Processes that exit between discovery and read are skipped. Only a
    /// failure to list `proc_root` itself is an error.
    pub async fn collect(proc_root: &Path, max_workers: usize) -> Result<Self, RunError> {
        let proc_paths = discover_process_paths(proc_root).map_err(|source| {
            RunError::ProcessEnumeration {
                root: proc_root.to_path_buf(),
                source,
            }
        })?;
        let discovered = proc_paths.len();

        // no point in more workers than processes
        let workers = max_workers.max(1).min(discovered);
        debug!("start proc workers value={} processes={}", workers, discovered);

        let capacity = discovered.max(1);
        let (path_tx, path_rx) = mpsc::channel::<PathBuf>(capacity);
        let (result_tx, mut result_rx) = mpsc::channel::<ProcessRecord>(capacity);
        let path_rx = Arc::new(Mutex::new(path_rx));

        let mut tasks = JoinSet::new();
        for worker_id in 1..=workers {
            tasks.spawn(process_worker(
                worker_id,
                Arc::clone(&path_rx),
                result_tx.clone(),
            ));
        }
        drop(result_tx);

        for proc_path in proc_paths {
            if path_tx.send(proc_path).await.is_err() {
                break;
            }
        }
        // workers stop once the queue is drained
        drop(path_tx);

        let mut processes = HashMap::with_capacity(discovered);
        while let Some(record) = result_rx.recv().await {
            processes.insert(record.pid, record);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
                warn!("proc worker cancelled error={}", e);
            }
        }

        if discovered != processes.len() {
            warn!(
                "not every discovered process was read matches={} processes={}",
                discovered,
                processes.len()
            );
        }

        Ok(Self { processes })
    }

    #[cfg(test)]
    pub fn from_records(records: impl IntoIterator<Item = ProcessRecord>) -> Self {
        Self {
            processes: records.into_iter().map(|r| (r.pid, r)).collect(),
        }
    }

    pub fn processes(&self) -> &HashMap<i32, ProcessRecord> {
        &self.processes
    }

    #[cfg(test)]
    pub fn get(&self, pid: i32) -> Option<&ProcessRecord> {
        self.processes.get(&pid)
    }
}

/// Numeric entries of the proc root, one per live process.
fn discover_process_paths(proc_root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in std::fs::read_dir(proc_root)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("skip unreadable proc entry error={}", e);
                continue;
            }
        };

        let is_pid = entry
            .file_name()
            .to_str()
            .is_some_and(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()));

        if is_pid {
            paths.push(entry.path());
        }
    }

    Ok(paths)
}

async fn process_worker(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    results: mpsc::Sender<ProcessRecord>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(proc_path) = next else {
            break;
        };

        debug!(
            "collect data from proc path worker={} value={}",
            worker_id,
            proc_path.display()
        );

        match read_process(&proc_path).await {
            Ok(record) => {
                debug!("process info worker={} value={:?}", worker_id, record);
                if results.send(record).await.is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(
                    "process disappeared worker={} value={} error={}",
                    worker_id,
                    proc_path.display(),
                    e
                );
            }
            Err(e) => {
                warn!(
                    "can't read process worker={} value={} error={}",
                    worker_id,
                    proc_path.display(),
                    e
                );
            }
        }
    }
}

async fn read_process(proc_path: &Path) -> io::Result<ProcessRecord> {
    let started_at = tokio::fs::metadata(proc_path).await?.modified()?;
    let status = tokio::fs::read_to_string(proc_path.join("status")).await?;
    let cmdline = tokio::fs::read(proc_path.join("cmdline")).await?;

    let fields = parse_status(&status);
    let pid = match fields.pid {
        Some(pid) => pid,
        None => pid_from_path(proc_path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "status file has no Pid field")
        })?,
    };

    Ok(ProcessRecord {
        pid,
        parent_pid: fields.parent_pid.unwrap_or(0),
        command: fields.name,
        command_line: normalize_cmdline(&cmdline),
        started_at,
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
struct StatusFields {
    name: String,
    pid: Option<i32>,
    parent_pid: Option<i32>,
}

fn parse_status(status: &str) -> StatusFields {
    let mut fields = StatusFields::default();

    for line in status.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim_matches(|c| c == '\t' || c == ' ');

        match key {
            "Name" => fields.name = value.to_string(),
            "Pid" => fields.pid = parse_pid(key, value),
            "PPid" => fields.parent_pid = parse_pid(key, value),
            _ => {}
        }
    }

    fields
}

fn parse_pid(key: &str, value: &str) -> Option<i32> {
    match value.parse() {
        Ok(pid) => Some(pid),
        Err(e) => {
            warn!("can't convert {} string to int value={} error={}", key, value, e);
            None
        }
    }
}

fn pid_from_path(proc_path: &Path) -> Option<i32> {
    proc_path.file_name()?.to_str()?.parse().ok()
}

/// NUL separators become spaces, trailing whitespace is dropped.
fn normalize_cmdline(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .replace('\0', " ")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_process(root: &Path, pid: i32, ppid: i32, name: &str, cmdline: &[u8]) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("status"),
            format!(
                "Name:\t{}\nUmask:\t0022\nState:\tS (sleeping)\nTgid:\t{}\nPid:\t{}\nPPid:\t{}\n",
                name, pid, pid, ppid
            ),
        )
        .unwrap();
        fs::write(dir.join("cmdline"), cmdline).unwrap();
    }

    #[test]
    fn test_normalize_cmdline() {
        assert_eq!(
            normalize_cmdline(b"python\0worker.py\0--port\08080\0"),
            "python worker.py --port 8080"
        );
        assert_eq!(normalize_cmdline(b""), "");
        assert_eq!(normalize_cmdline(b"sleep\0 \t"), "sleep");
    }

    #[test]
    fn test_parse_status() {
        let fields = parse_status("Name:\tnginx\nPid:\t321\nPPid:\t1\nThreads:\t4\n");
        assert_eq!(
            fields,
            StatusFields {
                name: "nginx".into(),
                pid: Some(321),
                parent_pid: Some(1),
            }
        );

        let broken = parse_status("Name:\tx\nPid:\tabc\n");
        assert_eq!(broken.pid, None);
    }

    #[tokio::test]
    async fn test_collect_from_fake_proc() {
        let root = tempfile::tempdir().unwrap();
        write_process(root.path(), 100, 1, "python", b"python\0worker.py\0");
        write_process(root.path(), 101, 100, "python", b"python\0worker.py\0--child\0");
        write_process(root.path(), 2, 0, "kthreadd", b"");
        fs::create_dir_all(root.path().join("self")).unwrap();
        fs::write(root.path().join("uptime"), "1.0 1.0").unwrap();
        // exited between discovery and read
        fs::create_dir_all(root.path().join("555")).unwrap();

        let snapshot = ProcessSnapshot::collect(root.path(), 100).await.unwrap();

        assert_eq!(snapshot.processes().len(), 3);
        for (pid, record) in snapshot.processes() {
            assert_eq!(*pid, record.pid);
        }

        let child = snapshot.get(101).unwrap();
        assert_eq!(child.parent_pid, 100);
        assert_eq!(child.command, "python");
        assert_eq!(child.command_line, "python worker.py --child");
        assert_eq!(snapshot.get(2).unwrap().command_line, "");
        assert!(snapshot.get(555).is_none());
    }

    #[tokio::test]
    async fn test_collect_with_single_worker() {
        let root = tempfile::tempdir().unwrap();
        for pid in 10..40 {
            write_process(root.path(), pid, 1, "sleep", format!("sleep\0{}\0", pid).as_bytes());
        }

        let snapshot = ProcessSnapshot::collect(root.path(), 0).await.unwrap();

        assert_eq!(snapshot.processes().len(), 30);
        assert_eq!(snapshot.get(25).unwrap().command_line, "sleep 25");
    }

    #[tokio::test]
    async fn test_collect_empty_root() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = ProcessSnapshot::collect(root.path(), 8).await.unwrap();
        assert!(snapshot.processes().is_empty());
    }

    #[tokio::test]
    async fn test_collect_missing_root_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");

        let err = ProcessSnapshot::collect(&missing, 4).await.unwrap_err();
        assert!(matches!(err, RunError::ProcessEnumeration { .. }));
        assert!(err.is_fatal());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_collect_finds_current_process() {
        let snapshot = ProcessSnapshot::collect(Path::new(DEFAULT_PROC_ROOT), 16)
            .await
            .unwrap();

        let me = snapshot.get(std::process::id() as i32).unwrap();
        assert!(!me.command_line.is_empty());
    }
}
