use std::time::SystemTime;

/// One process observed in a snapshot of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    /// Process ID, unique within one snapshot
    pub pid: i32,
    /// Parent process ID
    pub parent_pid: i32,
    /// Short process name (`Name:` in the status file)
    pub command: String,
    /// Full command line, NUL separators replaced by spaces
    pub command_line: String,
    /// Start time, taken from the modification time of the process entry
    pub started_at: SystemTime,
}

impl ProcessRecord {
    /// Time elapsed since the process started, zero if the clock went backwards.
    pub fn uptime(&self, now: SystemTime) -> std::time::Duration {
        now.duration_since(self.started_at).unwrap_or_default()
    }
}
