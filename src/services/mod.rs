pub mod lifecycle;
pub mod notifier;
pub mod process_checker;
pub mod process_snapshot;
pub mod supervisor;
pub mod workdir;

pub use notifier::{report_errors, LogNotifier};
pub use supervisor::{RunOptions, SupervisionRun};
