use lazy_static::lazy_static;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

lazy_static! {
    /// Guards the process-wide current directory.
    static ref WORKING_DIR_LOCK: RwLock<()> = RwLock::new(());
}

enum DirLock {
    Shared(#[allow(dead_code)] RwLockReadGuard<'static, ()>),
    Exclusive(#[allow(dead_code)] RwLockWriteGuard<'static, ()>),
}

/// Scoped current-directory switch.
///
/// Entering with a directory takes the lock exclusively, changes into the
/// directory and changes back on drop. Entering without one only takes the
/// lock shared, so cwd-relative work never observes another service's switch.
pub struct WorkingDirGuard {
    previous: Option<PathBuf>,
    lock: DirLock,
}

impl WorkingDirGuard {
    pub fn enter(dir: Option<&Path>) -> io::Result<Self> {
        let Some(dir) = dir else {
            let lock = WORKING_DIR_LOCK
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            return Ok(Self {
                previous: None,
                lock: DirLock::Shared(lock),
            });
        };

        let lock = WORKING_DIR_LOCK
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = env::current_dir()?;
        env::set_current_dir(dir)?;

        log::debug!(
            "change current working directory from={} to={}",
            previous.display(),
            dir.display()
        );

        Ok(Self {
            previous: Some(previous),
            lock: DirLock::Exclusive(lock),
        })
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self.lock, DirLock::Exclusive(_))
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        // restored before the lock field is released
        if let Some(previous) = self.previous.take() {
            if let Err(e) = env::set_current_dir(&previous) {
                log::error!(
                    "can't restore working directory value={} error={}",
                    previous.display(),
                    e
                );
            }
        }
    }
}
