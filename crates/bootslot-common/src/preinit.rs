//! Two-phase staging of the pseudo filesystems the rest of the boot sequence
//! depends on, with rollback on failure.

use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use reportify::Report;
use tracing::error;

use crate::ledger::MountLedger;
use crate::mount::{self, MountError};

/// A single entry in the preinit stager's queue.
#[derive(Debug, Clone)]
pub struct MountArgs {
    pub source: Option<String>,
    pub target: PathBuf,
    pub fstype: String,
    pub flags: MsFlags,
    pub options: String,
}

impl MountArgs {
    pub fn new(
        source: Option<&str>,
        target: impl Into<PathBuf>,
        fstype: &str,
        flags: MsFlags,
    ) -> Self {
        MountArgs {
            source: source.map(str::to_owned),
            target: target.into(),
            fstype: fstype.to_owned(),
            flags,
            options: String::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PreInitError {
    #[error("mount of {target} failed during preinit staging")]
    StageFailed {
        target: PathBuf,
        #[source]
        source: MountError,
    },
    #[error("target {0} was not staged by this preinit instance")]
    NotStaged(PathBuf),
}

pub type PreInitResult<T> = Result<T, Report<PreInitError>>;

/// Drives a queue of `MountArgs` in order, recording each success in a
/// [`MountLedger`]. On the first failure, unmounts everything already staged
/// (reverse order) before propagating the error.
#[derive(Debug, Default)]
pub struct PreInit {
    queue: Vec<MountArgs>,
    ledger: MountLedger,
}

impl PreInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, args: MountArgs) {
        self.queue.push(args);
    }

    /// Mounts every queued entry in order. On failure, unwinds everything
    /// already mounted by this call before returning the error.
    pub fn prepare(&mut self) -> PreInitResult<()> {
        let queue = std::mem::take(&mut self.queue);
        for args in queue {
            let result = mount::mount(
                args.source.as_deref(),
                &args.target,
                &args.fstype,
                args.flags,
                &args.options,
            );
            match result {
                Ok(()) => self.ledger.record(args.target.clone()),
                Err(report) => {
                    self.rollback();
                    return Err(Report::new(PreInitError::StageFailed {
                        target: args.target,
                        source: report.into_error(),
                    }));
                }
            }
        }
        Ok(())
    }

    /// Unmounts `target` and drops it from the ledger. Removing a target that
    /// was never staged is a logic error.
    pub fn remove(&mut self, target: &Path) -> PreInitResult<()> {
        if !self.ledger.entries().iter().any(|p| p == target) {
            return Err(Report::new(PreInitError::NotStaged(target.to_path_buf())));
        }
        mount::umount(target).ok();
        let mut remaining = Vec::new();
        for entry in self.ledger.entries() {
            if entry != target {
                remaining.push(entry.clone());
            }
        }
        self.ledger = MountLedger::new();
        for entry in remaining {
            self.ledger.record(entry);
        }
        Ok(())
    }

    fn rollback(&mut self) {
        self.ledger.unwind(|path| {
            if let Err(error) = mount::umount(path) {
                error!(target = %path.display(), error = ?error, "rollback umount failed");
            }
        });
    }

    pub fn ledger(&self) -> &MountLedger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn stage_one_failure_records_field() {
        let args = MountArgs::new(None, "/does/not/exist-preinit-test", "proc", MsFlags::empty());
        assert_eq!(args.target, PathBuf::from("/does/not/exist-preinit-test"));
    }

    #[test]
    fn remove_unstaged_target_is_error() {
        let mut preinit = PreInit::new();
        let err = preinit.remove(Path::new("/never/staged")).unwrap_err();
        assert!(matches!(err.error(), PreInitError::NotStaged(_)));
    }

    #[test]
    fn ledger_tracks_staged_order() {
        // Exercises the ledger directly since real `mount(2)` isn't available in tests.
        let ledger = RefCell::new(MountLedger::new());
        ledger.borrow_mut().record("/proc");
        ledger.borrow_mut().record("/sys");
        assert_eq!(
            ledger.borrow().entries(),
            &[PathBuf::from("/proc"), PathBuf::from("/sys")]
        );
    }
}
