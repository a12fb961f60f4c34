//! Tracks every mount performed during the boot sequence so it can be unwound in
//! reverse order if a later step fails.

use std::path::{Path, PathBuf};

use tracing::debug;

/// An ordered, append-only record of mountpoints established so far.
///
/// Entries are unwound in LIFO order, mirroring how the kernel's mount namespace
/// itself nests: the most recently established mount sits "on top" and must come
/// off first.
#[derive(Debug, Default)]
pub struct MountLedger {
    entries: Vec<PathBuf>,
}

impl MountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful mount at `path`.
    pub fn record(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(mount = %path.display(), "recorded mount");
        self.entries.push(path);
    }

    /// Removes and returns the most recently recorded mountpoint, if any.
    pub fn pop(&mut self) -> Option<PathBuf> {
        self.entries.pop()
    }

    /// Mountpoints recorded so far, oldest first.
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unwinds every recorded mount in reverse order, invoking `unmount` for each.
    /// Continues past individual failures so a bad mount can't block the ones
    /// beneath it from being torn down.
    pub fn unwind(&mut self, mut unmount: impl FnMut(&Path)) {
        while let Some(path) = self.entries.pop() {
            unmount(&path);
        }
    }

    /// Cross-checks that every recorded mountpoint is still listed as mounted
    /// according to the kernel's own view, per `/proc/mounts`.
    pub fn agrees_with_proc_mounts(&self, proc_mounts: &str) -> bool {
        self.entries
            .iter()
            .all(|path| crate::mount::is_mounted_in(proc_mounts, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order_and_unwinds_lifo() {
        let mut ledger = MountLedger::new();
        ledger.record("/a");
        ledger.record("/b");
        ledger.record("/c");
        assert_eq!(
            ledger.entries(),
            &[PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );

        let mut seen = Vec::new();
        ledger.unwind(|path| seen.push(path.to_path_buf()));
        assert_eq!(
            seen,
            vec![PathBuf::from("/c"), PathBuf::from("/b"), PathBuf::from("/a")]
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn pop_removes_most_recent_entry() {
        let mut ledger = MountLedger::new();
        ledger.record("/a");
        ledger.record("/b");
        assert_eq!(ledger.pop(), Some(PathBuf::from("/b")));
        assert_eq!(ledger.entries(), &[PathBuf::from("/a")]);
    }

    #[test]
    fn agrees_with_proc_mounts_checks_all_entries() {
        let mut ledger = MountLedger::new();
        ledger.record("/rw_fs/root");
        ledger.record("/rw_fs/root/application/current");
        let proc_mounts = "/dev/mmcblk0p2 /rw_fs/root ext4 rw,relatime 0 0\n\
             /dev/loop0 /rw_fs/root/application/current squashfs ro,relatime 0 0\n";
        assert!(ledger.agrees_with_proc_mounts(proc_mounts));

        ledger.record("/not/actually/mounted");
        assert!(!ledger.agrees_with_proc_mounts(proc_mounts));
    }
}
