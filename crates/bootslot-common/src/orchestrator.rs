//! Composes the full overlay graph on top of the mounted application image:
//! application-folder stacking, ramdisk additions (injected read-only
//! overlays carrying generated configs), and persistent overlays — with
//! dedup, a stack-depth retry, and per-stage failure tolerance as described
//! in §4.5 and §7 of the design.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use reportify::Report;
use tracing::{info, warn};

use crate::ledger::MountLedger;
use crate::loop_dev::LoopDevice;
use crate::manifest::MountManifest;
use crate::mount::{self, MountError, PersistentOverlay, ReadOnlyOverlay};
use crate::paths;

static CONSTRUCTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("an orchestrator has already been constructed in this process")]
    AlreadyConstructed,
    #[error("ramdisk-addition overlay at {merge} failed to mount")]
    RamdiskAdditionFailed {
        merge: PathBuf,
        #[source]
        source: MountError,
    },
}

pub type OrchestratorResult<T> = Result<T, Report<OrchestratorError>>;

/// Summary of a completed [`Orchestrator::run`], for the top frame's
/// diagnostic line.
#[derive(Debug, Default, Clone)]
pub struct OrchestratorReport {
    pub application_image_mounted: bool,
    pub application_folder_mounts: usize,
    pub persistent_overlay_mounts: usize,
    pub shed_to_minimal_manifest: bool,
}

/// Composes the overlay graph. Constructible exactly once per process — a
/// second construction is a logic error (the spec's "no module-level state"
/// redesign note, enforced as an ownership invariant instead of a global
/// mutable flag).
pub struct Orchestrator {
    ledger: MountLedger,
    loop_device: Option<LoopDevice>,
}

impl Orchestrator {
    pub fn new() -> OrchestratorResult<Self> {
        if CONSTRUCTED.swap(true, Ordering::SeqCst) {
            return Err(Report::new(OrchestratorError::AlreadyConstructed));
        }
        Ok(Orchestrator {
            ledger: MountLedger::new(),
            loop_device: None,
        })
    }

    pub fn ledger(&self) -> &MountLedger {
        &self.ledger
    }

    /// Runs the full composition: mounts the application image, parses its
    /// manifest, stacks application folders and persistent overlays, and
    /// mounts any injected read-only overlays not already consumed by the
    /// application-folder stage.
    pub fn run(
        &mut self,
        app_image_path: &Path,
        app_mount: &Path,
        manifest_file_name: &str,
        injected: &[ReadOnlyOverlay],
    ) -> OrchestratorResult<OrchestratorReport> {
        let app_image_dir = app_image_path.parent().unwrap_or_else(|| Path::new("/"));
        remove_tmp_app_residue(app_image_dir);

        let app_mounted = self.mount_application_image(app_image_path, app_mount);

        let manifest_path = app_mount.join(manifest_file_name);
        let mut manifest = if app_mounted {
            match MountManifest::parse_file(&manifest_path) {
                Ok(manifest) => manifest,
                Err(report) => {
                    warn!(error = ?report, path = %manifest_path.display(), "manifest parse failed, using minimal manifest");
                    MountManifest::minimal()
                }
            }
        } else {
            MountManifest::minimal()
        };

        let mut report = OrchestratorReport {
            application_image_mounted: app_mounted,
            ..Default::default()
        };

        let mut consumed = HashSet::new();
        let mut this_pass: Vec<PathBuf> = Vec::new();
        let depth_exceeded = self.run_stacking_pass(app_mount, &manifest, injected, &mut consumed, &mut this_pass, &mut report);

        if depth_exceeded {
            warn!("overlay stacking depth exceeded, shedding to minimal manifest and retrying once");
            for merge in this_pass.drain(..).rev() {
                mount::umount(&merge).ok();
                self.ledger.pop();
            }
            report.application_folder_mounts = 0;
            report.persistent_overlay_mounts = 0;
            consumed.clear();
            manifest = MountManifest::minimal();
            report.shed_to_minimal_manifest = true;
            let mut retry_pass = Vec::new();
            let _ = self.run_stacking_pass(app_mount, &manifest, injected, &mut consumed, &mut retry_pass, &mut report);
        }

        self.mount_ramdisk_additions(injected, &consumed)?;

        if app_mounted {
            remove_tmp_app_residue(app_image_dir);
        }

        Ok(report)
    }

    fn mount_application_image(&mut self, app_image_path: &Path, app_mount: &Path) -> bool {
        std::fs::create_dir_all(app_mount).ok();
        match mount::mount_loop(app_image_path, app_mount) {
            Ok(loop_device) => {
                self.loop_device = Some(loop_device);
                self.ledger.record(app_mount.to_path_buf());
                true
            }
            Err(report) => {
                warn!(error = ?report, image = %app_image_path.display(), "application image loop mount failed, proceeding best-effort");
                false
            }
        }
    }

    /// Runs application-folder stacking followed by persistent overlays,
    /// recording every successful mount's merge path into `this_pass` so the
    /// caller can unwind it on a stacking-depth retry. Returns whether a
    /// stacking-depth-exceeded failure was observed.
    fn run_stacking_pass(
        &mut self,
        app_mount: &Path,
        manifest: &MountManifest,
        injected: &[ReadOnlyOverlay],
        consumed: &mut HashSet<usize>,
        this_pass: &mut Vec<PathBuf>,
        report: &mut OrchestratorReport,
    ) -> bool {
        let mut depth_exceeded = false;
        for merge in &manifest.application_folders {
            if report.application_folder_mounts >= paths::MAX_APPLICATION_FOLDER_MOUNTS {
                info!(cap = paths::MAX_APPLICATION_FOLDER_MOUNTS, "application-folder mount cap reached");
                break;
            }
            match self.stack_one_application_folder(app_mount, merge, injected, consumed) {
                FolderOutcome::Mounted(merge_path) => {
                    self.ledger.record(merge_path.clone());
                    this_pass.push(merge_path);
                    report.application_folder_mounts += 1;
                }
                FolderOutcome::AlreadyProvided => {}
                FolderOutcome::Skipped => {}
                FolderOutcome::DepthExceeded => {
                    depth_exceeded = true;
                    break;
                }
            }
        }

        if !depth_exceeded {
            for (name, entry) in &manifest.persistent_memory {
                match self.mount_one_persistent_overlay(app_mount, manifest, name, entry) {
                    PersistentOutcome::Mounted(merge_path) => {
                        self.ledger.record(merge_path.clone());
                        this_pass.push(merge_path);
                        report.persistent_overlay_mounts += 1;
                    }
                    PersistentOutcome::Skipped => {}
                    PersistentOutcome::DepthExceeded => {
                        depth_exceeded = true;
                        break;
                    }
                }
            }
        }

        depth_exceeded
    }

    fn stack_one_application_folder(
        &self,
        app_mount: &Path,
        merge: &str,
        injected: &[ReadOnlyOverlay],
        consumed: &mut HashSet<usize>,
    ) -> FolderOutcome {
        let merge_path = PathBuf::from(merge);
        let mut candidates = Vec::new();

        let from_image = app_mount.join(strip_leading_slash(merge));
        if from_image.exists() {
            candidates.push(from_image.display().to_string());
        }
        if merge_path.exists() {
            let system_str = merge_path.display().to_string();
            if candidates.last().map(String::as_str) != Some(system_str.as_str()) {
                candidates.push(system_str);
            }
        }

        let mut newly_consumed = Vec::new();
        for (idx, overlay) in injected.iter().enumerate() {
            if overlay.merge == merge_path {
                for part in overlay.lower.split(':') {
                    candidates.push(part.to_owned());
                }
                newly_consumed.push(idx);
            }
        }

        dedup_adjacent(&mut candidates);
        if has_duplicates(&candidates) {
            warn!(merge, "application-folder lower has duplicate entries, skipping");
            return FolderOutcome::Skipped;
        }
        if candidates.iter().any(|path| !Path::new(path).exists()) {
            warn!(merge, "application-folder lower has a missing entry, skipping");
            return FolderOutcome::Skipped;
        }
        if candidates.is_empty() {
            return FolderOutcome::Skipped;
        }

        std::fs::create_dir_all(&merge_path).ok();

        let overlay = ReadOnlyOverlay {
            lower: candidates.join(":"),
            merge: merge_path.clone(),
        };
        match mount::mount_overlay_readonly(&overlay) {
            Ok(()) => {
                consumed.extend(newly_consumed);
                FolderOutcome::Mounted(merge_path)
            }
            Err(report) => {
                if is_ebusy(&report) {
                    info!(merge, "application-folder overlay already provided");
                    consumed.extend(newly_consumed);
                    FolderOutcome::AlreadyProvided
                } else if is_stack_depth_exceeded(&report) {
                    FolderOutcome::DepthExceeded
                } else {
                    warn!(error = ?report, merge, "application-folder overlay mount failed, skipping");
                    FolderOutcome::Skipped
                }
            }
        }
    }

    fn mount_one_persistent_overlay(
        &self,
        app_mount: &Path,
        manifest: &MountManifest,
        name: &str,
        entry: &crate::manifest::PersistentMemoryEntry,
    ) -> PersistentOutcome {
        if entry.lowerdir.is_empty() || entry.upperdir.is_empty() || entry.workdir.is_empty() || entry.mergedir.is_empty()
        {
            warn!(name, "persistent overlay has an empty field, skipping");
            return PersistentOutcome::Skipped;
        }

        let merge_path = PathBuf::from(&entry.mergedir);
        let mut lower = entry.lowerdir.clone();

        let already_overlay = mount::is_overlay_mount(&merge_path);
        let also_app_folder = manifest
            .application_folders
            .iter()
            .any(|folder| Path::new(folder) == merge_path);

        if already_overlay {
            if also_app_folder {
                if let Err(error) = mount::umount(&merge_path) {
                    warn!(name, error = ?error, "unable to unmount application-folder overlay before persistent remount, skipping");
                    return PersistentOutcome::Skipped;
                }
                let app_path = app_mount.join(strip_leading_slash(&entry.mergedir));
                if app_path.exists() {
                    lower = format!("{}:{}", app_path.display(), lower);
                }
            } else {
                warn!(name, "persistent overlay merge point already mounted, skipping");
                return PersistentOutcome::Skipped;
            }
        }

        for dir in [Path::new(&entry.upperdir), Path::new(&entry.workdir), &merge_path] {
            if let Err(error) = std::fs::create_dir_all(dir) {
                warn!(name, %error, path = %dir.display(), "unable to create persistent overlay directory, skipping");
                return PersistentOutcome::Skipped;
            }
        }

        if !has_free_space(Path::new(&entry.workdir)) {
            warn!(name, "persistent overlay backing filesystem has no free space, skipping");
            return PersistentOutcome::Skipped;
        }

        let overlay = PersistentOverlay {
            lower,
            upper: PathBuf::from(&entry.upperdir),
            work: PathBuf::from(&entry.workdir),
            merge: merge_path.clone(),
        };
        match mount::mount_overlay_persistent(&overlay) {
            Ok(()) => PersistentOutcome::Mounted(merge_path),
            Err(report) => {
                if is_stack_depth_exceeded(&report) {
                    PersistentOutcome::DepthExceeded
                } else {
                    warn!(error = ?report, name, "persistent overlay mount failed, skipping");
                    PersistentOutcome::Skipped
                }
            }
        }
    }

    /// Mounts every injected overlay not consumed by application-folder
    /// stacking, with `lower = <its lower>:<its merge>`. Unlike the other
    /// stages, failure here propagates: these overlays carry generated
    /// config that must exist.
    fn mount_ramdisk_additions(&mut self, injected: &[ReadOnlyOverlay], consumed: &HashSet<usize>) -> OrchestratorResult<()> {
        for (idx, overlay) in injected.iter().enumerate() {
            if consumed.contains(&idx) {
                continue;
            }
            let combined = ReadOnlyOverlay {
                lower: format!("{}:{}", overlay.lower, overlay.merge.display()),
                merge: overlay.merge.clone(),
            };
            mount::mount_overlay_readonly(&combined).map_err(|report| {
                Report::new(OrchestratorError::RamdiskAdditionFailed {
                    merge: overlay.merge.clone(),
                    source: report.into_error(),
                })
            })?;
            self.ledger.record(overlay.merge.clone());
        }
        Ok(())
    }
}

enum FolderOutcome {
    Mounted(PathBuf),
    AlreadyProvided,
    Skipped,
    DepthExceeded,
}

enum PersistentOutcome {
    Mounted(PathBuf),
    Skipped,
    DepthExceeded,
}

fn strip_leading_slash(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

fn dedup_adjacent(entries: &mut Vec<String>) {
    entries.dedup();
}

fn has_duplicates(entries: &[String]) -> bool {
    let unique: HashSet<&String> = entries.iter().collect();
    unique.len() != entries.len()
}

fn is_ebusy(report: &Report<MountError>) -> bool {
    matches!(report.error(), MountError::OverlayMountFailed { errno, .. } if *errno == nix::errno::Errno::EBUSY)
}

fn is_stack_depth_exceeded(report: &Report<MountError>) -> bool {
    match report.error() {
        MountError::OverlayMountFailed { errno, .. } => *errno == nix::errno::Errno::ELOOP,
        _ => false,
    }
}

fn has_free_space(path: &Path) -> bool {
    match nix::sys::statvfs::statvfs(path) {
        Ok(stats) => {
            let free = byte_calc::NumBytes::from_usize(stats.block_size() as usize)
                * stats.blocks_available();
            if free.raw == 0 {
                warn!(path = %path.display(), "no free space");
            }
            free.raw > 0
        }
        Err(_) => true,
    }
}

/// Removes the residue of an interrupted application update. Swallowed: a
/// missing file is the common case, not an error.
fn remove_tmp_app_residue(app_image_dir: &Path) {
    std::fs::remove_file(app_image_dir.join(paths::TMP_APP_RESIDUE)).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_adjacent_removes_consecutive_duplicates() {
        let mut entries = vec!["/a".to_owned(), "/a".to_owned(), "/b".to_owned()];
        dedup_adjacent(&mut entries);
        assert_eq!(entries, vec!["/a".to_owned(), "/b".to_owned()]);
    }

    #[test]
    fn has_duplicates_detects_non_adjacent_repeats() {
        let entries = vec!["/a".to_owned(), "/b".to_owned(), "/a".to_owned()];
        assert!(has_duplicates(&entries));
        let entries = vec!["/a".to_owned(), "/b".to_owned(), "/c".to_owned()];
        assert!(!has_duplicates(&entries));
    }

    #[test]
    fn strip_leading_slash_only_strips_once() {
        assert_eq!(strip_leading_slash("/etc"), "etc");
        assert_eq!(strip_leading_slash("etc"), "etc");
    }
}
