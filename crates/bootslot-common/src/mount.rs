//! Typed wrappers over `mount(2)`/`umount(2)`, loop-device attachment, and overlay
//! composition.
//!
//! This is the lowest layer: it never logs and never swallows an error, leaving
//! those decisions to the orchestrator above it.

use std::fs;
use std::os::unix::fs::{chown, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::mount::{MntFlags, MsFlags};
use reportify::Report;

use crate::loop_dev::LoopDevice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentOverlay {
    pub lower: String,
    pub upper: PathBuf,
    pub work: PathBuf,
    pub merge: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOnlyOverlay {
    pub lower: String,
    pub merge: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("mount of {source_display} on {target} ({fstype}) failed")]
    MountFailed {
        source_display: String,
        target: PathBuf,
        fstype: String,
        #[source]
        errno: nix::Error,
    },
    #[error("umount of {target} failed")]
    UmountFailed {
        target: PathBuf,
        #[source]
        errno: nix::Error,
    },
    #[error("loop-device setup failed at step `{step}`: {detail}")]
    LoopSetupFailed { step: &'static str, detail: String },
    #[error("overlay mount ({kind}) at {merge} failed")]
    OverlayMountFailed {
        kind: &'static str,
        merge: PathBuf,
        options: String,
        #[source]
        errno: nix::Error,
    },
    #[error("unable to create overlay directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to realign ownership/mode of {path} with {reference}")]
    Realign {
        path: PathBuf,
        reference: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type MountResult<T> = Result<T, Report<MountError>>;

/// Wraps `mount(2)`. `options=""` means "pass no options".
pub fn mount(
    source: Option<&str>,
    target: &Path,
    fstype: &str,
    flags: MsFlags,
    options: &str,
) -> MountResult<()> {
    let options = if options.is_empty() {
        None
    } else {
        Some(options)
    };
    nix::mount::mount(source, target, Some(fstype), flags, options).map_err(|errno| {
        Report::new(MountError::MountFailed {
            source_display: source.unwrap_or("none").to_owned(),
            target: target.to_path_buf(),
            fstype: fstype.to_owned(),
            errno,
        })
    })
}

/// Wraps `umount(2)`.
pub fn umount(target: &Path) -> MountResult<()> {
    nix::mount::umount(target).map_err(|errno| {
        Report::new(MountError::UmountFailed {
            target: target.to_path_buf(),
            errno,
        })
    })
}

/// Attaches `image_path` to a free loop device and mounts it as squashfs at
/// `target`. On any mid-step failure every resource acquired so far is released.
pub fn mount_loop(image_path: &Path, target: &Path) -> MountResult<LoopDevice> {
    let loop_dev = LoopDevice::attach(image_path).map_err(|report| {
        Report::new(MountError::LoopSetupFailed {
            step: "attach",
            detail: format!("{report:?}"),
        })
    })?;

    match mount(
        Some(loop_dev.path().to_str().unwrap_or_default()),
        target,
        "squashfs",
        MsFlags::empty(),
        "",
    ) {
        Ok(()) => Ok(loop_dev),
        Err(error) => {
            let mut loop_dev = loop_dev;
            let _ = loop_dev.detach();
            Err(error)
        }
    }
}

/// Creates missing `upper`/`work` directories, realigning `upper`'s
/// ownership/mode with the rightmost (system) entry of `lower` if it differs,
/// then mounts the overlay.
pub fn mount_overlay_persistent(o: &PersistentOverlay) -> MountResult<()> {
    create_dir_if_missing(&o.upper)?;
    create_dir_if_missing(&o.work)?;

    if let Some(system_dir) = o.lower.rsplit(':').next() {
        let system_dir = Path::new(system_dir);
        if system_dir.exists() {
            realign(&o.upper, system_dir)?;
        }
    }

    let options = format!(
        "upperdir={},workdir={},lowerdir={},index=on,xino=auto",
        o.upper.display(),
        o.work.display(),
        o.lower,
    );
    mount(
        Some("overlay"),
        &o.merge,
        "overlay",
        MsFlags::empty(),
        &options,
    )
    .map_err(|report| {
        Report::new(MountError::OverlayMountFailed {
            kind: "persistent",
            merge: o.merge.clone(),
            options,
            errno: errno_of(&report),
        })
    })
}

/// If `o.merge` is already an overlay mount, unmounts it first (tolerating
/// `EBUSY`), then mounts read-only.
pub fn mount_overlay_readonly(o: &ReadOnlyOverlay) -> MountResult<()> {
    let proc_mounts = fs::read_to_string("/proc/mounts").unwrap_or_default();
    if is_overlay_mount_in(&proc_mounts, &o.merge) {
        if let Err(error) = nix::mount::umount(&o.merge) {
            if error != nix::errno::Errno::EBUSY {
                return Err(Report::new(MountError::UmountFailed {
                    target: o.merge.clone(),
                    errno: error,
                }));
            }
            tracing::warn!(merge = %o.merge.display(), "overlay busy, proceeding with remount");
        }
    }

    let options = format!("lowerdir={},xino=auto", o.lower);
    mount(
        Some("overlay"),
        &o.merge,
        "overlay",
        MsFlags::MS_RDONLY,
        &options,
    )
    .map_err(|report| {
        Report::new(MountError::OverlayMountFailed {
            kind: "ro",
            merge: o.merge.clone(),
            options,
            errno: errno_of(&report),
        })
    })
}

fn errno_of(report: &Report<MountError>) -> nix::Error {
    match report.error() {
        MountError::MountFailed { errno, .. } => *errno,
        _ => nix::errno::Errno::EIO,
    }
}

/// Remounts `target` (already mounted) with the given flags, e.g. to seal a
/// scratch tmpfs read-only with `MS_REMOUNT|MS_RDONLY`.
pub fn remount(target: &Path, flags: MsFlags, fstype: &str) -> MountResult<()> {
    mount(None, target, fstype, flags | MsFlags::MS_REMOUNT, "")
}

/// Text-scan of `/proc/mounts` for a line mentioning `path`, regardless of fstype.
pub fn is_mounted(path: &Path) -> bool {
    let proc_mounts = fs::read_to_string("/proc/mounts").unwrap_or_default();
    is_mounted_in(&proc_mounts, path)
}

/// Same as [`is_mounted`] but operating on an already-read `/proc/mounts` text,
/// for testability.
pub fn is_mounted_in(proc_mounts: &str, path: &Path) -> bool {
    let needle = format!(" {} ", path.display());
    proc_mounts.lines().any(|line| line.contains(&needle))
}

/// Text-scan of `/proc/mounts` for a line mentioning `path` with fstype `overlay`.
pub fn is_overlay_mount(path: &Path) -> bool {
    let proc_mounts = fs::read_to_string("/proc/mounts").unwrap_or_default();
    is_overlay_mount_in(&proc_mounts, path)
}

/// Same as [`is_overlay_mount`] but operating on an already-read `/proc/mounts`
/// text, for testability.
pub fn is_overlay_mount_in(proc_mounts: &str, path: &Path) -> bool {
    let needle = format!(" {} ", path.display());
    proc_mounts
        .lines()
        .any(|line| line.contains(&needle) && line.contains("overlay"))
}

fn create_dir_if_missing(path: &Path) -> MountResult<()> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|source| {
        Report::new(MountError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
    })
}

fn realign(target: &Path, reference: &Path) -> MountResult<()> {
    let meta = fs::metadata(reference).map_err(|source| {
        Report::new(MountError::Realign {
            path: target.to_path_buf(),
            reference: reference.to_path_buf(),
            source,
        })
    })?;
    let target_meta = fs::metadata(target).map_err(|source| {
        Report::new(MountError::Realign {
            path: target.to_path_buf(),
            reference: reference.to_path_buf(),
            source,
        })
    })?;
    if target_meta.uid() != meta.uid() || target_meta.gid() != meta.gid() {
        chown(target, Some(meta.uid()), Some(meta.gid())).map_err(|source| {
            Report::new(MountError::Realign {
                path: target.to_path_buf(),
                reference: reference.to_path_buf(),
                source,
            })
        })?;
    }
    if target_meta.permissions().mode() != meta.permissions().mode() {
        fs::set_permissions(target, meta.permissions()).map_err(|source| {
            Report::new(MountError::Realign {
                path: target.to_path_buf(),
                reference: reference.to_path_buf(),
                source,
            })
        })?;
    }
    copy_xattrs(reference, target);
    Ok(())
}

/// Best-effort extended-attribute copy; absence of xattr support is not fatal.
fn copy_xattrs(reference: &Path, target: &Path) {
    let Ok(names) = xattr::list(reference) else {
        return;
    };
    for name in names {
        if let Ok(Some(value)) = xattr::get(reference, &name) {
            let _ = xattr::set(target, &name, &value);
        }
    }
}

/// Unmounts `target`, tolerating `ENOENT`/`EINVAL` (not mounted).
pub fn umount_lazy(target: &Path) {
    let _ = nix::mount::umount2(target, MntFlags::MNT_DETACH);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_overlay_mount_line() {
        let proc_mounts = "overlay /etc overlay rw,relatime,lowerdir=/a,upperdir=/b,workdir=/c 0 0\n";
        assert!(is_overlay_mount_in(proc_mounts, Path::new("/etc")));
        assert!(!is_overlay_mount_in(proc_mounts, Path::new("/usr/bin")));
    }

    #[test]
    fn is_mounted_in_requires_surrounding_spaces() {
        let proc_mounts = "/dev/mmcblk0p2 /rw_fs/root ext4 rw,relatime 0 0\n";
        assert!(is_mounted_in(proc_mounts, Path::new("/rw_fs/root")));
        assert!(!is_mounted_in(proc_mounts, Path::new("/rw_fs/root2")));
    }
}
