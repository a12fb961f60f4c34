//! Tmpfs-backed scratch overlays: a small ramdisk carrying writes made during
//! early boot (generated config files, the expanded secure store) that must
//! present as a *read-only* layer to the rest of the system once sealed.
//!
//! Both call sites (`/etc`, `/adu`) follow the same three-step shape
//! described in §4.6: mount a sized tmpfs, overlay it writably over the
//! target so whatever runs next can populate it, then remount the tmpfs
//! read-only and hand back a [`ReadOnlyOverlay`] for injection into the
//! orchestrator.

use std::fs;
use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use reportify::Report;

use crate::mount::{self, MountError, PersistentOverlay, ReadOnlyOverlay};

#[derive(Debug, thiserror::Error)]
pub enum ScratchError {
    #[error("unable to create scratch directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to mount scratch tmpfs at {0}")]
    TmpfsMount(PathBuf, #[source] MountError),
    #[error("unable to mount scratch overlay at {0}")]
    OverlayMount(PathBuf, #[source] MountError),
    #[error("unable to seal scratch tmpfs at {0} read-only")]
    Seal(PathBuf, #[source] MountError),
}

pub type ScratchResult<T> = Result<T, Report<ScratchError>>;

/// A tmpfs-backed overlay mounted writably over `merge`, not yet sealed.
pub struct ScratchOverlay {
    ramdisk_mountpoint: PathBuf,
    upper: PathBuf,
    merge: PathBuf,
}

impl ScratchOverlay {
    /// Mounts a `size_mib`-sized tmpfs at `ramdisk_mountpoint`, then overlays
    /// it writably (`lower = target`, `upper/work` on the tmpfs) at `target`.
    pub fn prepare(ramdisk_mountpoint: &Path, target: &Path, size_mib: u64) -> ScratchResult<Self> {
        fs::create_dir_all(ramdisk_mountpoint).map_err(|source| {
            Report::new(ScratchError::CreateDir {
                path: ramdisk_mountpoint.to_path_buf(),
                source,
            })
        })?;

        let options = format!("size={size_mib}m,mode=0755");
        mount::mount(Some("tmpfs"), ramdisk_mountpoint, "tmpfs", MsFlags::empty(), &options)
            .map_err(|report| Report::new(ScratchError::TmpfsMount(ramdisk_mountpoint.to_path_buf(), report.into_error())))?;

        let upper = ramdisk_mountpoint.join("upper").join(strip_root(target));
        let work = ramdisk_mountpoint.join("work").join(strip_root(target));
        for dir in [&upper, &work] {
            fs::create_dir_all(dir).map_err(|source| {
                Report::new(ScratchError::CreateDir {
                    path: dir.clone(),
                    source,
                })
            })?;
        }

        let overlay = PersistentOverlay {
            lower: target.display().to_string(),
            upper: upper.clone(),
            work,
            merge: target.to_path_buf(),
        };
        mount::mount_overlay_persistent(&overlay)
            .map_err(|report| Report::new(ScratchError::OverlayMount(target.to_path_buf(), report.into_error())))?;

        Ok(ScratchOverlay {
            ramdisk_mountpoint: ramdisk_mountpoint.to_path_buf(),
            upper,
            merge: target.to_path_buf(),
        })
    }

    /// The writable merge point; callers populate files here before sealing.
    pub fn merge(&self) -> &Path {
        &self.merge
    }

    /// Remounts the backing tmpfs read-only and returns the [`ReadOnlyOverlay`]
    /// to inject into the orchestrator: `lower = <ramdisk>/upper/<target>`,
    /// `merge = <target>`.
    pub fn seal(self) -> ScratchResult<ReadOnlyOverlay> {
        mount::remount(&self.ramdisk_mountpoint, MsFlags::MS_RDONLY, "tmpfs")
            .map_err(|report| Report::new(ScratchError::Seal(self.ramdisk_mountpoint.clone(), report.into_error())))?;
        Ok(ReadOnlyOverlay {
            lower: self.upper.display().to_string(),
            merge: self.merge,
        })
    }
}

fn strip_root(path: &Path) -> &Path {
    path.strip_prefix("/").unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_root_drops_leading_slash() {
        assert_eq!(strip_root(Path::new("/etc")), Path::new("etc"));
        assert_eq!(strip_root(Path::new("adu")), Path::new("adu"));
    }
}
