//! Materializes `system.conf` and `fw_env.config` into the (writable, via the
//! scratch overlay) `/etc`, rewriting the device strings they embed for the
//! detected boot medium.
//!
//! The rewrite is idempotent (Testable Property 6): before touching the
//! destination, [`is_boot_device_configured`] checks whether it already
//! mentions the detected boot device, and skips the write entirely if so.
//! Writes themselves go through a temp-file-then-rename so a concurrent
//! reader never observes a half-written file (Testable Property 8).

use std::fs::{self, File};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use regex_lite::Regex;
use reportify::Report;
use tracing::debug;

use crate::memory::MemoryType;
use crate::paths;

#[derive(Debug, thiserror::Error)]
pub enum ConfigLinkError {
    #[error("unable to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to rename {from} to {to}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template {0} does not exist")]
    TemplateMissing(PathBuf),
    #[error("no MTD partition named `{0}` found in /proc/mtd")]
    MtdPartitionNotFound(String),
    #[error("unable to read /proc/mtd")]
    ProcMtdUnreadable(#[source] std::io::Error),
}

pub type ConfigLinkResult<T> = Result<T, Report<ConfigLinkError>>;

/// Picks the template subdirectory for a memory type, per [`paths::TEMPLATE_SUBDIR_EMMC`]
/// and [`paths::TEMPLATE_SUBDIR_NAND`].
pub fn template_path(conf_dir: &Path, memory_type: MemoryType, file_name: &str) -> PathBuf {
    let subdir = match memory_type {
        MemoryType::Emmc => paths::TEMPLATE_SUBDIR_EMMC,
        MemoryType::Nand => paths::TEMPLATE_SUBDIR_NAND,
    };
    conf_dir.join(subdir).join(file_name)
}

/// Returns whether `path` already mentions `/dev/<boot_device>`, meaning a
/// previous run already rewrote it and this one is a no-op.
pub fn is_boot_device_configured(path: &Path, boot_device: &str) -> bool {
    let Ok(contents) = fs::read_to_string(path) else {
        return false;
    };
    contents.contains(&format!("/dev/{boot_device}"))
}

/// Copies `template` to `destination` if `destination` does not yet exist,
/// then rewrites device strings via `rewrite_line`, line by line, through a
/// temp-file-then-rename. No-op if [`is_boot_device_configured`] already
/// holds for `destination`.
pub fn materialize(
    template: &Path,
    destination: &Path,
    boot_device: &str,
    rewrite_line: impl Fn(&str) -> String,
) -> ConfigLinkResult<bool> {
    if is_boot_device_configured(destination, boot_device) {
        debug!(path = %destination.display(), "already configured, skipping rewrite");
        return Ok(false);
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|source| {
            Report::new(ConfigLinkError::Write {
                path: destination.to_path_buf(),
                source,
            })
        })?;
    }

    let source_text = if destination.exists() {
        fs::read_to_string(destination).map_err(|source| {
            Report::new(ConfigLinkError::Read {
                path: destination.to_path_buf(),
                source,
            })
        })?
    } else {
        if !template.exists() {
            return Err(Report::new(ConfigLinkError::TemplateMissing(
                template.to_path_buf(),
            )));
        }
        fs::read_to_string(template).map_err(|source| {
            Report::new(ConfigLinkError::Read {
                path: template.to_path_buf(),
                source,
            })
        })?
    };

    let rewritten: String = source_text
        .lines()
        .map(|line| rewrite_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n";

    atomic_write(destination, rewritten.as_bytes())?;
    Ok(true)
}

/// Writes `contents` to `destination` via a temp file in the same directory,
/// `fsync`s it, renames it into place, then `fsync`s the containing
/// directory and issues a global `sync(2)`.
fn atomic_write(destination: &Path, contents: &[u8]) -> ConfigLinkResult<()> {
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        destination
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("bootslot-ctrl")
    ));

    {
        let mut tmp_file = File::create(&tmp_path).map_err(|source| {
            Report::new(ConfigLinkError::Write {
                path: tmp_path.clone(),
                source,
            })
        })?;
        tmp_file.write_all(contents).map_err(|source| {
            Report::new(ConfigLinkError::Write {
                path: tmp_path.clone(),
                source,
            })
        })?;
        tmp_file.sync_all().map_err(|source| {
            Report::new(ConfigLinkError::Write {
                path: tmp_path.clone(),
                source,
            })
        })?;
    }

    fs::rename(&tmp_path, destination).map_err(|source| {
        Report::new(ConfigLinkError::Rename {
            from: tmp_path.clone(),
            to: destination.to_path_buf(),
            source,
        })
    })?;

    if let Ok(dir) = File::open(parent) {
        unsafe { libc::fsync(dir.as_raw_fd()) };
    }
    unsafe { libc::sync() };
    Ok(())
}

/// Rewrites `(device=)?/dev/mmcblkN(pK|bootK)` references to the detected
/// eMMC boot device, preserving the optional `device=` prefix and partition
/// suffix.
pub fn rewrite_emmc_device_line(line: &str, boot_device: &str) -> String {
    let re = Regex::new(r"(device=)?/dev/mmcblk\d+(p\d+|boot\d+)?").unwrap();
    re.replace_all(line, |caps: &regex_lite::Captures| {
        format!(
            "{}/dev/{boot_device}{}",
            caps.get(1).map_or("", |m| m.as_str()),
            caps.get(2).map_or("", |m| m.as_str()),
        )
    })
    .into_owned()
}

/// Rewrites `/dev/mtdN` references to `mtd_device`.
pub fn rewrite_mtd_device_line(line: &str, mtd_device: &str) -> String {
    let re = Regex::new(r"/dev/mtd\d+").unwrap();
    re.replace_all(line, mtd_device).into_owned()
}

/// Parses `/proc/mtd` (format: `mtd<N>: <size> <erasesize> "<label>"`) to
/// resolve a named partition to its device node. Shared by the NAND
/// `fw_env.config` rewrite and the MTD secure-store scan.
pub fn find_mtd_device_by_name(proc_mtd: &str, label: &str) -> Option<String> {
    let re = Regex::new(r#"^(mtd\d+):\s+\S+\s+\S+\s+"(.*)"$"#).unwrap();
    for line in proc_mtd.lines() {
        if let Some(caps) = re.captures(line.trim()) {
            if &caps[2] == label {
                return Some(format!("/dev/{}", &caps[1]));
            }
        }
    }
    None
}

/// Reads `/proc/mtd` and resolves `label` via [`find_mtd_device_by_name`].
pub fn mtd_device_by_name(label: &str) -> ConfigLinkResult<String> {
    let contents =
        fs::read_to_string("/proc/mtd").map_err(|source| Report::new(ConfigLinkError::ProcMtdUnreadable(source)))?;
    find_mtd_device_by_name(&contents, label)
        .ok_or_else(|| Report::new(ConfigLinkError::MtdPartitionNotFound(label.to_owned())))
}

/// Materializes `system.conf` for the detected memory type and boot device.
///
/// NAND's `system.conf` carries no boot-device string, so it is gated only
/// on `destination` not existing yet, rather than on [`is_boot_device_configured`].
pub fn materialize_system_conf(
    memory_type: MemoryType,
    boot_device: &str,
    conf_dir: &Path,
    destination: &Path,
) -> ConfigLinkResult<bool> {
    let template = template_path(conf_dir, memory_type, paths::SYSTEM_CONF_NAME);
    match memory_type {
        MemoryType::Emmc => {
            let boot_device = boot_device.to_owned();
            materialize(&template, destination, &boot_device.clone(), move |line| {
                rewrite_emmc_device_line(line, &boot_device)
            })
        }
        MemoryType::Nand => copy_if_missing(&template, destination),
    }
}

/// Copies `template` to `destination` if `destination` does not yet exist,
/// verbatim, through the same temp-file-then-rename path [`materialize`] uses.
fn copy_if_missing(template: &Path, destination: &Path) -> ConfigLinkResult<bool> {
    if destination.exists() {
        debug!(path = %destination.display(), "already present, skipping copy");
        return Ok(false);
    }
    if !template.exists() {
        return Err(Report::new(ConfigLinkError::TemplateMissing(
            template.to_path_buf(),
        )));
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|source| {
            Report::new(ConfigLinkError::Write {
                path: destination.to_path_buf(),
                source,
            })
        })?;
    }
    let contents = fs::read_to_string(template).map_err(|source| {
        Report::new(ConfigLinkError::Read {
            path: template.to_path_buf(),
            source,
        })
    })?;
    atomic_write(destination, contents.as_bytes())?;
    Ok(true)
}

/// Materializes `fw_env.config` for the detected memory type and boot device.
/// For NAND, also rewrites `/dev/mtdN` entries to the `UBootEnv`-labeled MTD
/// partition.
pub fn materialize_fw_env_config(
    memory_type: MemoryType,
    boot_device: &str,
    conf_dir: &Path,
    destination: &Path,
    uboot_env_mtd_label: &str,
) -> ConfigLinkResult<bool> {
    let template = template_path(conf_dir, memory_type, paths::FW_ENV_CONF_NAME);
    let boot_device_owned = boot_device.to_owned();
    match memory_type {
        MemoryType::Emmc => {
            materialize(&template, destination, &boot_device_owned.clone(), move |line| {
                rewrite_emmc_device_line(line, &boot_device_owned)
            })
        }
        MemoryType::Nand => {
            let mtd_device = mtd_device_by_name(uboot_env_mtd_label)?;
            materialize(&template, destination, &boot_device_owned, move |line| {
                rewrite_mtd_device_line(line, &mtd_device)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_rewrite_skips_second_write() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("system.conf");
        let destination = dir.path().join("dest").join("system.conf");
        fs::write(&template, "device=/dev/mmcblk0p2\nother=line\n").unwrap();

        let wrote_first = materialize(&template, &destination, "mmcblk1", |line| {
            rewrite_emmc_device_line(line, "mmcblk1")
        })
        .unwrap();
        assert!(wrote_first);
        let first_contents = fs::read_to_string(&destination).unwrap();
        assert!(first_contents.contains("/dev/mmcblk1p2"));

        let wrote_second = materialize(&template, &destination, "mmcblk1", |line| {
            rewrite_emmc_device_line(line, "mmcblk1")
        })
        .unwrap();
        assert!(!wrote_second);
        assert_eq!(fs::read_to_string(&destination).unwrap(), first_contents);
    }

    #[test]
    fn rewrite_emmc_preserves_prefix_and_suffix() {
        assert_eq!(
            rewrite_emmc_device_line("device=/dev/mmcblk0p2", "mmcblk1"),
            "device=/dev/mmcblk1p2"
        );
        assert_eq!(
            rewrite_emmc_device_line("/dev/mmcblk0boot0", "mmcblk2"),
            "/dev/mmcblk2boot0"
        );
        assert_eq!(rewrite_emmc_device_line("/dev/mmcblk0", "mmcblk1"), "/dev/mmcblk1");
    }

    #[test]
    fn rewrite_mtd_replaces_device_number() {
        assert_eq!(rewrite_mtd_device_line("/dev/mtd3 0x0 0", "/dev/mtd7"), "/dev/mtd7 0x0 0");
    }

    #[test]
    fn finds_mtd_device_by_label() {
        let proc_mtd = "dev:    size   erasesize  name\n\
             mtd0: 00080000 00020000 \"bootloader\"\n\
             mtd1: 00040000 00020000 \"UBootEnv\"\n";
        assert_eq!(
            find_mtd_device_by_name(proc_mtd, "UBootEnv"),
            Some("/dev/mtd1".to_owned())
        );
        assert_eq!(find_mtd_device_by_name(proc_mtd, "missing"), None);
    }

    #[test]
    fn is_boot_device_configured_checks_substring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.conf");
        fs::write(&path, "device=/dev/mmcblk1p2\n").unwrap();
        assert!(is_boot_device_configured(&path, "mmcblk1"));
        assert!(!is_boot_device_configured(&path, "mmcblk2"));
    }

    #[test]
    fn nand_system_conf_is_gated_on_existence_not_device_string() {
        let dir = tempfile::tempdir().unwrap();
        let conf_dir = dir.path().join("conf");
        fs::create_dir_all(conf_dir.join(paths::TEMPLATE_SUBDIR_NAND)).unwrap();
        fs::write(
            conf_dir.join(paths::TEMPLATE_SUBDIR_NAND).join(paths::SYSTEM_CONF_NAME),
            "update_mode=nand\n",
        )
        .unwrap();
        let destination = dir.path().join("etc").join("system.conf");

        let wrote_first =
            materialize_system_conf(MemoryType::Nand, "ubiblock0_0", &conf_dir, &destination).unwrap();
        assert!(wrote_first);
        let first_contents = fs::read_to_string(&destination).unwrap();
        assert_eq!(first_contents, "update_mode=nand\n");

        let wrote_second =
            materialize_system_conf(MemoryType::Nand, "ubiblock0_0", &conf_dir, &destination).unwrap();
        assert!(!wrote_second);
        assert_eq!(fs::read_to_string(&destination).unwrap(), first_contents);
    }
}
