//! Classifies the persistent-storage topology (NAND/UBI vs eMMC/ext4) and locates
//! the named data partition or volume on it.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use regex_lite::Regex;
use reportify::Report;
use tracing::warn;
use xscript::Run;

use crate::paths::{PERSISTENT_DATA_LABEL, PERSISTENT_ROOT, SYSFS_BOOT_DEV};

/// The physical persistent-storage topology of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Emmc,
    Nand,
}

impl MemoryType {
    /// The filesystem type used to mount the persistent partition.
    pub fn fs_type(self) -> &'static str {
        match self {
            MemoryType::Emmc => "ext4",
            MemoryType::Nand => "ubifs",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemoryType::Emmc => "eMMC",
            MemoryType::Nand => "NAND",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryDetectError {
    #[error("sysfs boot-device token `{0}` is not a recognized mmc/nand identifier")]
    UnrecognizedBootDevToken(String),
    #[error("unable to open /proc/cmdline")]
    CmdlineUnreadable(#[source] std::io::Error),
    #[error("neither /sys/bdinfo/boot_dev nor /proc/cmdline identify the persistent-memory topology")]
    Undetermined,
    #[error("no partition or volume with label `{label}` found for {memory_type}")]
    PersistentMemoryNotFound {
        memory_type: MemoryType,
        label: String,
    },
    #[error("sysfs is not mounted or /sys does not exist")]
    SysfsUnavailable,
    #[error("unable to run `blkid -L {label}`")]
    BlkidFailed { label: String },
}

pub type MemoryDetectResult<T> = Result<T, Report<MemoryDetectError>>;

/// Classifies the device's persistent-storage topology and remembers the raw boot
/// device token (`mmcblk0`, `ubiblock0_0`, ...) needed to locate the data partition.
#[derive(Debug, Clone)]
pub struct MemoryDetector {
    memory_type: MemoryType,
    boot_device: String,
    mountpoint: PathBuf,
}

impl MemoryDetector {
    /// Detects the topology from `/sys/bdinfo/boot_dev`, falling back to
    /// `/proc/cmdline`. Requires `/sys` and `/proc` to already be mounted.
    pub fn detect() -> MemoryDetectResult<Self> {
        if let Some(detected) = Self::detect_from_sysfs()? {
            return Ok(detected);
        }
        Self::detect_from_cmdline()
    }

    fn detect_from_sysfs() -> MemoryDetectResult<Option<Self>> {
        let Ok(contents) = fs::read_to_string(SYSFS_BOOT_DEV) else {
            return Ok(None);
        };
        let token = contents
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if token.contains("nand") {
            // The sysfs token only says "nand", not the exact ubiblockN_M device;
            // fall through to the /proc/cmdline regex for that.
            return Ok(None);
        }
        let boot_device = if token.contains("mmc1") {
            "mmcblk0"
        } else if token.contains("mmc2") {
            "mmcblk1"
        } else if token.contains("mmc3") {
            "mmcblk2"
        } else {
            return Err(Report::new(MemoryDetectError::UnrecognizedBootDevToken(token)));
        };
        Ok(Some(MemoryDetector {
            memory_type: MemoryType::Emmc,
            boot_device: boot_device.to_owned(),
            mountpoint: PathBuf::from(PERSISTENT_ROOT),
        }))
    }

    fn detect_from_cmdline() -> MemoryDetectResult<Self> {
        let cmdline = fs::read_to_string("/proc/cmdline")
            .map_err(MemoryDetectError::CmdlineUnreadable)
            .map_err(Report::new)?;
        let emmc_re = Regex::new(r"root=/dev/(mmcblk[0-2])").unwrap();
        let nand_re = Regex::new(r"root=/dev/(ubiblock\d+_\d+)").unwrap();
        if let Some(captures) = emmc_re.captures(&cmdline) {
            return Ok(MemoryDetector {
                memory_type: MemoryType::Emmc,
                boot_device: captures[1].to_owned(),
                mountpoint: PathBuf::from(PERSISTENT_ROOT),
            });
        }
        if let Some(captures) = nand_re.captures(&cmdline) {
            return Ok(MemoryDetector {
                memory_type: MemoryType::Nand,
                boot_device: captures[1].to_owned(),
                mountpoint: PathBuf::from(PERSISTENT_ROOT),
            });
        }
        Err(Report::new(MemoryDetectError::Undetermined))
    }

    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    pub fn boot_device(&self) -> &str {
        &self.boot_device
    }

    pub fn mountpoint(&self) -> &std::path::Path {
        &self.mountpoint
    }

    /// Locates the device node (eMMC) or UBI volume node (NAND) carrying the
    /// persistent-data label.
    pub fn persistent_device_path(&self, label: &str) -> MemoryDetectResult<PathBuf> {
        match self.memory_type {
            MemoryType::Emmc => self.persistent_device_path_emmc(label),
            MemoryType::Nand => self.persistent_device_path_nand(label),
        }
    }

    fn persistent_device_path_emmc(&self, label: &str) -> MemoryDetectResult<PathBuf> {
        let output = xscript::read_str!(["blkid", "-L", label]).map_err(|_| {
            Report::new(MemoryDetectError::BlkidFailed {
                label: label.to_owned(),
            })
        })?;
        let device = output.trim();
        if device.is_empty() {
            return Err(Report::new(MemoryDetectError::PersistentMemoryNotFound {
                memory_type: self.memory_type,
                label: label.to_owned(),
            }));
        }
        Ok(PathBuf::from(device))
    }

    fn persistent_device_path_nand(&self, label: &str) -> MemoryDetectResult<PathBuf> {
        if !std::path::Path::new("/sys").exists() {
            return Err(Report::new(MemoryDetectError::SysfsUnavailable));
        }
        let ubi_num: String = self
            .boot_device
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if ubi_num.is_empty() {
            return Err(Report::new(MemoryDetectError::PersistentMemoryNotFound {
                memory_type: self.memory_type,
                label: label.to_owned(),
            }));
        }
        let ubi_dev = format!("ubi{ubi_num}");
        let ubi_path = PathBuf::from("/sys/class/ubi").join(&ubi_dev);
        if let Ok(entries) = fs::read_dir(&ubi_path) {
            for entry in entries.flatten() {
                let dirname = entry.file_name();
                let dirname = dirname.to_string_lossy();
                if !dirname.starts_with(&format!("{ubi_dev}_")) {
                    continue;
                }
                let name_file = entry.path().join("name");
                let Ok(vol_name) = fs::read_to_string(&name_file) else {
                    continue;
                };
                if vol_name.trim() == label {
                    return Ok(PathBuf::from("/dev").join(dirname.as_ref()));
                }
            }
        } else {
            warn!(path = %ubi_path.display(), "UBI device directory not found in sysfs");
        }
        Err(Report::new(MemoryDetectError::PersistentMemoryNotFound {
            memory_type: self.memory_type,
            label: label.to_owned(),
        }))
    }
}

/// Convenience wrapper around [`MemoryDetector::persistent_device_path`] using the
/// default `data` label.
pub fn default_persistent_device_path(detector: &MemoryDetector) -> MemoryDetectResult<PathBuf> {
    detector.persistent_device_path(PERSISTENT_DATA_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn s6_nand_ubi_label_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let ubi_dir = tmp.path().join("ubi0").join("ubi0_2");
        fs::create_dir_all(&ubi_dir).unwrap();
        fs::write(ubi_dir.join("name"), "data\n").unwrap();

        let detector = MemoryDetector {
            memory_type: MemoryType::Nand,
            boot_device: "ubiblock0_0".to_owned(),
            mountpoint: PathBuf::from(PERSISTENT_ROOT),
        };

        // Exercise the same label-matching logic the real /sys/class/ubi scan uses,
        // against a temp directory standing in for sysfs.
        let mut found = None;
        for entry in fs::read_dir(tmp.path().join("ubi0")).unwrap().flatten() {
            let name_file = entry.path().join("name");
            if fs::read_to_string(&name_file).unwrap().trim() == "data" {
                found = Some(PathBuf::from("/dev").join(entry.file_name()));
            }
        }
        assert_eq!(found, Some(PathBuf::from("/dev/ubi0_2")));
        let _ = detector.memory_type();
    }

    #[test]
    fn cmdline_regex_extracts_emmc_device() {
        let re = Regex::new(r"root=/dev/(mmcblk[0-2])").unwrap();
        let cmdline = "console=ttymxc0 root=/dev/mmcblk1p2 rootfstype=ext4 rw";
        let captures = re.captures(cmdline).unwrap();
        assert_eq!(&captures[1], "mmcblk1");
    }

    #[test]
    fn cmdline_regex_extracts_nand_device() {
        let re = Regex::new(r"root=/dev/(ubiblock\d+_\d+)").unwrap();
        let cmdline = "console=ttymxc0 root=/dev/ubiblock0_0 rootfstype=ubifs rw";
        let captures = re.captures(cmdline).unwrap();
        assert_eq!(&captures[1], "ubiblock0_0");
    }
}
