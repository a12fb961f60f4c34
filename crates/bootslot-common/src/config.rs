//! Operator-facing configuration, loaded from an optional TOML file and
//! merged over the literal defaults in [`crate::paths`].
//!
//! Every field is optional in the file itself; a missing file or a missing
//! field both fall back to the hardcoded constant, so a device that ships no
//! `/etc/bootslot-ctrl.toml` at all behaves exactly as if every field had
//! been spelled out with its default.

use std::path::{Path, PathBuf};

use reportify::Report;
use serde::Deserialize;

use crate::paths;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read configuration file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse configuration file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type ConfigResult<T> = Result<T, Report<ConfigError>>;

/// Path of the optional operator-supplied configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bootslot-ctrl.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CtrlConfig {
    /// Directory holding the two application images and the mounted current image.
    pub app_image_dir: PathBuf,
    /// Where the chosen application image is loop-mounted.
    pub app_image_mount: PathBuf,
    /// Name of the manifest file shipped inside the application image.
    pub overlay_manifest_name: String,
    /// Mountpoint of the persistent data partition/volume.
    pub persistent_root: PathBuf,
    /// Label searched for on the persistent data partition/volume.
    pub persistent_data_label: String,
    /// Directory holding config file templates and the materialized copies.
    pub conf_dir: PathBuf,
    /// Mountpoint of the scratch tmpfs backing the `/etc` overlay.
    pub etc_ramdisk_mountpoint: PathBuf,
    /// Size, in mebibytes, of the tmpfs backing the `/etc` scratch overlay.
    pub etc_ramdisk_size_mib: u64,
    /// Mountpoint of the scratch tmpfs backing the secure-store `/adu` overlay.
    pub adu_ramdisk_mountpoint: PathBuf,
    /// Size, in mebibytes, of the tmpfs backing the `/adu` scratch overlay.
    pub adu_ramdisk_size_mib: u64,
    /// Where the secure store is expanded.
    pub adu_target_dir: PathBuf,
    /// Default archive file consulted when no dedicated MTD "Secure" partition exists.
    pub secure_store_default_archive: PathBuf,
    /// Path of the secure-store agent-configuration JSON document.
    pub secure_store_json_config: PathBuf,
    /// Block number, in 512-byte sectors, of the secure store on the eMMC variant.
    pub emmc_secure_part_blk_nr: u64,
    /// Name searched for in `/proc/mtd` for the MTD secure-store partition.
    pub mtd_secure_partition_name: String,
    /// Name searched for in `/proc/mtd` for the NAND U-Boot environment partition.
    pub mtd_uboot_env_partition_name: String,
}

impl Default for CtrlConfig {
    fn default() -> Self {
        CtrlConfig {
            app_image_dir: PathBuf::from(paths::APP_IMAGE_DIR),
            app_image_mount: PathBuf::from(paths::APP_IMAGE_MOUNT),
            overlay_manifest_name: paths::OVERLAY_MANIFEST_NAME.to_owned(),
            persistent_root: PathBuf::from(paths::PERSISTENT_ROOT),
            persistent_data_label: paths::PERSISTENT_DATA_LABEL.to_owned(),
            conf_dir: PathBuf::from(paths::CONF_DIR),
            etc_ramdisk_mountpoint: PathBuf::from(paths::ETC_RAMDISK_MOUNTPOINT),
            etc_ramdisk_size_mib: paths::ETC_RAMDISK_SIZE_MIB,
            adu_ramdisk_mountpoint: PathBuf::from(paths::ADU_RAMDISK_MOUNTPOINT),
            adu_ramdisk_size_mib: paths::ADU_RAMDISK_SIZE_MIB,
            adu_target_dir: PathBuf::from(paths::ADU_TARGET_DIR),
            secure_store_default_archive: PathBuf::from(paths::SECURE_STORE_DEFAULT_ARCHIVE),
            secure_store_json_config: PathBuf::from(paths::SECURE_STORE_JSON_CONFIG),
            emmc_secure_part_blk_nr: paths::EMMC_SECURE_PART_BLK_NR,
            mtd_secure_partition_name: paths::MTD_SECURE_PARTITION_NAME.to_owned(),
            mtd_uboot_env_partition_name: paths::MTD_UBOOT_ENV_PARTITION_NAME.to_owned(),
        }
    }
}

impl CtrlConfig {
    /// Loads the configuration from `path`, falling back to [`CtrlConfig::default`]
    /// entirely if the file does not exist.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(CtrlConfig::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| {
            Report::new(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        })?;
        toml::from_str(&text).map_err(|source| {
            Report::new(ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
        })
    }

    /// Loads the configuration from [`DEFAULT_CONFIG_PATH`].
    pub fn load_default() -> ConfigResult<Self> {
        Self::load(Path::new(DEFAULT_CONFIG_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = CtrlConfig::load(Path::new("/does/not/exist-bootslot-ctrl.toml")).unwrap();
        assert_eq!(config.persistent_data_label, "data");
        assert_eq!(config.etc_ramdisk_size_mib, 16);
    }

    #[test]
    fn partial_toml_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootslot-ctrl.toml");
        std::fs::write(&path, "persistent_data_label = \"custom-data\"\n").unwrap();
        let config = CtrlConfig::load(&path).unwrap();
        assert_eq!(config.persistent_data_label, "custom-data");
        assert_eq!(config.app_image_dir, PathBuf::from(paths::APP_IMAGE_DIR));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootslot-ctrl.toml");
        std::fs::write(&path, "bogus_field = 1\n").unwrap();
        assert!(CtrlConfig::load(&path).is_err());
    }
}
